//! Feed edge set
//!
//! `(from, to, sends_only)`: `from`'s signal reaches `to`'s input. At most
//! one edge per ordered pair; several connections between the same two
//! routes collapse, and the edge is sends-only only if every one of them
//! is a send. The set is rebuilt from the routes on every structural
//! change, never patched.

use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

use rf_core::RouteId;

use crate::route::Route;

type Adjacent = SmallVec<[(RouteId, bool); 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedEdge {
    pub from: RouteId,
    pub to: RouteId,
    pub sends_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FeedEdges {
    /// from -> [(to, sends_only)]
    from_to: HashMap<RouteId, Adjacent>,
    /// to -> [(from, sends_only)]
    to_from: HashMap<RouteId, Adjacent>,
    len: usize,
}

impl FeedEdges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe every ordered pair of distinct routes
    pub fn rebuild(routes: &[Arc<Route>]) -> Self {
        let mut edges = Self::new();
        for a in routes {
            for b in routes {
                if a.id() == b.id() {
                    continue;
                }
                if let Some(sends_only) = a.direct_feeds(b) {
                    edges.add(a.id(), b.id(), sends_only);
                }
            }
        }
        log::trace!("rebuilt {} feed edges over {} routes", edges.len, routes.len());
        edges
    }

    /// Add or merge an edge; a non-sends-only connection always wins
    pub fn add(&mut self, from: RouteId, to: RouteId, sends_only: bool) {
        let targets = self.from_to.entry(from).or_default();
        if let Some(existing) = targets.iter_mut().find(|(t, _)| *t == to) {
            existing.1 &= sends_only;
            if let Some(back) = self
                .to_from
                .get_mut(&to)
                .and_then(|f| f.iter_mut().find(|(s, _)| *s == from))
            {
                back.1 &= sends_only;
            }
            return;
        }
        targets.push((to, sends_only));
        self.to_from.entry(to).or_default().push((from, sends_only));
        self.len += 1;
    }

    /// `Some(sends_only)` if there is a direct edge
    pub fn sends_only(&self, from: RouteId, to: RouteId) -> Option<bool> {
        self.targets(from)
            .iter()
            .find(|(t, _)| *t == to)
            .map(|(_, s)| *s)
    }

    #[inline]
    pub fn has(&self, from: RouteId, to: RouteId) -> bool {
        self.sends_only(from, to).is_some()
    }

    /// Direct feeders of `to`
    pub fn feeders(&self, to: RouteId) -> &[(RouteId, bool)] {
        self.to_from.get(&to).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Routes `from` feeds directly
    pub fn targets(&self, from: RouteId) -> &[(RouteId, bool)] {
        self.from_to.get(&from).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Direct feeders reaching `to` through a main connection
    pub fn main_feeders(&self, to: RouteId) -> impl Iterator<Item = RouteId> + '_ {
        self.feeders(to)
            .iter()
            .filter(|(_, sends_only)| !sends_only)
            .map(|(id, _)| *id)
    }

    /// Routes `from` feeds through a main connection
    pub fn main_targets(&self, from: RouteId) -> impl Iterator<Item = RouteId> + '_ {
        self.targets(from)
            .iter()
            .filter(|(_, sends_only)| !sends_only)
            .map(|(id, _)| *id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = FeedEdge> + '_ {
        self.from_to.iter().flat_map(|(&from, targets)| {
            targets.iter().map(move |&(to, sends_only)| FeedEdge {
                from,
                to,
                sends_only,
            })
        })
    }

    /// Copy without any edge touching `route`
    pub fn without_route(&self, route: RouteId) -> Self {
        let mut edges = Self::new();
        for edge in self.iter() {
            if edge.from != route && edge.to != route {
                edges.add(edge.from, edge.to, edge.sends_only);
            }
        }
        edges
    }
}
