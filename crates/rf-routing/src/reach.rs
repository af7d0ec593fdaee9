//! Feed reachability
//!
//! For each route, every route that transitively feeds it, tagged with
//! whether *all* paths between them go through a send. Any path that is
//! audible end to end makes the relationship audible.
//!
//! A path is sends-only if any edge on it is. Both walks below are
//! iterative; graphs with hundreds of routes must not recurse.

use std::collections::HashMap;

use rf_core::RouteId;

use crate::edges::FeedEdges;

/// Routes feeding one route: `other -> sends_only`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReachSet {
    fed_by: HashMap<RouteId, bool>,
}

impl ReachSet {
    /// Record `route` as a feeder; returns true if this is new or an
    /// upgrade from sends-only to audible
    fn merge(&mut self, route: RouteId, sends_only: bool) -> bool {
        match self.fed_by.get_mut(&route) {
            Some(existing) if *existing && !sends_only => {
                *existing = false;
                true
            }
            Some(_) => false,
            None => {
                self.fed_by.insert(route, sends_only);
                true
            }
        }
    }

    #[inline]
    pub fn contains(&self, route: RouteId) -> bool {
        self.fed_by.contains_key(&route)
    }

    /// `Some(sends_only)` if `route` feeds us at all
    #[inline]
    pub fn sends_only(&self, route: RouteId) -> Option<bool> {
        self.fed_by.get(&route).copied()
    }

    /// `route` feeds us through at least one audible path
    #[inline]
    pub fn audible(&self, route: RouteId) -> bool {
        self.sends_only(route) == Some(false)
    }

    pub fn len(&self) -> usize {
        self.fed_by.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fed_by.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RouteId, bool)> + '_ {
        self.fed_by.iter().map(|(&id, &s)| (id, s))
    }
}

/// Walk upstream from `route` alone
///
/// Each node is expanded at most twice: once when first seen and once
/// more if a later path upgrades it to audible. That bound also keeps
/// the walk finite on cyclic input.
pub fn trace(route: RouteId, edges: &FeedEdges) -> ReachSet {
    let mut set = ReachSet::default();
    let mut stack: Vec<(RouteId, bool)> = edges.feeders(route).to_vec();

    while let Some((node, sends_only)) = stack.pop() {
        if node == route || !set.merge(node, sends_only) {
            continue;
        }
        for &(feeder, edge_sends_only) in edges.feeders(node) {
            stack.push((feeder, sends_only || edge_sends_only));
        }
    }
    set
}

/// Reachability for every route of a sorted graph
#[derive(Debug, Clone, Default)]
pub struct Reachability {
    sets: HashMap<RouteId, ReachSet>,
}

impl Reachability {
    /// Memoized closure over a topological `order`
    ///
    /// `reach(r) = feeders(r) ∪ reach(f) for each feeder f`, with each
    /// feeder's set already final because it precedes `r`.
    pub fn trace_all(order: &[RouteId], edges: &FeedEdges) -> Self {
        let mut sets: HashMap<RouteId, ReachSet> = HashMap::with_capacity(order.len());
        for &route in order {
            let mut set = ReachSet::default();
            for &(feeder, edge_sends_only) in edges.feeders(route) {
                set.merge(feeder, edge_sends_only);
                if let Some(upstream) = sets.get(&feeder) {
                    for (other, sends_only) in upstream.iter() {
                        set.merge(other, sends_only || edge_sends_only);
                    }
                }
            }
            sets.insert(route, set);
        }
        Self { sets }
    }

    pub fn get(&self, route: RouteId) -> Option<&ReachSet> {
        self.sets.get(&route)
    }

    /// `Some(sends_only)` if `from` transitively feeds `to`
    pub fn feeds(&self, from: RouteId, to: RouteId) -> Option<bool> {
        self.sets.get(&to).and_then(|set| set.sends_only(from))
    }

    /// Copy with `route` dropped everywhere
    pub fn without_route(&self, route: RouteId) -> Self {
        let sets = self
            .sets
            .iter()
            .filter(|(id, _)| **id != route)
            .map(|(&id, set)| {
                let mut set = set.clone();
                set.fed_by.remove(&route);
                (id, set)
            })
            .collect();
        Self { sets }
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> FeedEdges {
        // 1 -> 2 -> 3
        let mut edges = FeedEdges::new();
        edges.add(RouteId(1), RouteId(2), false);
        edges.add(RouteId(2), RouteId(3), false);
        edges
    }

    #[test]
    fn test_chain_reaches_transitively() {
        let edges = chain();
        let reach = Reachability::trace_all(&[RouteId(1), RouteId(2), RouteId(3)], &edges);
        let c = reach.get(RouteId(3)).unwrap();
        assert_eq!(c.len(), 2);
        assert!(c.audible(RouteId(1)));
        assert!(c.audible(RouteId(2)));
        assert!(!c.contains(RouteId(3)));
        assert!(reach.get(RouteId(1)).unwrap().is_empty());
    }

    #[test]
    fn test_send_anywhere_on_path_makes_it_sends_only() {
        // 1 -(send)-> 2 -> 3
        let mut edges = FeedEdges::new();
        edges.add(RouteId(1), RouteId(2), true);
        edges.add(RouteId(2), RouteId(3), false);
        let reach = Reachability::trace_all(&[RouteId(1), RouteId(2), RouteId(3)], &edges);
        assert_eq!(reach.feeds(RouteId(1), RouteId(3)), Some(true));
        assert_eq!(reach.feeds(RouteId(2), RouteId(3)), Some(false));
    }

    #[test]
    fn test_any_audible_path_wins() {
        // 1 -(send)-> 3 and 1 -> 2 -> 3
        let mut edges = FeedEdges::new();
        edges.add(RouteId(1), RouteId(3), true);
        edges.add(RouteId(1), RouteId(2), false);
        edges.add(RouteId(2), RouteId(3), false);
        let order = [RouteId(1), RouteId(2), RouteId(3)];
        let reach = Reachability::trace_all(&order, &edges);
        assert_eq!(reach.feeds(RouteId(1), RouteId(3)), Some(false));
        assert_eq!(trace(RouteId(3), &edges).sends_only(RouteId(1)), Some(false));
    }

    #[test]
    fn test_single_walk_matches_closure() {
        let mut edges = FeedEdges::new();
        let pairs = [(1, 4, false), (2, 4, true), (3, 5, false), (4, 5, false), (5, 6, true)];
        for (a, b, s) in pairs {
            edges.add(RouteId(a), RouteId(b), s);
        }
        let order: Vec<RouteId> = (1..=6).map(RouteId).collect();
        let all = Reachability::trace_all(&order, &edges);
        for &id in &order {
            assert_eq!(&trace(id, &edges), all.get(id).unwrap(), "route {id}");
        }
    }

    #[test]
    fn test_single_walk_terminates_on_cycle() {
        let mut edges = FeedEdges::new();
        edges.add(RouteId(1), RouteId(2), true);
        edges.add(RouteId(2), RouteId(1), true);
        let set = trace(RouteId(1), &edges);
        assert_eq!(set.sends_only(RouteId(2)), Some(true));
        assert!(!set.contains(RouteId(1)));
    }

    #[test]
    fn test_without_route() {
        let edges = chain();
        let reach = Reachability::trace_all(&[RouteId(1), RouteId(2), RouteId(3)], &edges);
        let pruned = reach.without_route(RouteId(1));
        assert!(pruned.get(RouteId(1)).is_none());
        assert_eq!(pruned.feeds(RouteId(1), RouteId(3)), None);
        assert_eq!(pruned.feeds(RouteId(2), RouteId(3)), Some(false));
    }
}
