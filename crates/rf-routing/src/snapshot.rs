//! Published graph generation
//!
//! One immutable value per install: the route list in processing order
//! plus the edges and reachability of the last successful sort. The
//! control thread builds a new one and swaps it in whole; the audio
//! thread only ever loads.

use std::collections::HashMap;
use std::sync::Arc;

use rf_core::RouteId;

use crate::edges::FeedEdges;
use crate::reach::Reachability;
use crate::route::Route;

#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    generation: u64,
    routes: Vec<Arc<Route>>,
    index: HashMap<RouteId, usize>,
    /// Order produced by the last successful sort
    sorted_order: Vec<RouteId>,
    edges: Arc<FeedEdges>,
    reach: Arc<Reachability>,
    feedback: bool,
}

impl GraphSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Result of a successful sort; `routes` must be in the new order
    pub fn sorted(
        generation: u64,
        routes: Vec<Arc<Route>>,
        edges: FeedEdges,
        reach: Reachability,
    ) -> Self {
        let sorted_order = routes.iter().map(|r| r.id()).collect();
        Self {
            generation,
            index: Self::build_index(&routes),
            routes,
            sorted_order,
            edges: Arc::new(edges),
            reach: Arc::new(reach),
            feedback: false,
        }
    }

    fn build_index(routes: &[Arc<Route>]) -> HashMap<RouteId, usize> {
        routes.iter().enumerate().map(|(i, r)| (r.id(), i)).collect()
    }

    /// Same graph data, different route list (routes added ahead of a sort)
    pub fn with_routes(&self, routes: Vec<Arc<Route>>) -> Self {
        Self {
            generation: self.generation,
            index: Self::build_index(&routes),
            routes,
            sorted_order: self.sorted_order.clone(),
            edges: Arc::clone(&self.edges),
            reach: Arc::clone(&self.reach),
            feedback: self.feedback,
        }
    }

    /// Drop `route` from the list and from the derived graph data
    pub fn without_route(&self, route: RouteId) -> Self {
        let routes: Vec<Arc<Route>> = self
            .routes
            .iter()
            .filter(|r| r.id() != route)
            .cloned()
            .collect();
        Self {
            generation: self.generation,
            index: Self::build_index(&routes),
            routes,
            sorted_order: self
                .sorted_order
                .iter()
                .copied()
                .filter(|id| *id != route)
                .collect(),
            edges: Arc::new(self.edges.without_route(route)),
            reach: Arc::new(self.reach.without_route(route)),
            feedback: self.feedback,
        }
    }

    /// Keep everything, flag the failed sort
    pub fn with_feedback(&self) -> Self {
        let mut next = self.clone();
        next.feedback = true;
        next
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Routes in processing order
    #[inline]
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn route(&self, id: RouteId) -> Option<&Arc<Route>> {
        self.index.get(&id).and_then(|&i| self.routes.get(i))
    }

    /// Processing position of `id`
    pub fn position(&self, id: RouteId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn order(&self) -> Vec<RouteId> {
        self.routes.iter().map(|r| r.id()).collect()
    }

    pub fn sorted_order(&self) -> &[RouteId] {
        &self.sorted_order
    }

    pub fn edges(&self) -> &FeedEdges {
        &self.edges
    }

    pub fn reach(&self) -> &Reachability {
        &self.reach
    }

    /// The last sort attempt found a cycle
    #[inline]
    pub fn has_feedback(&self) -> bool {
        self.feedback
    }
}
