//! Topological sort of the feed graph
//!
//! Kahn's algorithm. Among routes that become ready at the same time the
//! one earliest in the previous order goes first; routes that were never
//! sorted before follow in id order. A valid previous order therefore
//! sorts to itself.
//!
//! A cycle is a normal mixer state (feedback sends), so failure is a
//! value, not an error path.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use thiserror::Error;

use rf_core::RouteId;

use crate::edges::FeedEdges;

/// Sorting stopped with routes still waiting on a cycle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("feedback detected: {} route(s) unsorted", routes.len())]
pub struct FeedbackDetected {
    /// Routes inside a cycle or downstream of one, in id order
    pub routes: Vec<RouteId>,
}

/// Rank: (0, position) for previously ordered routes, (1, id) for new ones
type Rank = (u8, u64);

/// Sort `routes` so every edge points forward
pub fn topological_sort(
    routes: &[RouteId],
    edges: &FeedEdges,
    previous: &[RouteId],
) -> Result<Vec<RouteId>, FeedbackDetected> {
    let previous_pos: HashMap<RouteId, usize> =
        previous.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    let rank = |id: RouteId| -> Rank {
        match previous_pos.get(&id) {
            Some(&pos) => (0, pos as u64),
            None => (1, id.as_u64()),
        }
    };

    // Calculate in-degrees, ignoring edges to routes outside the set
    let mut in_degree: HashMap<RouteId, usize> = routes.iter().map(|&id| (id, 0)).collect();
    for &id in routes {
        for &(target, _) in edges.targets(id) {
            if let Some(deg) = in_degree.get_mut(&target) {
                *deg += 1;
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<(Rank, RouteId)>> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(&id, _)| Reverse((rank(id), id)))
        .collect();

    let mut order = Vec::with_capacity(routes.len());
    while let Some(Reverse((_, id))) = ready.pop() {
        order.push(id);
        for &(target, _) in edges.targets(id) {
            if let Some(deg) = in_degree.get_mut(&target) {
                *deg -= 1;
                if *deg == 0 {
                    ready.push(Reverse((rank(target), target)));
                }
            }
        }
    }

    if order.len() == routes.len() {
        return Ok(order);
    }

    let mut stuck: Vec<RouteId> = in_degree
        .into_iter()
        .filter(|(_, deg)| *deg > 0)
        .map(|(id, _)| id)
        .collect();
    stuck.sort();
    Err(FeedbackDetected { routes: stuck })
}
