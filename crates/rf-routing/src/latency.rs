//! Latency compensation engine
//!
//! Walks the processing order and lets each route recompute its signal
//! latency from its neighbours. Playback walks in reverse so everything
//! a route feeds is fresh; capture walks forward so everything feeding
//! it is fresh. If any send had to move its alignment delay the whole
//! pass restarts, up to a fixed number of passes.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use rf_core::{LatencySamples, RouteId};

use crate::edges::FeedEdges;
use crate::events::GraphEvent;
use crate::route::Route;
use crate::snapshot::GraphSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LatencyDirection {
    /// Signal flowing towards the outputs
    #[default]
    Playback,
    /// Signal flowing in from the inputs
    Capture,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// What a route sees while updating its latency
pub struct LatencyPass<'a> {
    direction: LatencyDirection,
    snapshot: &'a GraphSnapshot,
    send_changes: usize,
}

impl<'a> LatencyPass<'a> {
    pub fn new(snapshot: &'a GraphSnapshot, direction: LatencyDirection) -> Self {
        Self {
            direction,
            snapshot,
            send_changes: 0,
        }
    }

    #[inline]
    pub fn direction(&self) -> LatencyDirection {
        self.direction
    }

    #[inline]
    pub fn edges(&self) -> &'a FeedEdges {
        self.snapshot.edges()
    }

    /// Current signal latency of `route` in this pass's direction
    pub fn latency_of(&self, route: RouteId) -> LatencySamples {
        self.snapshot
            .route(route)
            .map(|r| r.signal_latency(self.direction))
            .unwrap_or(0)
    }

    /// A send's alignment delay moved during this pass
    pub fn send_latency_changed(&mut self) {
        self.send_changes += 1;
    }

    #[inline]
    pub fn send_changes(&self) -> usize {
        self.send_changes
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPORTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of one direction's update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyUpdate {
    pub direction: LatencyDirection,
    /// Some route's signal latency differs from before the update
    pub changed: bool,
    /// Full passes run
    pub passes: usize,
    pub worst_route_latency: LatencySamples,
    /// Send delay changes seen in the final pass
    pub send_changes: usize,
    /// Stopped at the pass limit with sends still moving
    pub bailed_out: bool,
}

/// Everything `update_latency_compensation` did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencyReport {
    pub playback: LatencyUpdate,
    pub capture: LatencyUpdate,
    pub previous_worst: LatencySamples,
    pub worst_route_latency: LatencySamples,
    /// Port latencies and alignment delays were recomputed
    pub io_recomputed: bool,
    pub worst_playback_io: LatencySamples,
    pub worst_capture_io: LatencySamples,
}

impl LatencyReport {
    pub fn changed(&self) -> bool {
        self.playback.changed || self.capture.changed
    }

    pub fn worst_changed(&self) -> bool {
        self.previous_worst != self.worst_route_latency
    }

    pub fn bailed_out(&self) -> bool {
        self.playback.bailed_out || self.capture.bailed_out
    }

    /// Bailout notifications to emit
    pub(crate) fn bailout_events(&self) -> impl Iterator<Item = GraphEvent> + '_ {
        [self.playback, self.capture]
            .into_iter()
            .filter(|u| u.bailed_out)
            .map(|u| GraphEvent::LatencyConvergenceBailout {
                direction: u.direction,
                passes: u.passes,
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
pub struct LatencyCompensation {
    pass_limit: usize,
}

impl LatencyCompensation {
    pub fn new(pass_limit: usize) -> Self {
        Self {
            pass_limit: pass_limit.max(1),
        }
    }

    #[inline]
    pub fn pass_limit(&self) -> usize {
        self.pass_limit
    }

    /// Bring every route's signal latency to a fixed point
    pub fn update(&self, snapshot: &GraphSnapshot, direction: LatencyDirection) -> LatencyUpdate {
        let mut update = LatencyUpdate {
            direction,
            ..Default::default()
        };

        loop {
            update.passes += 1;
            let mut pass = LatencyPass::new(snapshot, direction);
            let mut worst: LatencySamples = 0;

            let mut visit = |route: &Arc<Route>| {
                let before = route.signal_latency(direction);
                let after = route.update_signal_latency(&mut pass);
                if before != after {
                    update.changed = true;
                }
                worst = worst.max(after);
            };
            match direction {
                LatencyDirection::Playback => snapshot.routes().iter().rev().for_each(&mut visit),
                LatencyDirection::Capture => snapshot.routes().iter().for_each(&mut visit),
            }

            update.worst_route_latency = worst;
            update.send_changes = pass.send_changes();

            if update.send_changes == 0 {
                break;
            }
            if update.passes >= self.pass_limit {
                update.bailed_out = true;
                log::warn!(
                    "{:?} latency did not converge after {} passes ({} send change(s) pending)",
                    direction,
                    update.passes,
                    update.send_changes
                );
                break;
            }
            log::debug!(
                "{:?} latency: {} send latency change(s), restarting pass",
                direction,
                update.send_changes
            );
        }

        log::debug!(
            "{:?} latency: worst={} samples after {} pass(es)",
            direction,
            update.worst_route_latency,
            update.passes
        );
        update
    }

    /// Port-level latencies; returns the worst I/O latency for `direction`
    pub fn update_io_latency(
        &self,
        snapshot: &GraphSnapshot,
        direction: LatencyDirection,
    ) -> LatencySamples {
        let routes = snapshot.routes();
        let worst = match direction {
            LatencyDirection::Playback => routes
                .iter()
                .rev()
                .map(|r| r.set_private_port_latencies(direction, snapshot))
                .max(),
            LatencyDirection::Capture => routes
                .iter()
                .map(|r| r.set_private_port_latencies(direction, snapshot))
                .max(),
        }
        .unwrap_or(0);

        for route in routes {
            route.set_public_port_latencies(worst, direction);
        }
        worst
    }
}

impl Default for LatencyCompensation {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_LATENCY_PASS_LIMIT)
    }
}
