//! Processing chain seam
//!
//! Plugin hosting lives elsewhere; the graph only needs to know what a
//! processor costs in latency, whether it is active, and whether it is
//! an aux send feeding another route.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use rf_core::{LatencySamples, RouteId};

use crate::latency::LatencyDirection;

// ============ Processor Trait ============

/// Anything that sits in a route's processing chain
pub trait Processor: Send + Sync {
    /// Processor name
    fn name(&self) -> &str;

    /// Latency this processor adds, in samples
    fn signal_latency(&self) -> LatencySamples {
        0
    }

    /// Inactive processors are bypassed and add no latency
    fn is_active(&self) -> bool {
        true
    }

    /// Downcast for aux sends
    fn as_send(&self) -> Option<&AuxSend> {
        None
    }
}

// ============ Insert ============

/// Opaque insert with a reported latency
///
/// Stands in for a hosted plugin: the host updates the reported latency
/// and the graph picks it up on the next latency pass.
#[derive(Debug)]
pub struct Insert {
    name: String,
    latency: AtomicU64,
    active: AtomicBool,
}

impl Insert {
    pub fn new(name: impl Into<String>, latency: LatencySamples) -> Self {
        Self {
            name: name.into(),
            latency: AtomicU64::new(latency),
            active: AtomicBool::new(true),
        }
    }

    pub fn set_latency(&self, latency: LatencySamples) {
        self.latency.store(latency, Ordering::Release);
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }
}

impl Processor for Insert {
    fn name(&self) -> &str {
        &self.name
    }

    fn signal_latency(&self) -> LatencySamples {
        self.latency.load(Ordering::Acquire)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

// ============ Aux Send ============

/// Internal send to another route's input
///
/// Its position in the chain is its tap point: processors before it
/// count towards the latency at the tap. Alignment delays are written
/// by the latency engine, one per direction; playback is what renders.
#[derive(Debug)]
pub struct AuxSend {
    name: String,
    target: RouteId,
    active: AtomicBool,
    playback_delay: AtomicU64,
    capture_delay: AtomicU64,
}

impl AuxSend {
    pub fn new(target: RouteId) -> Self {
        Self {
            name: format!("send to {}", target),
            target,
            active: AtomicBool::new(true),
            playback_delay: AtomicU64::new(0),
            capture_delay: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn target(&self) -> RouteId {
        self.target
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    fn delay_slot(&self, direction: LatencyDirection) -> &AtomicU64 {
        match direction {
            LatencyDirection::Playback => &self.playback_delay,
            LatencyDirection::Capture => &self.capture_delay,
        }
    }

    /// Alignment delay for `direction`
    #[inline]
    pub fn delay(&self, direction: LatencyDirection) -> LatencySamples {
        self.delay_slot(direction).load(Ordering::Acquire)
    }

    /// Returns true if the delay actually changed
    pub fn set_delay(&self, direction: LatencyDirection, delay: LatencySamples) -> bool {
        self.delay_slot(direction).swap(delay, Ordering::AcqRel) != delay
    }
}

impl Processor for AuxSend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn as_send(&self) -> Option<&AuxSend> {
        Some(self)
    }
}
