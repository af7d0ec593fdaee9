//! Graph notifications
//!
//! Emitted on the control thread, consumed by whoever holds a receiver
//! (backend, meters, UI). Sending never blocks: a full bounded queue
//! drops the event and counts it.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use std::sync::atomic::{AtomicU64, Ordering};

use rf_core::{LatencySamples, RouteId};

use crate::latency::LatencyDirection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// Sort failed; the previous order stays installed
    FeedbackDetected { routes: Vec<RouteId> },
    /// A new processing order was published
    SuccessfulGraphSort { generation: u64 },
    /// One solo propagation pass finished
    SoloChanged,
    /// Whether anything is self-soloed changed
    SoloActive(bool),
    /// Number of isolated routes changed
    SoloIsolatedChanged { count: usize },
    /// Effective mute of a route may have changed
    MuteChanged(RouteId),
    /// Worst route latency moved; backend should re-query latencies
    WorstLatencyChanged {
        previous: LatencySamples,
        current: LatencySamples,
    },
    /// Worst port-level latency changed in either direction
    WorstIoLatencyChanged {
        playback: LatencySamples,
        capture: LatencySamples,
    },
    /// Send alignment did not settle within the pass limit
    LatencyConvergenceBailout {
        direction: LatencyDirection,
        passes: usize,
    },
}

/// Non-blocking event producer
#[derive(Debug)]
pub struct EventSender {
    tx: Sender<GraphEvent>,
    rx: Receiver<GraphEvent>,
    dropped: AtomicU64,
}

impl EventSender {
    pub fn new(capacity: Option<usize>) -> Self {
        let (tx, rx) = match capacity {
            Some(cap) => bounded(cap),
            None => unbounded(),
        };
        Self {
            tx,
            rx,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn emit(&self, event: GraphEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("event queue full, dropped {:?}", event);
            }
            // We hold a receiver ourselves, so this cannot happen
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// New handle onto the shared queue
    ///
    /// Receivers share one queue: each event is delivered to exactly one
    /// of them.
    pub fn subscribe(&self) -> Receiver<GraphEvent> {
        self.rx.clone()
    }

    /// Events lost to a full bounded queue
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
