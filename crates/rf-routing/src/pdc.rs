//! Delay compensation at mix points
//!
//! Once signal latencies have converged, the graph is walked in
//! processing order and every input path of a route gets an arrival
//! time: a main connection arrives at the feeder's aligned input plus
//! its own latency, an aux send at the source's aligned input plus the
//! tap latency plus the send's playback delay. A route with more than one
//! input path is a mix point; each path is delayed by
//! `max_arrival - arrival` at the receiving input.
//!
//! Example: A (100) and B (0) both feed Bus 1:
//!     max_arrival = 100
//!     A compensation: 0
//!     B compensation: 100

use std::collections::HashMap;

use rf_core::{LatencySamples, RouteId, Sample};

use crate::snapshot::GraphSnapshot;

/// Maximum alignment delay in samples (~1 second at 48kHz)
pub const MAX_PDC_DELAY: usize = 48000;

// ═══════════════════════════════════════════════════════════════════════════════
// MIX POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// One way signal enters a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedPath {
    pub from: RouteId,
    /// Chain index of the aux send, `None` for a main connection
    pub send: Option<usize>,
}

impl FeedPath {
    pub fn main(from: RouteId) -> Self {
        Self { from, send: None }
    }

    pub fn send(from: RouteId, index: usize) -> Self {
        Self {
            from,
            send: Some(index),
        }
    }
}

/// A route summing more than one input path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixPoint {
    pub route: RouteId,
    /// (path, arrival latency)
    pub arrivals: Vec<(FeedPath, LatencySamples)>,
    pub max_arrival: LatencySamples,
}

impl MixPoint {
    pub fn compensation_for(&self, path: FeedPath) -> Option<LatencySamples> {
        self.arrivals
            .iter()
            .find(|(p, _)| *p == path)
            .map(|(_, arrival)| self.max_arrival - arrival)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PdcPlan {
    pub mix_points: Vec<MixPoint>,
    /// Aligned arrival at each route's input
    pub input_arrival: HashMap<RouteId, LatencySamples>,
    /// Per receiving route, the delay for each input path that needs one
    pub compensation: HashMap<RouteId, HashMap<FeedPath, LatencySamples>>,
}

impl PdcPlan {
    pub fn compensation_for(&self, route: RouteId, path: FeedPath) -> LatencySamples {
        self.compensation
            .get(&route)
            .and_then(|paths| paths.get(&path))
            .copied()
            .unwrap_or(0)
    }

    /// Input delays for `route`; empty when it is not a mix point
    pub fn input_delays(&self, route: RouteId) -> HashMap<FeedPath, LatencySamples> {
        self.compensation.get(&route).cloned().unwrap_or_default()
    }
}

/// Work out per-path alignment delays
///
/// `snapshot` must be in processing order so every feeder is visited
/// before the routes it reaches.
pub fn align_mix_points(snapshot: &GraphSnapshot) -> PdcPlan {
    let edges = snapshot.edges();
    let mut incoming: HashMap<RouteId, Vec<(FeedPath, LatencySamples)>> = HashMap::new();
    let mut plan = PdcPlan::default();

    for route in snapshot.routes() {
        let id = route.id();
        let arrivals = incoming.remove(&id).unwrap_or_default();
        let max_arrival = arrivals.iter().map(|(_, a)| *a).max().unwrap_or(0);
        plan.input_arrival.insert(id, max_arrival);

        if arrivals.len() > 1 {
            let delays: HashMap<FeedPath, LatencySamples> = arrivals
                .iter()
                .filter(|(_, arrival)| *arrival < max_arrival)
                .map(|&(path, arrival)| {
                    let needed = (max_arrival - arrival).min(MAX_PDC_DELAY as LatencySamples);
                    (path, needed)
                })
                .collect();
            if !delays.is_empty() {
                plan.compensation.insert(id, delays);
            }
            plan.mix_points.push(MixPoint {
                route: id,
                arrivals,
                max_arrival,
            });
        }

        let out = max_arrival + route.own_latency();
        for target in edges.main_targets(id) {
            incoming
                .entry(target)
                .or_default()
                .push((FeedPath::main(id), out));
        }
        for (index, target, offset) in route.send_offsets() {
            incoming
                .entry(target)
                .or_default()
                .push((FeedPath::send(id, index), max_arrival + offset));
        }
    }

    log::debug!(
        "PDC: {} mix point(s), {} input path(s) delayed",
        plan.mix_points.len(),
        plan.compensation.values().map(HashMap::len).sum::<usize>()
    );
    plan
}

// ═══════════════════════════════════════════════════════════════════════════════
// DELAY LINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Stereo delay line
///
/// Grows on `set_delay` (control thread); `process` never allocates.
#[derive(Debug)]
pub struct PdcDelayLine {
    buffer_l: Vec<Sample>,
    buffer_r: Vec<Sample>,
    write_pos: usize,
    delay: usize,
}

impl PdcDelayLine {
    /// Create with room for `max_delay` samples of delay
    pub fn new(max_delay: usize) -> Self {
        let capacity = max_delay.min(MAX_PDC_DELAY) + 1;
        Self {
            buffer_l: vec![0.0; capacity],
            buffer_r: vec![0.0; capacity],
            write_pos: 0,
            delay: 0,
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.buffer_l.len()
    }

    /// Set delay amount, growing the buffer if needed
    pub fn set_delay(&mut self, samples: usize) {
        let samples = samples.min(MAX_PDC_DELAY);
        if samples >= self.capacity() {
            *self = Self::new(samples);
        }
        self.delay = samples;
    }

    /// Get current delay
    #[inline]
    pub fn delay(&self) -> usize {
        self.delay
    }

    /// Process stereo block in-place
    #[inline]
    pub fn process(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        if self.delay == 0 {
            return;
        }

        debug_assert_eq!(left.len(), right.len());
        let capacity = self.capacity();

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let read_pos = (self.write_pos + capacity - self.delay) % capacity;

            let out_l = self.buffer_l[read_pos];
            let out_r = self.buffer_r[read_pos];

            self.buffer_l[self.write_pos] = *l;
            self.buffer_r[self.write_pos] = *r;

            *l = out_l;
            *r = out_r;

            self.write_pos = (self.write_pos + 1) % capacity;
        }
    }

    /// Clear buffer
    pub fn clear(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
    }
}
