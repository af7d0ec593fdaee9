//! Mixer route
//!
//! A route is what the graph sorts: ports on both sides, a processing
//! chain (inserts and aux sends), solo/mute state and the latency values
//! the compensation engine writes back. Control-side structure sits
//! behind `parking_lot` locks; everything the audio thread reads is
//! atomic or behind a `try_lock`.

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rf_core::{DataType, GroupId, LatencyRange, LatencySamples, RouteId, Sample};

use crate::io::{Io, Port, PortDirection};
use crate::latency::{LatencyDirection, LatencyPass};
use crate::pdc::{FeedPath, PdcDelayLine};
use crate::processor::{AuxSend, Processor};
use crate::snapshot::GraphSnapshot;
use crate::solo::{MuteControl, SoloControl, SoloIsolateControl};

// ═══════════════════════════════════════════════════════════════════════════
// ROUTE KIND / SPEC
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RouteKind {
    /// Audio track
    #[default]
    Audio,
    /// MIDI track
    Midi,
    /// Submix bus
    Bus,
    /// Send-effect return
    Aux,
    /// Main mix output
    Master,
    /// Control-room monitor section
    Monitor,
}

impl RouteKind {
    /// Prefix for auto-naming
    pub fn prefix(&self) -> &'static str {
        match self {
            RouteKind::Audio => "Audio",
            RouteKind::Midi => "MIDI",
            RouteKind::Bus => "Bus",
            RouteKind::Aux => "Aux",
            RouteKind::Master => "Master",
            RouteKind::Monitor => "Monitor",
        }
    }

    /// Master and monitor sit outside the solo model
    #[inline]
    pub fn can_solo(&self) -> bool {
        !matches!(self, RouteKind::Master | RouteKind::Monitor)
    }
}

/// What to build when adding a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub name: String,
    pub kind: RouteKind,
    pub inputs: Vec<DataType>,
    pub outputs: Vec<DataType>,
}

impl RouteSpec {
    pub fn new(name: impl Into<String>, kind: RouteKind) -> Self {
        Self {
            name: name.into(),
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn audio_track(name: impl Into<String>, channels: usize) -> Self {
        Self::new(name, RouteKind::Audio).with_audio(channels, channels)
    }

    pub fn midi_track(name: impl Into<String>) -> Self {
        Self::new(name, RouteKind::Midi)
            .with_ports(DataType::Midi, 1, 0)
            .with_audio(0, 2)
    }

    pub fn bus(name: impl Into<String>, channels: usize) -> Self {
        Self::new(name, RouteKind::Bus).with_audio(channels, channels)
    }

    pub fn master(channels: usize) -> Self {
        Self::new("Master", RouteKind::Master).with_audio(channels, channels)
    }

    pub fn with_audio(self, inputs: usize, outputs: usize) -> Self {
        self.with_ports(DataType::Audio, inputs, outputs)
    }

    pub fn with_ports(mut self, data_type: DataType, inputs: usize, outputs: usize) -> Self {
        self.inputs.extend(std::iter::repeat_n(data_type, inputs));
        self.outputs.extend(std::iter::repeat_n(data_type, outputs));
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ROUTE
// ═══════════════════════════════════════════════════════════════════════════

pub struct Route {
    id: RouteId,
    name: String,
    kind: RouteKind,
    input: RwLock<Io>,
    output: RwLock<Io>,
    processors: RwLock<Vec<Arc<dyn Processor>>>,
    group: RwLock<Option<GroupId>>,
    solo: SoloControl,
    solo_isolate: SoloIsolateControl,
    mute: MuteControl,
    /// Extra latency set by the user, ahead of the chain
    user_latency: AtomicU64,
    playback_latency: AtomicU64,
    capture_latency: AtomicU64,
    /// Alignment delays on input paths, set at mix points
    input_delays: Mutex<HashMap<FeedPath, PdcDelayLine>>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Route {
    pub fn new(id: RouteId, spec: RouteSpec) -> Self {
        let name = if spec.name.is_empty() {
            format!("{} {}", spec.kind.prefix(), id.as_u64())
        } else {
            spec.name
        };

        let mut input = Io::new(PortDirection::Input);
        for data_type in spec.inputs {
            input.add_port(data_type);
        }
        let mut output = Io::new(PortDirection::Output);
        for data_type in spec.outputs {
            output.add_port(data_type);
        }

        Self {
            id,
            name,
            kind: spec.kind,
            input: RwLock::new(input),
            output: RwLock::new(output),
            processors: RwLock::new(Vec::new()),
            group: RwLock::new(None),
            solo: SoloControl::new(),
            solo_isolate: SoloIsolateControl::new(),
            mute: MuteControl::new(),
            user_latency: AtomicU64::new(0),
            playback_latency: AtomicU64::new(0),
            capture_latency: AtomicU64::new(0),
            input_delays: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn id(&self) -> RouteId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    // ─────────────────────────────────────────────────────────────────────
    // Ports
    // ─────────────────────────────────────────────────────────────────────

    pub fn input(&self) -> RwLockReadGuard<'_, Io> {
        self.input.read()
    }

    pub fn output(&self) -> RwLockReadGuard<'_, Io> {
        self.output.read()
    }

    pub(crate) fn io_mut(&self, direction: PortDirection) -> RwLockWriteGuard<'_, Io> {
        match direction {
            PortDirection::Input => self.input.write(),
            PortDirection::Output => self.output.write(),
        }
    }

    pub(crate) fn io(&self, direction: PortDirection) -> RwLockReadGuard<'_, Io> {
        match direction {
            PortDirection::Input => self.input.read(),
            PortDirection::Output => self.output.read(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Processing chain
    // ─────────────────────────────────────────────────────────────────────

    /// Append to the chain, returning the slot index
    pub fn add_processor(&self, processor: Arc<dyn Processor>) -> usize {
        let mut chain = self.processors.write();
        chain.push(processor);
        chain.len() - 1
    }

    /// Insert at `index` (clamped to the chain length)
    pub fn insert_processor(&self, index: usize, processor: Arc<dyn Processor>) -> usize {
        let mut chain = self.processors.write();
        let index = index.min(chain.len());
        chain.insert(index, processor);
        index
    }

    pub fn remove_processor(&self, index: usize) -> Option<Arc<dyn Processor>> {
        let mut chain = self.processors.write();
        (index < chain.len()).then(|| chain.remove(index))
    }

    pub fn processor(&self, index: usize) -> Option<Arc<dyn Processor>> {
        self.processors.read().get(index).cloned()
    }

    pub fn processor_count(&self) -> usize {
        self.processors.read().len()
    }

    /// Remove every send targeting `target`; returns how many
    pub(crate) fn remove_sends_to(&self, target: RouteId) -> usize {
        let mut chain = self.processors.write();
        let before = chain.len();
        chain.retain(|p| p.as_send().is_none_or(|s| s.target() != target));
        before - chain.len()
    }

    /// Each active send's alignment delay for `direction`, in chain order
    pub fn send_delays(&self, direction: LatencyDirection) -> Vec<(RouteId, LatencySamples)> {
        self.processors
            .read()
            .iter()
            .filter_map(|p| p.as_send())
            .filter(|s| s.is_active())
            .map(|s| (s.target(), s.delay(direction)))
            .collect()
    }

    /// Active sends as (chain index, target, offset)
    ///
    /// The offset runs from our input to the send's output: latency at
    /// the tap plus the send's playback delay.
    pub fn send_offsets(&self) -> Vec<(usize, RouteId, LatencySamples)> {
        let chain = self.processors.read();
        let mut tap = self.user_latency();
        let mut offsets = Vec::new();
        for (index, processor) in chain.iter().enumerate() {
            match processor.as_send() {
                Some(send) if send.is_active() => {
                    let delay = send.delay(LatencyDirection::Playback);
                    offsets.push((index, send.target(), tap + delay));
                }
                Some(_) => {}
                None if processor.is_active() => tap += processor.signal_latency(),
                None => {}
            }
        }
        offsets
    }

    // ─────────────────────────────────────────────────────────────────────
    // Feeds
    // ─────────────────────────────────────────────────────────────────────

    /// Does our signal reach `other`'s input directly?
    ///
    /// `Some(false)` for a main-output connection, `Some(true)` when the
    /// only path is an active aux send, `None` otherwise.
    pub fn direct_feeds(&self, other: &Route) -> Option<bool> {
        if self.id == other.id {
            return None;
        }

        let wired = self.output.read().ports().iter().any(|port| {
            port.connections()
                .iter()
                .any(|c| c.route == other.id && c.direction == PortDirection::Input)
        });
        if wired {
            return Some(false);
        }

        let sends = self
            .processors
            .read()
            .iter()
            .filter_map(|p| p.as_send())
            .any(|s: &AuxSend| s.is_active() && s.target() == other.id);
        sends.then_some(true)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Latency
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_user_latency(&self, samples: LatencySamples) {
        self.user_latency.store(samples, Ordering::Release);
    }

    #[inline]
    pub fn user_latency(&self) -> LatencySamples {
        self.user_latency.load(Ordering::Acquire)
    }

    /// Latency this route adds on its own: user latency plus active processors
    pub fn own_latency(&self) -> LatencySamples {
        self.user_latency() + chain_latency(&self.processors.read())
    }

    /// Signal latency as of the last pass in `direction`
    #[inline]
    pub fn signal_latency(&self, direction: LatencyDirection) -> LatencySamples {
        match direction {
            LatencyDirection::Playback => self.playback_latency.load(Ordering::Acquire),
            LatencyDirection::Capture => self.capture_latency.load(Ordering::Acquire),
        }
    }

    fn store_signal_latency(&self, direction: LatencyDirection, samples: LatencySamples) {
        match direction {
            LatencyDirection::Playback => self.playback_latency.store(samples, Ordering::Release),
            LatencyDirection::Capture => self.capture_latency.store(samples, Ordering::Release),
        }
    }

    /// Recompute our signal latency from the neighbours' current values
    ///
    /// Capture inherits the slowest main feeder, playback the slowest
    /// main target. Active sends get the delay that lines their tap up
    /// with the target; a changed delay is reported to `pass`.
    pub fn update_signal_latency(&self, pass: &mut LatencyPass<'_>) -> LatencySamples {
        let direction = pass.direction();
        let edges = pass.edges();
        let inherited = match direction {
            LatencyDirection::Capture => edges.main_feeders(self.id).map(|f| pass.latency_of(f)).max(),
            LatencyDirection::Playback => {
                edges.main_targets(self.id).map(|t| pass.latency_of(t)).max()
            }
        }
        .unwrap_or(0);

        let chain = self.processors.read();
        let own = self.user_latency() + chain_latency(&chain);
        let total = own + inherited;

        let mut tap = self.user_latency();
        for processor in chain.iter() {
            match processor.as_send() {
                Some(send) if send.is_active() => {
                    let target = send.target();
                    let delay = match direction {
                        LatencyDirection::Capture => {
                            let arrival = edges
                                .main_feeders(target)
                                .map(|f| pass.latency_of(f))
                                .max()
                                .unwrap_or(0);
                            arrival.saturating_sub(inherited + tap)
                        }
                        LatencyDirection::Playback => {
                            let from_tap = own.saturating_sub(tap) + inherited;
                            from_tap.saturating_sub(pass.latency_of(target))
                        }
                    };
                    if send.set_delay(direction, delay) {
                        log::trace!("{}: send to {} delay -> {}", self.id, target, delay);
                        pass.send_latency_changed();
                    }
                }
                Some(_) => {}
                None if processor.is_active() => tap += processor.signal_latency(),
                None => {}
            }
        }

        self.store_signal_latency(direction, total);
        total
    }

    /// Set port latency ranges for `direction`; returns the worst
    ///
    /// The ports facing away from the signal (outputs for playback,
    /// inputs for capture) take the range of their connections; the
    /// other side gets that plus our own latency.
    pub fn set_private_port_latencies(
        &self,
        direction: LatencyDirection,
        snapshot: &GraphSnapshot,
    ) -> LatencySamples {
        let (from, to) = match direction {
            LatencyDirection::Playback => (PortDirection::Output, PortDirection::Input),
            LatencyDirection::Capture => (PortDirection::Input, PortDirection::Output),
        };

        let all_connections = {
            let io = self.io(from);
            io.ports()
                .iter()
                .map(|port| connected_latency(port, direction, snapshot))
                .reduce(LatencyRange::union)
                .unwrap_or(LatencyRange::ZERO)
        };

        for port in self.io_mut(from).ports_mut() {
            port.set_private_latency(all_connections, direction);
        }

        let downstream = all_connections.offset(self.own_latency());
        for port in self.io_mut(to).ports_mut() {
            port.set_private_latency(downstream, direction);
        }
        downstream.max
    }

    /// Publish the graph-wide worst latency on every port
    pub fn set_public_port_latencies(&self, worst: LatencySamples, direction: LatencyDirection) {
        let range = LatencyRange::new(worst, worst);
        self.input.write().set_public_latency(range, direction);
        self.output.write().set_public_latency(range, direction);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Compensation (audio thread reads)
    // ─────────────────────────────────────────────────────────────────────

    /// Alignment delay on signal arriving over `path`
    pub fn input_compensation(&self, path: FeedPath) -> LatencySamples {
        self.input_delays
            .lock()
            .get(&path)
            .map_or(0, |line| line.delay() as LatencySamples)
    }

    /// Every delayed input path, sorted by path
    pub fn input_compensations(&self) -> Vec<(FeedPath, LatencySamples)> {
        let mut delays: Vec<_> = self
            .input_delays
            .lock()
            .iter()
            .map(|(path, line)| (*path, line.delay() as LatencySamples))
            .collect();
        delays.sort_unstable();
        delays
    }

    /// Replace the input delays; paths missing from `delays` lose theirs
    ///
    /// Returns true if anything changed.
    pub(crate) fn set_input_compensation(&self, delays: &HashMap<FeedPath, LatencySamples>) -> bool {
        let mut lines = self.input_delays.lock();
        let before = lines.len();
        lines.retain(|path, _| delays.get(path).is_some_and(|d| *d > 0));
        let mut changed = lines.len() != before;

        for (&path, &samples) in delays.iter().filter(|(_, d)| **d > 0) {
            let samples = samples as usize;
            let line = lines
                .entry(path)
                .or_insert_with(|| PdcDelayLine::new(samples));
            if line.delay() != samples {
                line.set_delay(samples);
                changed = true;
            }
        }
        changed
    }

    /// Run the alignment delay for `path` over one block
    ///
    /// Never blocks: if the control thread is updating delays, the block
    /// passes through undelayed and this returns false.
    pub fn process_input_compensation(
        &self,
        path: FeedPath,
        left: &mut [Sample],
        right: &mut [Sample],
    ) -> bool {
        match self.input_delays.try_lock() {
            Some(mut lines) => {
                if let Some(line) = lines.get_mut(&path) {
                    line.process(left, right);
                }
                true
            }
            None => false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Solo / mute
    // ─────────────────────────────────────────────────────────────────────

    #[inline]
    pub fn can_solo(&self) -> bool {
        self.kind.can_solo()
    }

    #[inline]
    pub fn can_be_muted_by_others(&self) -> bool {
        self.kind.can_solo()
    }

    #[inline]
    pub fn solo_control(&self) -> &SoloControl {
        &self.solo
    }

    #[inline]
    pub fn solo_isolate_control(&self) -> &SoloIsolateControl {
        &self.solo_isolate
    }

    #[inline]
    pub fn mute_control(&self) -> &MuteControl {
        &self.mute
    }

    #[inline]
    pub fn soloed(&self) -> bool {
        self.solo.soloed()
    }

    #[inline]
    pub fn is_isolated(&self) -> bool {
        self.solo_isolate.solo_isolated()
    }

    #[inline]
    pub fn muted(&self) -> bool {
        self.mute.muted()
    }

    /// Re-evaluate effective mute; returns true if it flipped
    pub(crate) fn act_on_mute(&self, soloing: bool, solo_mute_override: bool) -> bool {
        let by_others =
            soloing && self.can_be_muted_by_others() && !self.soloed() && !self.is_isolated();
        let self_mute_counts = !(solo_mute_override && self.solo.self_soloed());
        self.mute.evaluate(by_others, self_mute_counts)
    }

    pub fn route_group(&self) -> Option<GroupId> {
        *self.group.read()
    }

    pub(crate) fn set_route_group(&self, group: Option<GroupId>) {
        *self.group.write() = group;
    }
}

fn chain_latency(chain: &[Arc<dyn Processor>]) -> LatencySamples {
    chain
        .iter()
        .filter(|p| p.is_active())
        .map(|p| p.signal_latency())
        .sum()
}

/// Range seen through a port's connections; unconnected ports see zero
fn connected_latency(
    port: &Port,
    direction: LatencyDirection,
    snapshot: &GraphSnapshot,
) -> LatencyRange {
    port.connections()
        .iter()
        .filter_map(|peer| {
            let route = snapshot.route(peer.route)?;
            let io = route.io(peer.direction);
            io.port(peer.index).map(|p| p.private_latency(direction))
        })
        .reduce(LatencyRange::union)
        .unwrap_or(LatencyRange::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::PortRef;
    use crate::processor::Insert;

    #[test]
    fn test_spec_builds_ports() {
        let route = Route::new(RouteId(1), RouteSpec::midi_track("Keys"));
        assert_eq!(route.input().len(), 1);
        assert_eq!(route.input().port(0).map(|p| p.data_type()), Some(DataType::Midi));
        assert_eq!(route.output().indices_of(DataType::Audio), vec![0, 1]);
    }

    #[test]
    fn test_empty_name_gets_prefix() {
        let route = Route::new(RouteId(7), RouteSpec::new("", RouteKind::Bus));
        assert_eq!(route.name(), "Bus 7");
    }

    #[test]
    fn test_master_cannot_solo() {
        let master = Route::new(RouteId(1), RouteSpec::master(2));
        assert!(!master.can_solo());
        assert!(!master.can_be_muted_by_others());
        assert!(Route::new(RouteId(2), RouteSpec::bus("B", 2)).can_solo());
    }

    #[test]
    fn test_own_latency_skips_inactive() {
        let route = Route::new(RouteId(1), RouteSpec::audio_track("T", 2));
        let a = Arc::new(Insert::new("a", 64));
        let b = Arc::new(Insert::new("b", 32));
        route.add_processor(a.clone());
        route.add_processor(b.clone());
        route.set_user_latency(4);
        assert_eq!(route.own_latency(), 100);
        b.set_active(false);
        assert_eq!(route.own_latency(), 68);
    }

    #[test]
    fn test_direct_feeds_main_vs_send() {
        let a = Route::new(RouteId(1), RouteSpec::audio_track("A", 2));
        let b = Route::new(RouteId(2), RouteSpec::bus("B", 2));

        assert_eq!(a.direct_feeds(&b), None);

        a.add_processor(Arc::new(AuxSend::new(b.id())));
        assert_eq!(a.direct_feeds(&b), Some(true));

        a.io_mut(PortDirection::Output).connect(0, PortRef::input(b.id(), 0));
        assert_eq!(a.direct_feeds(&b), Some(false));
        assert_eq!(b.direct_feeds(&a), None);
        assert_eq!(a.direct_feeds(&a), None);
    }

    #[test]
    fn test_inactive_send_does_not_feed() {
        let a = Route::new(RouteId(1), RouteSpec::audio_track("A", 2));
        let b = Route::new(RouteId(2), RouteSpec::bus("B", 2));
        let send = Arc::new(AuxSend::new(b.id()));
        a.add_processor(send.clone());
        send.set_active(false);
        assert_eq!(a.direct_feeds(&b), None);
        assert!(a.send_delays(LatencyDirection::Playback).is_empty());
    }

    #[test]
    fn test_remove_sends_to() {
        let a = Route::new(RouteId(1), RouteSpec::audio_track("A", 2));
        a.add_processor(Arc::new(AuxSend::new(RouteId(2))));
        a.add_processor(Arc::new(Insert::new("eq", 0)));
        a.add_processor(Arc::new(AuxSend::new(RouteId(3))));
        assert_eq!(a.remove_sends_to(RouteId(2)), 1);
        assert_eq!(a.processor_count(), 2);
        assert_eq!(a.send_delays(LatencyDirection::Capture), vec![(RouteId(3), 0)]);
    }

    #[test]
    fn test_compensation_delays_one_input_path() {
        let route = Route::new(RouteId(1), RouteSpec::bus("B", 2));
        let slow = FeedPath::main(RouteId(2));
        let fast = FeedPath::send(RouteId(3), 0);
        let delays = HashMap::from([(fast, 2), (slow, 0)]);
        assert!(route.set_input_compensation(&delays));
        assert!(!route.set_input_compensation(&delays));
        assert_eq!(route.input_compensations(), vec![(fast, 2)]);
        assert_eq!(route.input_compensation(slow), 0);

        let mut left = [1.0, 0.0, 0.0, 0.0];
        let mut right = [0.5, 0.0, 0.0, 0.0];
        assert!(route.process_input_compensation(fast, &mut left, &mut right));
        assert_eq!(left, [0.0, 0.0, 1.0, 0.0]);
        assert_eq!(right, [0.0, 0.0, 0.5, 0.0]);

        let mut left = [1.0, 0.0];
        let mut right = [1.0, 0.0];
        assert!(route.process_input_compensation(slow, &mut left, &mut right));
        assert_eq!(left, [1.0, 0.0]);

        assert!(route.set_input_compensation(&HashMap::new()));
        assert!(route.input_compensations().is_empty());
    }

    #[test]
    fn test_send_offsets_include_tap_and_delay() {
        let route = Route::new(RouteId(1), RouteSpec::audio_track("A", 2));
        route.set_user_latency(4);
        let pre = Arc::new(AuxSend::new(RouteId(2)));
        let post = Arc::new(AuxSend::new(RouteId(3)));
        route.add_processor(pre.clone());
        route.add_processor(Arc::new(Insert::new("comp", 16)));
        route.add_processor(post.clone());
        pre.set_delay(LatencyDirection::Playback, 16);
        pre.set_delay(LatencyDirection::Capture, 99);

        assert_eq!(
            route.send_offsets(),
            vec![(0, RouteId(2), 20), (2, RouteId(3), 20)]
        );
        post.set_active(false);
        assert_eq!(route.send_offsets(), vec![(0, RouteId(2), 20)]);
    }

    #[test]
    fn test_solo_override_on_mute() {
        let route = Route::new(RouteId(1), RouteSpec::audio_track("A", 2));
        route.mute_control().set_muted(true);
        route.solo_control().set_self_solo(true);
        route.act_on_mute(true, false);
        assert!(route.muted());
        route.act_on_mute(true, true);
        assert!(!route.muted());
    }
}
