//! Route graph scheduler
//!
//! Owns the route collection and everything derived from it. All
//! mutation runs on the control thread, serialized by one writer lock;
//! each structural change rebuilds the feed edges, re-sorts, retraces
//! reachability and publishes the result as a new [`GraphSnapshot`].
//! The audio thread only calls [`RouteGraph::snapshot`], which never
//! blocks.
//!
//! ## Triggers
//! - Route add/remove, port (dis)connection, send changes:
//!   resort, then latency compensation over the whole graph
//! - Processor latency changes: latency compensation only
//! - Solo changes: propagation over the current reachability, no resort
//!
//! ## Guards
//! While routes are being added or removed, during an initial connection
//! batch and after teardown has begun, `resort` and
//! `update_latency_compensation` are no-ops.

use arc_swap::{ArcSwap, Guard};
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use rf_core::{BufferSize, DataType, GroupId, LatencySamples, RouteId, samples_to_ms};

use crate::config::RoutingConfig;
use crate::edges::FeedEdges;
use crate::error::{RoutingError, RoutingResult};
use crate::events::{EventSender, GraphEvent};
use crate::groups::{GroupControlDisposition, RouteGroup, RouteGroups};
use crate::io::{PortDirection, PortRef};
use crate::latency::{LatencyCompensation, LatencyDirection, LatencyReport};
use crate::pdc;
use crate::processor::{AuxSend, Processor};
use crate::reach::Reachability;
use crate::route::{Route, RouteSpec};
use crate::snapshot::GraphSnapshot;
use crate::sort::{self, FeedbackDetected};

// ═══════════════════════════════════════════════════════════════════════════
// STATE FLAGS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct GraphState {
    /// Open initial-connection batches (nesting depth)
    initial_connecting: AtomicUsize,
    /// Teardown started; never cleared
    deletion: AtomicBool,
    adding_routes: AtomicBool,
    removing_routes: AtomicBool,
}

impl GraphState {
    fn structural_change_in_flight(&self) -> bool {
        self.initial_connecting.load(Ordering::Acquire) > 0
            || self.deletion.load(Ordering::Acquire)
            || self.adding_routes.load(Ordering::Acquire)
            || self.removing_routes.load(Ordering::Acquire)
    }
}

/// Holds a flag up for its lifetime
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Batch of connections made while recomputation is held off
///
/// Dropping the last open batch re-runs the graph once.
pub struct ConnectionBatch<'a> {
    graph: &'a RouteGraph,
}

impl Drop for ConnectionBatch<'_> {
    fn drop(&mut self) {
        let depth = self
            .graph
            .state
            .initial_connecting
            .fetch_sub(1, Ordering::AcqRel);
        if depth == 1 {
            self.graph.graph_reordered();
        }
    }
}

/// Result of [`RouteGraph::resort`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResortOutcome {
    /// A new order was published
    Sorted { generation: u64 },
    /// Cycle found; the previous order stays in force
    Feedback(FeedbackDetected),
    /// A structural change is in flight; nothing was done
    Deferred,
}

impl ResortOutcome {
    pub fn is_sorted(&self) -> bool {
        matches!(self, Self::Sorted { .. })
    }
}

/// Accumulated over the solo passes of one control change
#[derive(Debug, Default)]
struct SoloPass {
    uninvolved: HashSet<RouteId>,
}

// ═══════════════════════════════════════════════════════════════════════════
// ROUTE GRAPH
// ═══════════════════════════════════════════════════════════════════════════

pub struct RouteGraph {
    config: RwLock<RoutingConfig>,
    snapshot: ArcSwap<GraphSnapshot>,
    /// Serializes control-thread mutation
    writer: Mutex<()>,
    groups: RwLock<RouteGroups>,
    events: EventSender,
    state: GraphState,
    next_route_id: AtomicU64,
    /// Anything self-soloed
    soloing: AtomicBool,
    isolated_count: AtomicUsize,
    worst_route_latency: AtomicU64,
    worst_playback_io: AtomicU64,
    worst_capture_io: AtomicU64,
}

impl RouteGraph {
    pub fn new(config: RoutingConfig) -> RoutingResult<Self> {
        config.validate()?;
        let events = EventSender::new(config.event_capacity);
        Ok(Self {
            config: RwLock::new(config),
            snapshot: ArcSwap::from_pointee(GraphSnapshot::empty()),
            writer: Mutex::new(()),
            groups: RwLock::new(RouteGroups::new()),
            events,
            state: GraphState::default(),
            next_route_id: AtomicU64::new(1),
            soloing: AtomicBool::new(false),
            isolated_count: AtomicUsize::new(0),
            worst_route_latency: AtomicU64::new(0),
            worst_playback_io: AtomicU64::new(0),
            worst_capture_io: AtomicU64::new(0),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Read side
    // ─────────────────────────────────────────────────────────────────────

    /// Current generation; wait-free, safe on the audio thread
    #[inline]
    pub fn snapshot(&self) -> Guard<Arc<GraphSnapshot>> {
        self.snapshot.load()
    }

    pub fn snapshot_full(&self) -> Arc<GraphSnapshot> {
        self.snapshot.load_full()
    }

    pub fn processing_order(&self) -> Vec<RouteId> {
        self.snapshot.load().order()
    }

    pub fn route(&self, id: RouteId) -> Option<Arc<Route>> {
        self.snapshot.load().route(id).cloned()
    }

    pub fn route_count(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot.load().generation()
    }

    pub fn has_feedback(&self) -> bool {
        self.snapshot.load().has_feedback()
    }

    /// `Some(sends_only)` if `from` transitively feeds `to`
    pub fn feeds(&self, from: RouteId, to: RouteId) -> Option<bool> {
        self.snapshot.load().reach().feeds(from, to)
    }

    /// `Some(sends_only)` if `from` feeds `to` directly
    pub fn direct_feeds(&self, from: RouteId, to: RouteId) -> Option<bool> {
        self.snapshot.load().edges().sends_only(from, to)
    }

    /// Receiver for graph notifications
    pub fn events(&self) -> Receiver<GraphEvent> {
        self.events.subscribe()
    }

    pub fn dropped_events(&self) -> u64 {
        self.events.dropped()
    }

    pub fn config(&self) -> RoutingConfig {
        self.config.read().clone()
    }

    /// Replace the configuration; the event queue keeps its capacity
    pub fn set_config(&self, config: RoutingConfig) -> RoutingResult<()> {
        config.validate()?;
        *self.config.write() = config;
        Ok(())
    }

    pub fn soloing(&self) -> bool {
        self.soloing.load(Ordering::Acquire)
    }

    pub fn solo_isolated_count(&self) -> usize {
        self.isolated_count.load(Ordering::Acquire)
    }

    pub fn worst_route_latency(&self) -> LatencySamples {
        self.worst_route_latency.load(Ordering::Acquire)
    }

    pub fn worst_route_latency_ms(&self) -> f64 {
        samples_to_ms(self.worst_route_latency(), self.config.read().sample_rate)
    }

    pub fn worst_io_latency(&self, direction: LatencyDirection) -> LatencySamples {
        match direction {
            LatencyDirection::Playback => self.worst_playback_io.load(Ordering::Acquire),
            LatencyDirection::Capture => self.worst_capture_io.load(Ordering::Acquire),
        }
    }

    fn lookup(snapshot: &GraphSnapshot, id: RouteId) -> RoutingResult<Arc<Route>> {
        snapshot
            .route(id)
            .cloned()
            .ok_or(RoutingError::RouteNotFound(id))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Guards
    // ─────────────────────────────────────────────────────────────────────

    /// Hold off recomputation while a batch of connections is made
    pub fn begin_initial_connections(&self) -> ConnectionBatch<'_> {
        self.state.initial_connecting.fetch_add(1, Ordering::AcqRel);
        ConnectionBatch { graph: self }
    }

    /// Stop all further recomputation; used while tearing the graph down
    pub fn shutdown(&self) {
        let _writer = self.writer.lock();
        self.state.deletion.store(true, Ordering::Release);
        log::info!("route graph shutting down");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Routes
    // ─────────────────────────────────────────────────────────────────────

    fn build_route(&self, spec: RouteSpec) -> Route {
        let id = RouteId(self.next_route_id.fetch_add(1, Ordering::Relaxed));
        Route::new(id, spec)
    }

    pub fn add_route(&self, spec: RouteSpec) -> RouteId {
        let route = self.build_route(spec);
        let id = route.id();
        self.insert_routes(vec![route]);
        id
    }

    /// Add several routes with a single resort
    pub fn add_routes(&self, specs: impl IntoIterator<Item = RouteSpec>) -> Vec<RouteId> {
        let routes: Vec<Route> = specs.into_iter().map(|s| self.build_route(s)).collect();
        let ids = routes.iter().map(Route::id).collect();
        self.insert_routes(routes);
        ids
    }

    fn insert_routes(&self, routes: Vec<Route>) {
        let _writer = self.writer.lock();
        {
            let _adding = FlagGuard::raise(&self.state.adding_routes);
            let current = self.snapshot.load_full();
            let soloing = self.soloing();
            let solo_mute_override = self.config.read().solo_mute_override;

            let mut list = current.routes().to_vec();
            for route in routes {
                route.act_on_mute(soloing, solo_mute_override);
                log::debug!("adding {} \"{}\"", route.id(), route.name());
                list.push(Arc::new(route));
            }
            self.snapshot.store(Arc::new(current.with_routes(list)));
        }
        self.graph_reordered_locked();
    }

    pub fn remove_route(&self, id: RouteId) -> RoutingResult<()> {
        let _writer = self.writer.lock();
        let current = self.snapshot.load_full();
        let route = Self::lookup(&current, id)?;

        // Undo what this route contributes while it is still in the graph
        let mut solo = SoloPass::default();
        let solo_delta = route.solo_control().set_self_solo(false);
        if solo_delta != 0 {
            self.solo_pass(&current, &route, solo_delta, GroupControlDisposition::NoGroup, &mut solo);
        }
        let isolate_delta = route.solo_isolate_control().set_solo_isolated(false);
        if isolate_delta != 0 {
            Self::push_solo_isolate(&current, &route, isolate_delta);
        }

        let next = {
            let _removing = FlagGuard::raise(&self.state.removing_routes);
            for other in current.routes().iter().filter(|r| r.id() != id) {
                other.io_mut(PortDirection::Input).disconnect_route(id);
                other.io_mut(PortDirection::Output).disconnect_route(id);
                let sends = other.remove_sends_to(id);
                if sends > 0 {
                    log::debug!("{}: dropped {} send(s) to {}", other.id(), sends, id);
                }
            }
            let next = Arc::new(current.without_route(id));
            self.snapshot.store(Arc::clone(&next));
            next
        };
        log::info!("removed {} \"{}\"", id, route.name());

        if solo_delta != 0 || isolate_delta != 0 {
            self.finish_solo_pass(&next, &solo);
        }
        self.graph_reordered_locked();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Connections
    // ─────────────────────────────────────────────────────────────────────

    fn validate_link(
        snapshot: &GraphSnapshot,
        from: PortRef,
        to: PortRef,
    ) -> RoutingResult<(Arc<Route>, Arc<Route>)> {
        if from.direction != PortDirection::Output || to.direction != PortDirection::Input {
            return Err(RoutingError::WrongDirection { from, to });
        }
        if from.route == to.route {
            return Err(RoutingError::SelfConnection(from.route));
        }
        let src = Self::lookup(snapshot, from.route)?;
        let dst = Self::lookup(snapshot, to.route)?;

        let from_type = src
            .output()
            .port(from.index)
            .map(|p| p.data_type())
            .ok_or(RoutingError::PortNotFound(from))?;
        let to_type = dst
            .input()
            .port(to.index)
            .map(|p| p.data_type())
            .ok_or(RoutingError::PortNotFound(to))?;
        if from_type != to_type {
            return Err(RoutingError::DataTypeMismatch {
                from: from_type,
                to: to_type,
            });
        }
        Ok((src, dst))
    }

    /// Connect an output port to an input port; false if already connected
    pub fn connect(&self, from: PortRef, to: PortRef) -> RoutingResult<bool> {
        let _writer = self.writer.lock();
        let snapshot = self.snapshot.load_full();
        let (src, dst) = Self::validate_link(&snapshot, from, to)?;

        let added = src.io_mut(PortDirection::Output).connect(from.index, to);
        dst.io_mut(PortDirection::Input).connect(to.index, from);
        if added {
            log::debug!("connected {} -> {}", from, to);
            self.graph_reordered_locked();
        }
        Ok(added)
    }

    /// False if the ports were not connected
    pub fn disconnect(&self, from: PortRef, to: PortRef) -> RoutingResult<bool> {
        let _writer = self.writer.lock();
        let snapshot = self.snapshot.load_full();
        let (src, dst) = Self::validate_link(&snapshot, from, to)?;

        let removed = src.io_mut(PortDirection::Output).disconnect(from.index, to);
        dst.io_mut(PortDirection::Input).disconnect(to.index, from);
        if removed {
            log::debug!("disconnected {} -> {}", from, to);
            self.graph_reordered_locked();
        }
        Ok(removed)
    }

    /// Wire `from`'s outputs to `to`'s inputs pairwise per data type
    ///
    /// Returns the number of new connections.
    pub fn connect_routes(&self, from: RouteId, to: RouteId) -> RoutingResult<usize> {
        if from == to {
            return Err(RoutingError::SelfConnection(from));
        }
        let _writer = self.writer.lock();
        let snapshot = self.snapshot.load_full();
        let src = Self::lookup(&snapshot, from)?;
        let dst = Self::lookup(&snapshot, to)?;

        let mut links = Vec::new();
        for data_type in [DataType::Audio, DataType::Midi] {
            let outs = src.output().indices_of(data_type);
            let ins = dst.input().indices_of(data_type);
            links.extend(
                outs.into_iter()
                    .zip(ins)
                    .map(|(o, i)| (PortRef::output(from, o), PortRef::input(to, i))),
            );
        }

        let mut added = 0;
        for (out_port, in_port) in links {
            if src
                .io_mut(PortDirection::Output)
                .connect(out_port.index, in_port)
            {
                added += 1;
            }
            dst.io_mut(PortDirection::Input)
                .connect(in_port.index, out_port);
        }
        if added > 0 {
            log::debug!("connected {} -> {} ({} link(s))", from, to, added);
            self.graph_reordered_locked();
        }
        Ok(added)
    }

    /// Remove every connection from `from`'s outputs to `to`'s inputs
    pub fn disconnect_routes(&self, from: RouteId, to: RouteId) -> RoutingResult<usize> {
        let _writer = self.writer.lock();
        let snapshot = self.snapshot.load_full();
        let src = Self::lookup(&snapshot, from)?;
        let dst = Self::lookup(&snapshot, to)?;

        let removed = src.io_mut(PortDirection::Output).disconnect_route(to);
        dst.io_mut(PortDirection::Input).disconnect_route(from);
        if removed > 0 {
            self.graph_reordered_locked();
        }
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Processors and sends
    // ─────────────────────────────────────────────────────────────────────

    /// Append an aux send from `from` to `to`; returns its chain slot
    pub fn add_send(&self, from: RouteId, to: RouteId) -> RoutingResult<usize> {
        self.add_processor(from, Arc::new(AuxSend::new(to)))
    }

    pub fn remove_send(&self, route: RouteId, index: usize) -> RoutingResult<()> {
        let _writer = self.writer.lock();
        let snapshot = self.snapshot.load_full();
        let owner = Self::lookup(&snapshot, route)?;

        let is_send = owner
            .processor(index)
            .is_some_and(|p| p.as_send().is_some());
        if !is_send {
            return Err(RoutingError::SendNotFound { route, index });
        }
        owner.remove_processor(index);
        self.graph_reordered_locked();
        Ok(())
    }

    pub fn set_send_active(&self, route: RouteId, index: usize, active: bool) -> RoutingResult<()> {
        let _writer = self.writer.lock();
        let snapshot = self.snapshot.load_full();
        let owner = Self::lookup(&snapshot, route)?;

        let processor = owner
            .processor(index)
            .ok_or(RoutingError::SendNotFound { route, index })?;
        let send = processor
            .as_send()
            .ok_or(RoutingError::SendNotFound { route, index })?;
        send.set_active(active);
        self.graph_reordered_locked();
        Ok(())
    }

    /// Append a processor; sends re-run the graph, anything else only latency
    pub fn add_processor(
        &self,
        route: RouteId,
        processor: Arc<dyn Processor>,
    ) -> RoutingResult<usize> {
        let _writer = self.writer.lock();
        let snapshot = self.snapshot.load_full();
        let owner = Self::lookup(&snapshot, route)?;

        let send_target = processor.as_send().map(|s| s.target());
        if let Some(target) = send_target {
            if target == route {
                return Err(RoutingError::SelfConnection(route));
            }
            Self::lookup(&snapshot, target)?;
        }

        let index = owner.add_processor(processor);
        match send_target {
            Some(target) => {
                log::debug!("{}: send to {} at slot {}", route, target, index);
                self.graph_reordered_locked();
            }
            None => {
                self.update_latency_compensation_locked(false);
            }
        }
        Ok(index)
    }

    pub fn remove_processor(
        &self,
        route: RouteId,
        index: usize,
    ) -> RoutingResult<Arc<dyn Processor>> {
        let _writer = self.writer.lock();
        let snapshot = self.snapshot.load_full();
        let owner = Self::lookup(&snapshot, route)?;

        let processor = owner
            .remove_processor(index)
            .ok_or(RoutingError::ProcessorNotFound { route, index })?;
        if processor.as_send().is_some() {
            self.graph_reordered_locked();
        } else {
            // Later sends moved down a slot; their input delays are keyed by slot
            self.update_latency_compensation_locked(true);
        }
        Ok(processor)
    }

    pub fn set_user_latency(&self, route: RouteId, samples: LatencySamples) -> RoutingResult<()> {
        let _writer = self.writer.lock();
        let snapshot = self.snapshot.load_full();
        Self::lookup(&snapshot, route)?.set_user_latency(samples);
        self.update_latency_compensation_locked(false);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sorting
    // ─────────────────────────────────────────────────────────────────────

    /// Rebuild edges, sort and retrace reachability
    ///
    /// On feedback nothing but the feedback flag changes: the previous
    /// order, edges and reachability stay installed.
    pub fn resort(&self) -> ResortOutcome {
        let _writer = self.writer.lock();
        self.resort_locked()
    }

    fn resort_locked(&self) -> ResortOutcome {
        if self.state.structural_change_in_flight() {
            log::debug!("resort deferred: structural change in flight");
            return ResortOutcome::Deferred;
        }

        let current = self.snapshot.load_full();
        let edges = FeedEdges::rebuild(current.routes());
        let ids = current.order();

        match sort::topological_sort(&ids, &edges, current.sorted_order()) {
            Ok(order) => {
                let routes: Vec<Arc<Route>> = order
                    .iter()
                    .filter_map(|id| current.route(*id).cloned())
                    .collect();
                let reach = Reachability::trace_all(&order, &edges);
                let generation = current.generation() + 1;
                log::info!(
                    "graph sorted: generation {}, {} route(s), {} edge(s)",
                    generation,
                    routes.len(),
                    edges.len()
                );
                self.snapshot.store(Arc::new(GraphSnapshot::sorted(
                    generation, routes, edges, reach,
                )));
                self.events.emit(GraphEvent::SuccessfulGraphSort { generation });
                ResortOutcome::Sorted { generation }
            }
            Err(feedback) => {
                log::warn!(
                    "{} {:?}; keeping generation {}",
                    feedback,
                    feedback.routes,
                    current.generation()
                );
                self.snapshot.store(Arc::new(current.with_feedback()));
                self.events.emit(GraphEvent::FeedbackDetected {
                    routes: feedback.routes.clone(),
                });
                ResortOutcome::Feedback(feedback)
            }
        }
    }

    /// Resort and, if that succeeded, recompute latency for the whole graph
    pub fn graph_reordered(&self) {
        let _writer = self.writer.lock();
        self.graph_reordered_locked();
    }

    fn graph_reordered_locked(&self) {
        if self.resort_locked().is_sorted() {
            self.update_latency_compensation_locked(true);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Latency
    // ─────────────────────────────────────────────────────────────────────

    /// Converge route latencies in both directions
    ///
    /// Port latencies and alignment delays are redone when anything
    /// changed or when `force_whole_graph` is set (block size change).
    /// Returns `None` when skipped: structural change in flight, or the
    /// last sort found feedback.
    pub fn update_latency_compensation(&self, force_whole_graph: bool) -> Option<LatencyReport> {
        let _writer = self.writer.lock();
        self.update_latency_compensation_locked(force_whole_graph)
    }

    fn update_latency_compensation_locked(&self, force_whole_graph: bool) -> Option<LatencyReport> {
        if self.state.structural_change_in_flight() {
            log::debug!("latency update deferred: structural change in flight");
            return None;
        }
        let snapshot = self.snapshot.load_full();
        if snapshot.has_feedback() {
            log::debug!(
                "latency update skipped: feedback since generation {}",
                snapshot.generation()
            );
            return None;
        }

        let engine = LatencyCompensation::new(self.config.read().latency_pass_limit);
        let playback = engine.update(&snapshot, LatencyDirection::Playback);
        let capture = engine.update(&snapshot, LatencyDirection::Capture);

        let worst = playback.worst_route_latency.max(capture.worst_route_latency);
        let previous_worst = self.worst_route_latency.swap(worst, Ordering::AcqRel);
        let mut report = LatencyReport {
            playback,
            capture,
            previous_worst,
            worst_route_latency: worst,
            ..Default::default()
        };

        for event in report.bailout_events() {
            self.events.emit(event);
        }
        if report.worst_changed() {
            log::info!(
                "worst route latency {} -> {} samples ({:.2} ms)",
                previous_worst,
                worst,
                samples_to_ms(worst, self.config.read().sample_rate)
            );
            self.events.emit(GraphEvent::WorstLatencyChanged {
                previous: previous_worst,
                current: worst,
            });
        }

        if force_whole_graph || report.changed() || report.worst_changed() {
            let playback_io = engine.update_io_latency(&snapshot, LatencyDirection::Playback);
            let capture_io = engine.update_io_latency(&snapshot, LatencyDirection::Capture);
            let old_playback = self.worst_playback_io.swap(playback_io, Ordering::AcqRel);
            let old_capture = self.worst_capture_io.swap(capture_io, Ordering::AcqRel);
            if old_playback != playback_io || old_capture != capture_io {
                self.events.emit(GraphEvent::WorstIoLatencyChanged {
                    playback: playback_io,
                    capture: capture_io,
                });
            }

            let plan = pdc::align_mix_points(&snapshot);
            for route in snapshot.routes() {
                if route.set_input_compensation(&plan.input_delays(route.id())) {
                    log::debug!("{}: input delays {:?}", route.id(), route.input_compensations());
                }
            }

            report.io_recomputed = true;
            report.worst_playback_io = playback_io;
            report.worst_capture_io = capture_io;
        } else {
            report.worst_playback_io = self.worst_playback_io.load(Ordering::Acquire);
            report.worst_capture_io = self.worst_capture_io.load(Ordering::Acquire);
        }
        Some(report)
    }

    /// New engine block size; recomputes the whole graph
    pub fn set_buffer_size(&self, size: BufferSize) -> Option<LatencyReport> {
        self.config.write().buffer_size = size;
        self.update_latency_compensation(true)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Solo / mute
    // ─────────────────────────────────────────────────────────────────────

    /// Set a route's explicit solo, fanning out to its group per `disposition`
    pub fn set_solo(
        &self,
        route: RouteId,
        on: bool,
        disposition: GroupControlDisposition,
    ) -> RoutingResult<()> {
        let _writer = self.writer.lock();
        let snapshot = self.snapshot.load_full();
        let route = Self::lookup(&snapshot, route)?;
        if !route.can_solo() {
            log::debug!("{} cannot solo", route.id());
            return Ok(());
        }

        let (members, disposition) = self.solo_targets(&snapshot, &route, disposition);
        let mut pass = SoloPass::default();
        let mut changed = false;
        for member in members.iter().filter(|m| m.can_solo()) {
            let delta = member.solo_control().set_self_solo(on);
            if delta != 0 {
                self.solo_pass(&snapshot, member, delta, disposition, &mut pass);
                changed = true;
            }
        }
        if changed {
            self.finish_solo_pass(&snapshot, &pass);
        }
        Ok(())
    }

    /// Routes a solo change applies to, and the disposition to pass on
    fn solo_targets(
        &self,
        snapshot: &GraphSnapshot,
        route: &Arc<Route>,
        disposition: GroupControlDisposition,
    ) -> (Vec<Arc<Route>>, GroupControlDisposition) {
        let groups = self.groups.read();
        let fans_out = route
            .route_group()
            .and_then(|id| groups.get(id))
            .is_some_and(|group| disposition.applies_to(group));
        if !fans_out {
            return (vec![Arc::clone(route)], disposition);
        }

        let group = route.route_group();
        let members = snapshot
            .routes()
            .iter()
            .filter(|r| r.route_group() == group)
            .cloned()
            .collect();
        (members, GroupControlDisposition::ForGroup)
    }

    /// A route's explicit solo moved by `delta`; propagate it
    ///
    /// The caller has already changed the route's own solo flag.
    pub fn route_solo_changed(
        &self,
        route: RouteId,
        delta: i32,
        group_override: GroupControlDisposition,
    ) -> RoutingResult<()> {
        let _writer = self.writer.lock();
        let snapshot = self.snapshot.load_full();
        let route = Self::lookup(&snapshot, route)?;
        if delta == 0 {
            return Ok(());
        }

        let mut pass = SoloPass::default();
        self.solo_pass(&snapshot, &route, delta, group_override, &mut pass);
        self.finish_solo_pass(&snapshot, &pass);
        Ok(())
    }

    fn solo_pass(
        &self,
        snapshot: &GraphSnapshot,
        route: &Route,
        delta: i32,
        disposition: GroupControlDisposition,
        pass: &mut SoloPass,
    ) {
        let exclusive = self.config.read().exclusive_solo;
        let skip_group = if disposition.group_already_accounted_for() {
            route.route_group()
        } else {
            None
        };
        log::debug!("{}: solo delta {} ({:?})", route.id(), delta, disposition);

        if delta > 0 && exclusive {
            for other in snapshot.routes() {
                if other.id() == route.id() || other.is_isolated() || !other.can_solo() {
                    continue;
                }
                if skip_group.is_some() && other.route_group() == skip_group {
                    continue;
                }
                if other.solo_control().set_self_solo(false) < 0 {
                    log::debug!("exclusive solo: {} released", other.id());
                    // Direct set: only its own share is undone, no cascade
                    apply_implicit_solo(snapshot, other, -1, None);
                }
            }
        }

        pass.uninvolved
            .extend(apply_implicit_solo(snapshot, route, delta, skip_group));
    }

    /// Recount session solo state, re-evaluate mutes, notify once
    fn finish_solo_pass(&self, snapshot: &GraphSnapshot, pass: &SoloPass) {
        self.update_route_solo_state(snapshot);

        let soloing = self.soloing();
        let solo_mute_override = self.config.read().solo_mute_override;
        for route in snapshot.routes() {
            let flipped = route.act_on_mute(soloing, solo_mute_override);
            if flipped || pass.uninvolved.contains(&route.id()) {
                self.events.emit(GraphEvent::MuteChanged(route.id()));
            }
        }
        self.events.emit(GraphEvent::SoloChanged);
    }

    fn update_route_solo_state(&self, snapshot: &GraphSnapshot) {
        let routes = snapshot.routes();
        let soloing = routes
            .iter()
            .any(|r| r.can_solo() && r.solo_control().self_soloed());
        let isolated = routes.iter().filter(|r| r.is_isolated()).count();

        if self.soloing.swap(soloing, Ordering::AcqRel) != soloing {
            log::info!("solo {}", if soloing { "active" } else { "cleared" });
            self.events.emit(GraphEvent::SoloActive(soloing));
        }
        if self.isolated_count.swap(isolated, Ordering::AcqRel) != isolated {
            self.events
                .emit(GraphEvent::SoloIsolatedChanged { count: isolated });
        }
    }

    /// Push an isolate change onto everything `route` feeds audibly
    fn push_solo_isolate(snapshot: &GraphSnapshot, route: &Route, delta: i32) {
        let reach = snapshot.reach();
        for other in snapshot.routes() {
            if other.id() == route.id() || !other.can_solo() {
                continue;
            }
            if reach.feeds(route.id(), other.id()) == Some(false) {
                other.solo_isolate_control().mod_isolated_by_upstream(delta);
            }
        }
    }

    pub fn set_solo_isolated(&self, route: RouteId, on: bool) -> RoutingResult<()> {
        let _writer = self.writer.lock();
        let snapshot = self.snapshot.load_full();
        let route = Self::lookup(&snapshot, route)?;

        let delta = route.solo_isolate_control().set_solo_isolated(on);
        if delta == 0 {
            return Ok(());
        }
        log::debug!("{}: solo isolate {}", route.id(), on);
        Self::push_solo_isolate(&snapshot, &route, delta);
        self.finish_solo_pass(&snapshot, &SoloPass::default());
        Ok(())
    }

    /// Returns whether the effective mute changed
    pub fn set_mute(&self, route: RouteId, on: bool) -> RoutingResult<bool> {
        let _writer = self.writer.lock();
        let snapshot = self.snapshot.load_full();
        let route = Self::lookup(&snapshot, route)?;

        route.mute_control().set_muted(on);
        let flipped = route.act_on_mute(self.soloing(), self.config.read().solo_mute_override);
        if flipped {
            self.events.emit(GraphEvent::MuteChanged(route.id()));
        }
        Ok(flipped)
    }

    /// Drop every explicit and implicit solo
    pub fn clear_all_solo_state(&self) {
        let _writer = self.writer.lock();
        let snapshot = self.snapshot.load_full();

        let mut cleared = false;
        for route in snapshot.routes() {
            cleared |= route.solo_control().clear_all();
        }
        if cleared {
            log::info!("cleared all solo state");
            self.finish_solo_pass(&snapshot, &SoloPass::default());
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Groups
    // ─────────────────────────────────────────────────────────────────────

    pub fn create_route_group(&self, name: &str) -> GroupId {
        self.groups.write().create(name)
    }

    pub fn route_group(&self, id: GroupId) -> Option<RouteGroup> {
        self.groups.read().get(id).cloned()
    }

    pub fn remove_route_group(&self, id: GroupId) -> RoutingResult<()> {
        let _writer = self.writer.lock();
        self.groups
            .write()
            .remove(id)
            .ok_or(RoutingError::GroupNotFound(id))?;
        for route in self.snapshot.load().routes() {
            if route.route_group() == Some(id) {
                route.set_route_group(None);
            }
        }
        Ok(())
    }

    /// Move `route` into `group` (out of any previous one)
    pub fn add_route_to_group(&self, group: GroupId, route: RouteId) -> RoutingResult<()> {
        let _writer = self.writer.lock();
        if self.groups.read().get(group).is_none() {
            return Err(RoutingError::GroupNotFound(group));
        }
        let snapshot = self.snapshot.load_full();
        Self::lookup(&snapshot, route)?.set_route_group(Some(group));
        Ok(())
    }

    pub fn remove_route_from_group(&self, route: RouteId) -> RoutingResult<()> {
        let _writer = self.writer.lock();
        let snapshot = self.snapshot.load_full();
        Self::lookup(&snapshot, route)?.set_route_group(None);
        Ok(())
    }

    pub fn group_members(&self, group: GroupId) -> Vec<RouteId> {
        self.snapshot
            .load()
            .routes()
            .iter()
            .filter(|r| r.route_group() == Some(group))
            .map(|r| r.id())
            .collect()
    }

    pub fn set_group_active(&self, group: GroupId, active: bool) -> RoutingResult<()> {
        self.groups
            .write()
            .get_mut(group)
            .ok_or(RoutingError::GroupNotFound(group))?
            .set_active(active);
        Ok(())
    }

    pub fn set_group_shares_solo(&self, group: GroupId, shares: bool) -> RoutingResult<()> {
        self.groups
            .write()
            .get_mut(group)
            .ok_or(RoutingError::GroupNotFound(group))?
            .set_shares_solo(shares);
        Ok(())
    }
}

/// Adjust implicit solo of every route related to `source` by `delta`
///
/// Routes `source` is fed by get their downstream count moved (unless
/// `source` is itself soloed from upstream); routes it feeds get their
/// upstream count moved. Sends-only relations do not count. Returns the
/// routes with no audible relation to `source`.
fn apply_implicit_solo(
    snapshot: &GraphSnapshot,
    source: &Route,
    delta: i32,
    skip_group: Option<GroupId>,
) -> Vec<RouteId> {
    let reach = snapshot.reach();
    let source_id = source.id();
    let soloed_from_upstream = source.solo_control().soloed_by_others_upstream() > 0;

    let mut uninvolved = Vec::new();
    for other in snapshot.routes() {
        let id = other.id();
        if id == source_id || other.is_isolated() || !other.can_solo() {
            continue;
        }
        if skip_group.is_some() && other.route_group() == skip_group {
            continue;
        }

        let mut in_signal_flow = false;
        if reach.feeds(id, source_id) == Some(false) {
            if soloed_from_upstream {
                log::trace!("{} already soloed by upstream", source_id);
            } else {
                other.solo_control().mod_solo_by_others_downstream(delta);
            }
            in_signal_flow = true;
        }
        if reach.feeds(source_id, id) == Some(false) {
            other.solo_control().mod_solo_by_others_upstream(delta);
            in_signal_flow = true;
        }
        if !in_signal_flow {
            uninvolved.push(id);
        }
    }
    uninvolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::Insert;

    fn graph() -> RouteGraph {
        RouteGraph::new(RoutingConfig::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = RoutingConfig::default().with_latency_pass_limit(0);
        assert!(matches!(
            RouteGraph::new(config),
            Err(RoutingError::Config(_))
        ));
    }

    #[test]
    fn test_add_route_sorts_and_publishes() {
        let graph = graph();
        let rx = graph.events();
        let a = graph.add_route(RouteSpec::audio_track("A", 2));
        assert_eq!(graph.processing_order(), vec![a]);
        assert_eq!(graph.generation(), 1);
        assert!(rx
            .try_iter()
            .any(|e| e == GraphEvent::SuccessfulGraphSort { generation: 1 }));
    }

    #[test]
    fn test_connect_validation() {
        let graph = graph();
        let a = graph.add_route(RouteSpec::audio_track("A", 2));
        let keys = graph.add_route(RouteSpec::midi_track("Keys"));

        assert!(matches!(
            graph.connect(PortRef::input(a, 0), PortRef::input(keys, 0)),
            Err(RoutingError::WrongDirection { .. })
        ));
        assert!(matches!(
            graph.connect(PortRef::output(a, 0), PortRef::input(a, 0)),
            Err(RoutingError::SelfConnection(_))
        ));
        assert!(matches!(
            graph.connect(PortRef::output(a, 0), PortRef::input(keys, 0)),
            Err(RoutingError::DataTypeMismatch { .. })
        ));
        assert!(matches!(
            graph.connect(PortRef::output(a, 7), PortRef::input(keys, 0)),
            Err(RoutingError::PortNotFound(_))
        ));
        assert!(matches!(
            graph.connect(PortRef::output(a, 0), PortRef::input(RouteId(99), 0)),
            Err(RoutingError::RouteNotFound(RouteId(99)))
        ));
    }

    #[test]
    fn test_connect_is_symmetric_and_idempotent() {
        let graph = graph();
        let a = graph.add_route(RouteSpec::audio_track("A", 2));
        let b = graph.add_route(RouteSpec::bus("B", 2));

        assert!(graph.connect(PortRef::output(a, 0), PortRef::input(b, 0)).unwrap());
        assert!(!graph.connect(PortRef::output(a, 0), PortRef::input(b, 0)).unwrap());

        let dst = graph.route(b).unwrap();
        let input = dst.input();
        assert!(input.port(0).unwrap().connected_to(PortRef::output(a, 0)));
        drop(input);

        assert_eq!(graph.direct_feeds(a, b), Some(false));
        assert!(graph.disconnect(PortRef::output(a, 0), PortRef::input(b, 0)).unwrap());
        assert_eq!(graph.direct_feeds(a, b), None);
    }

    #[test]
    fn test_connect_routes_pairs_by_type() {
        let graph = graph();
        let a = graph.add_route(RouteSpec::audio_track("A", 2));
        let b = graph.add_route(RouteSpec::bus("B", 2));
        assert_eq!(graph.connect_routes(a, b).unwrap(), 2);
        assert_eq!(graph.connect_routes(a, b).unwrap(), 0);
        assert_eq!(graph.disconnect_routes(a, b).unwrap(), 2);
        assert!(matches!(
            graph.connect_routes(a, a),
            Err(RoutingError::SelfConnection(_))
        ));
    }

    #[test]
    fn test_add_send_validation() {
        let graph = graph();
        let a = graph.add_route(RouteSpec::audio_track("A", 2));
        assert!(matches!(
            graph.add_send(a, a),
            Err(RoutingError::SelfConnection(_))
        ));
        assert!(matches!(
            graph.add_send(a, RouteId(42)),
            Err(RoutingError::RouteNotFound(_))
        ));
        assert!(matches!(
            graph.remove_send(a, 0),
            Err(RoutingError::SendNotFound { .. })
        ));
    }

    #[test]
    fn test_insert_does_not_resort() {
        let graph = graph();
        let a = graph.add_route(RouteSpec::audio_track("A", 2));
        let generation = graph.generation();
        graph
            .add_processor(a, Arc::new(Insert::new("comp", 32)))
            .unwrap();
        assert_eq!(graph.generation(), generation);
        assert_eq!(graph.worst_route_latency(), 32);
    }

    #[test]
    fn test_connection_batch_defers_until_dropped() {
        let graph = graph();
        let a = graph.add_route(RouteSpec::audio_track("A", 2));
        let b = graph.add_route(RouteSpec::bus("B", 2));
        let generation = graph.generation();
        {
            let _outer = graph.begin_initial_connections();
            {
                let _inner = graph.begin_initial_connections();
                graph.connect_routes(b, a).unwrap();
                assert_eq!(graph.resort(), ResortOutcome::Deferred);
            }
            assert!(graph.update_latency_compensation(false).is_none());
            assert_eq!(graph.generation(), generation);
        }
        assert_eq!(graph.generation(), generation + 1);
        assert_eq!(graph.processing_order(), vec![b, a]);
    }

    #[test]
    fn test_shutdown_stops_recomputation() {
        let graph = graph();
        graph.add_route(RouteSpec::audio_track("A", 2));
        graph.shutdown();
        assert_eq!(graph.resort(), ResortOutcome::Deferred);
        assert!(graph.update_latency_compensation(true).is_none());
    }

    #[test]
    fn test_remove_route_drops_links_and_sends() {
        let graph = graph();
        let a = graph.add_route(RouteSpec::audio_track("A", 2));
        let b = graph.add_route(RouteSpec::bus("B", 2));
        let fx = graph.add_route(RouteSpec::bus("FX", 2));
        graph.connect_routes(a, b).unwrap();
        graph.add_send(a, fx).unwrap();

        graph.remove_route(fx).unwrap();
        assert_eq!(graph.route(a).unwrap().processor_count(), 0);
        graph.remove_route(b).unwrap();
        assert!(!graph.route(a).unwrap().output().connected_to_route(b));
        assert_eq!(graph.processing_order(), vec![a]);
        assert!(matches!(
            graph.remove_route(b),
            Err(RoutingError::RouteNotFound(_))
        ));
    }

    #[test]
    fn test_group_registry() {
        let graph = graph();
        let a = graph.add_route(RouteSpec::audio_track("A", 2));
        let group = graph.create_route_group("Drums");
        graph.add_route_to_group(group, a).unwrap();
        assert_eq!(graph.group_members(group), vec![a]);

        graph.set_group_shares_solo(group, false).unwrap();
        assert_eq!(graph.route_group(group).map(|g| g.shares_solo()), Some(false));

        graph.remove_route_group(group).unwrap();
        assert_eq!(graph.route(a).unwrap().route_group(), None);
        assert!(matches!(
            graph.add_route_to_group(group, a),
            Err(RoutingError::GroupNotFound(_))
        ));
    }

    #[test]
    fn test_set_mute_reports_flip() {
        let graph = graph();
        let a = graph.add_route(RouteSpec::audio_track("A", 2));
        assert!(graph.set_mute(a, true).unwrap());
        assert!(!graph.set_mute(a, true).unwrap());
        assert!(graph.route(a).unwrap().muted());
    }
}
