//! Processing order, feedback handling and snapshot publication

use rf_routing::{
    GraphEvent, PortRef, ResortOutcome, RouteGraph, RouteId, RouteSpec, RoutingConfig,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn graph() -> RouteGraph {
    init_logging();
    RouteGraph::new(RoutingConfig::default()).unwrap()
}

fn add_buses(graph: &RouteGraph, count: usize) -> Vec<RouteId> {
    graph.add_routes((0..count).map(|i| RouteSpec::bus(format!("Bus {}", i + 1), 2)))
}

fn feedback_events(rx: &crossbeam_channel::Receiver<GraphEvent>) -> usize {
    rx.try_iter()
        .filter(|e| matches!(e, GraphEvent::FeedbackDetected { .. }))
        .count()
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORDERING
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_every_edge_runs_forward() {
    let graph = graph();
    let r = add_buses(&graph, 8);

    graph.connect_routes(r[7], r[3]).unwrap();
    graph.connect_routes(r[3], r[0]).unwrap();
    graph.connect_routes(r[5], r[0]).unwrap();
    graph.connect_routes(r[6], r[5]).unwrap();
    graph.connect_routes(r[1], r[2]).unwrap();
    graph.connect_routes(r[2], r[4]).unwrap();
    graph.add_send(r[4], r[6]).unwrap();

    let snapshot = graph.snapshot();
    assert!(!snapshot.has_feedback());
    assert_eq!(snapshot.len(), 8);
    assert_eq!(snapshot.edges().len(), 7);

    for edge in snapshot.edges().iter() {
        let from = snapshot.position(edge.from).unwrap();
        let to = snapshot.position(edge.to).unwrap();
        assert!(from < to, "{} must precede {}", edge.from, edge.to);
    }

    let mut ids = snapshot.order();
    ids.sort();
    assert_eq!(ids, r);
}

#[test]
fn test_unconnected_routes_keep_insertion_order() {
    let graph = graph();
    let r = add_buses(&graph, 4);
    assert_eq!(graph.processing_order(), r);

    let late = graph.add_route(RouteSpec::audio_track("Late", 2));
    let mut expected = r.clone();
    expected.push(late);
    assert_eq!(graph.processing_order(), expected);
}

#[test]
fn test_positions_belong_to_their_generation() {
    let graph = graph();
    let r = add_buses(&graph, 3);
    let before = graph.snapshot_full();
    assert_eq!(before.position(r[2]), Some(2));

    graph.connect_routes(r[2], r[0]).unwrap();
    let after = graph.snapshot_full();
    for (position, id) in graph.processing_order().into_iter().enumerate() {
        assert_eq!(after.position(id), Some(position));
    }
    assert!(after.position(r[2]) < after.position(r[0]));

    // The held generation still reports its own order
    assert_eq!(before.position(r[0]), Some(0));
    assert_eq!(before.position(r[2]), Some(2));
}

#[test]
fn test_resort_is_idempotent() {
    let graph = graph();
    let r = add_buses(&graph, 5);
    graph.connect_routes(r[4], r[1]).unwrap();
    graph.connect_routes(r[3], r[4]).unwrap();

    let before = graph.processing_order();
    let generation = graph.generation();

    assert_eq!(
        graph.resort(),
        ResortOutcome::Sorted {
            generation: generation + 1
        }
    );
    assert_eq!(graph.processing_order(), before);
    assert!(graph.resort().is_sorted());
    assert_eq!(graph.processing_order(), before);
}

#[test]
fn test_disconnect_relaxes_order_but_keeps_it() {
    let graph = graph();
    let r = add_buses(&graph, 3);
    graph.connect_routes(r[2], r[0]).unwrap();
    let constrained = graph.processing_order();
    assert_eq!(constrained, vec![r[1], r[2], r[0]]);

    graph.disconnect_routes(r[2], r[0]).unwrap();
    assert_eq!(graph.processing_order(), constrained);
}

// ═══════════════════════════════════════════════════════════════════════════════
// FEEDBACK
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_feedback_keeps_last_good_order() {
    let graph = graph();
    let rx = graph.events();
    let r = add_buses(&graph, 2);
    graph.add_send(r[0], r[1]).unwrap();

    let order = graph.processing_order();
    let generation = graph.generation();
    rx.try_iter().count();

    graph.add_send(r[1], r[0]).unwrap();

    assert_eq!(feedback_events(&rx), 1);
    assert!(graph.has_feedback());
    assert_eq!(graph.processing_order(), order);
    assert_eq!(graph.generation(), generation);
    assert_eq!(graph.route_count(), 2);
    // Reachability is the one from the last good sort
    assert_eq!(graph.feeds(r[1], r[0]), None);
    assert_eq!(graph.feeds(r[0], r[1]), Some(true));
}

#[test]
fn test_feedback_reported_once_per_attempt() {
    let graph = graph();
    let rx = graph.events();
    let r = add_buses(&graph, 3);
    graph.connect_routes(r[0], r[1]).unwrap();
    graph.connect_routes(r[1], r[2]).unwrap();
    rx.try_iter().count();

    graph.add_send(r[2], r[0]).unwrap();
    assert_eq!(feedback_events(&rx), 1);

    match graph.resort() {
        ResortOutcome::Feedback(feedback) => {
            assert_eq!(feedback.routes, vec![r[0], r[1], r[2]]);
        }
        other => panic!("expected feedback, got {:?}", other),
    }
    assert_eq!(feedback_events(&rx), 1);
}

#[test]
fn test_breaking_the_cycle_recovers() {
    let graph = graph();
    let r = add_buses(&graph, 2);
    graph.add_send(r[0], r[1]).unwrap();
    let slot = graph.add_send(r[1], r[0]).unwrap();
    assert!(graph.has_feedback());

    graph.remove_send(r[1], slot).unwrap();
    assert!(!graph.has_feedback());
    assert_eq!(graph.processing_order(), vec![r[0], r[1]]);
}

#[test]
fn test_routes_added_during_feedback_stay_listed() {
    let graph = graph();
    let r = add_buses(&graph, 2);
    graph.add_send(r[0], r[1]).unwrap();
    graph.add_send(r[1], r[0]).unwrap();

    let extra = graph.add_route(RouteSpec::audio_track("Vox", 1));
    assert!(graph.has_feedback());
    assert_eq!(graph.processing_order(), vec![r[0], r[1], extra]);
    assert!(graph.route(extra).is_some());
}

// ═══════════════════════════════════════════════════════════════════════════════
// SNAPSHOTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_held_snapshot_is_unaffected_by_resort() {
    let graph = graph();
    let r = add_buses(&graph, 2);

    let held = graph.snapshot_full();
    graph.connect_routes(r[1], r[0]).unwrap();

    assert_eq!(held.order(), vec![r[0], r[1]]);
    assert!(held.edges().is_empty());
    assert_eq!(graph.processing_order(), vec![r[1], r[0]]);
    assert!(graph.generation() > held.generation());
}

#[test]
fn test_successful_sort_event_carries_generation() {
    let graph = graph();
    let rx = graph.events();
    let r = add_buses(&graph, 2);
    rx.try_iter().count();

    graph
        .connect(PortRef::output(r[0], 0), PortRef::input(r[1], 0))
        .unwrap();
    let generation = graph.generation();
    assert!(
        rx.try_iter()
            .any(|e| e == GraphEvent::SuccessfulGraphSort { generation })
    );
}

#[test]
fn test_remove_route_reorders_remaining() {
    let graph = graph();
    let r = add_buses(&graph, 3);
    graph.connect_routes(r[0], r[1]).unwrap();
    graph.connect_routes(r[1], r[2]).unwrap();

    graph.remove_route(r[1]).unwrap();
    let snapshot = graph.snapshot();
    assert_eq!(snapshot.order(), vec![r[0], r[2]]);
    assert!(snapshot.edges().is_empty());
    assert_eq!(snapshot.reach().feeds(r[0], r[2]), None);
}
