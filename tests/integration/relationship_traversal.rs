//! Integration tests for bounded breadth-first relationship traversal

use super::test_utils::{counting_handler, BrokenLoader, Graph, GraphNode};
use cascade_tracker::error::SerializationError;
use cascade_tracker::{EntityKey, EntityTracker, TrackOutcome, TrackerConfig};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn tracker(config: TrackerConfig) -> EntityTracker {
    EntityTracker::new(config).unwrap()
}

fn node(id: &str) -> EntityKey {
    EntityKey::new("Node", id)
}

#[tokio::test]
async fn test_depth_recorded_per_layer() {
    let graph = Graph::new().edge("a", "b").edge("b", "c").edge("c", "d").into_shared();
    let mut tracker = tracker(TrackerConfig::default());

    tracker.track_update(GraphNode::shared(&graph, "a"), None).await;

    assert_eq!(tracker.get(&node("a")).unwrap().depth, 0);
    assert_eq!(tracker.get(&node("b")).unwrap().depth, 1);
    assert_eq!(tracker.get(&node("c")).unwrap().depth, 2);
    assert_eq!(tracker.get(&node("d")).unwrap().depth, 3);
    assert_eq!(tracker.max_depth_reached(), 3);
    // d sits at max depth and is never expanded
    assert_eq!(graph.fetches(), 3);
}

#[tokio::test]
async fn test_cycles_terminate() {
    let graph = Graph::new()
        .edge("a", "b")
        .edge("b", "c")
        .edge("c", "a")
        .edge("c", "c")
        .into_shared();
    let config = TrackerConfig {
        max_depth: 50,
        ..TrackerConfig::default()
    };
    let mut tracker = tracker(config);

    tracker.track_update(GraphNode::shared(&graph, "a"), None).await;

    assert_eq!(tracker.len(), 3);
    assert_eq!(graph.fetches(), 3);
}

#[tokio::test]
async fn test_breadth_first_order_across_suspensions() {
    let graph = Graph::new()
        .edge("root", "l")
        .edge("root", "r")
        .edge("l", "ll")
        .edge("r", "rr")
        .into_shared();
    let mut tracker = tracker(TrackerConfig::default());

    tracker.track_create(GraphNode::shared(&graph, "root"), None).await;

    let order: Vec<&str> = tracker.entities().iter().map(|e| e.key.id.as_str()).collect();
    assert_eq!(order, vec!["root", "l", "r", "ll", "rr"]);
}

#[tokio::test]
async fn test_breadth_limit_per_entity() {
    let graph = Graph::new().fan_out("hub", 10).into_shared();
    let config = TrackerConfig {
        max_related_per_entity: 4,
        ..TrackerConfig::default()
    };
    let mut tracker = tracker(config);

    tracker.track_update(GraphNode::shared(&graph, "hub"), None).await;

    assert_eq!(tracker.len(), 5);
    assert!(tracker.get(&node("hub-3")).is_some());
    assert!(tracker.get(&node("hub-4")).is_none());
}

#[tokio::test]
async fn test_zero_depth_never_expands() {
    let graph = Graph::new().fan_out("hub", 3).into_shared();
    let config = TrackerConfig {
        max_depth: 0,
        enable_relationship_tracking: true,
        ..TrackerConfig::default()
    };
    let mut tracker = tracker(config);

    tracker.track_update(GraphNode::shared(&graph, "hub"), None).await;

    assert_eq!(tracker.len(), 1);
    assert_eq!(graph.fetches(), 0);
}

#[tokio::test]
async fn test_disabled_tracking_never_expands() {
    let graph = Graph::new().fan_out("hub", 3).into_shared();
    let config = TrackerConfig {
        enable_relationship_tracking: false,
        ..TrackerConfig::default()
    };
    let mut tracker = tracker(config);

    tracker.track_update(GraphNode::shared(&graph, "hub"), None).await;

    assert_eq!(tracker.len(), 1);
    assert_eq!(graph.fetches(), 0);
}

#[tokio::test]
async fn test_excluded_types_are_not_expanded() {
    let graph = Graph::new().fan_out("hub", 3).into_shared();
    let config = TrackerConfig {
        exclude_types: vec!["Node".to_string()],
        ..TrackerConfig::default()
    };
    let mut tracker = tracker(config);

    let outcome = tracker.track_update(GraphNode::shared(&graph, "hub"), None).await;

    assert_eq!(outcome, TrackOutcome::Excluded);
    assert!(tracker.is_empty());
    assert_eq!(graph.fetches(), 0);
}

#[tokio::test]
async fn test_related_entities_respect_entity_cap() {
    let graph = Graph::new().fan_out("hub", 10).into_shared();
    let config = TrackerConfig {
        max_entities: 3,
        ..TrackerConfig::default()
    };
    let mut tracker = tracker(config);

    tracker.track_update(GraphNode::shared(&graph, "hub"), None).await;

    assert_eq!(tracker.len(), 3);
    assert_eq!(tracker.dropped_updates(), 8);
}

#[tokio::test]
async fn test_failing_loader_keeps_entity() {
    let (count, handler) = counting_handler::<SerializationError>();
    let config = TrackerConfig::default().with_serialization_error_handler(handler);
    let mut tracker = tracker(config);

    let outcome = tracker
        .track_update(Arc::new(BrokenLoader { id: "1".to_string() }), None)
        .await;

    assert_eq!(outcome, TrackOutcome::Inserted);
    assert_eq!(tracker.len(), 1);
    assert_eq!(tracker.serialization_errors(), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
