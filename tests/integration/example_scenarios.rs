//! End-to-end mutation scenarios

use super::test_utils::{counting_handler, todo, Graph, GraphNode};
use cascade_tracker::error::InvalidationError;
use cascade_tracker::invalidation::from_fn;
use cascade_tracker::{
    CascadeConfig, CascadeEngine, EntityNode, Operation, ResponseConfig, TrackerConfig,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn test_single_create() {
    let mut engine = CascadeEngine::new(CascadeConfig::default(), None).unwrap();
    engine.start_transaction().unwrap();
    engine.track_create(todo("1", "x")).await.unwrap();

    let data = engine.end_transaction().unwrap();

    assert_eq!(data.updated.len(), 1);
    let entry = &data.updated[0];
    assert_eq!(entry.key.type_name, "Todo");
    assert_eq!(entry.key.id, "1");
    assert_eq!(entry.operation, Operation::Created);
    assert_eq!(entry.record, Some(json!({ "title": "x" })));
    assert!(data.deleted.is_empty());
}

#[tokio::test]
async fn test_entity_cap_of_two() {
    let config = CascadeConfig {
        tracker: TrackerConfig {
            max_entities: 2,
            ..TrackerConfig::default()
        },
        ..CascadeConfig::default()
    };
    let mut engine = CascadeEngine::new(config, None).unwrap();
    engine.start_transaction().unwrap();
    for id in ["1", "2", "3"] {
        engine.track_create(todo(id, "x")).await.unwrap();
    }

    let response = engine.finish(None, vec![]).unwrap();

    assert_eq!(response.cascade.updated.len(), 2);
    assert!(response.metadata().truncated_updated);
}

#[tokio::test]
async fn test_depth_one_stops_at_b() {
    let graph = Graph::new().edge("A", "B").edge("B", "C").into_shared();
    let config = CascadeConfig {
        tracker: TrackerConfig {
            max_depth: 1,
            ..TrackerConfig::default()
        },
        ..CascadeConfig::default()
    };
    let mut engine = CascadeEngine::new(config, None).unwrap();
    engine.start_transaction().unwrap();
    engine.track_update(GraphNode::shared(&graph, "A")).await.unwrap();

    let data = engine.end_transaction().unwrap();
    let ids: Vec<&str> = data.updated.iter().map(|e| e.key.id.as_str()).collect();

    assert_eq!(ids, vec!["A", "B"]);
    assert_eq!(data.max_depth, 1);
}

#[tokio::test]
async fn test_invalidation_failure_keeps_success() {
    let (count, handler) = counting_handler::<InvalidationError>();
    let config = CascadeConfig {
        response: ResponseConfig::default().with_invalidation_error_handler(handler),
        ..CascadeConfig::default()
    };
    let strategy = from_fn(|_, _| Err(InvalidationError::Failed("always".to_string())));
    let mut engine = CascadeEngine::new(config, Some(strategy)).unwrap();
    engine.start_transaction().unwrap();
    engine.track_create(todo("1", "x")).await.unwrap();

    let response = engine.finish(Some(json!({ "id": "1" })), vec![]).unwrap();

    assert!(response.success);
    assert!(response.cascade.invalidations.is_empty());
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_untracked_delete() {
    let mut engine = CascadeEngine::new(CascadeConfig::default(), None).unwrap();
    engine.start_transaction().unwrap();
    let before = chrono::Utc::now().timestamp_millis();
    engine.track_delete("Todo", "1").unwrap();

    let response = engine.finish(None, vec![]).unwrap();

    assert_eq!(response.cascade.deleted.len(), 1);
    let deleted = &response.cascade.deleted[0];
    assert_eq!(deleted.type_name, "Todo");
    assert_eq!(deleted.id, "1");
    assert!(deleted.deleted_at >= before);
}

#[tokio::test]
async fn test_hand_built_graph_with_default_type() {
    let author = EntityNode::new("User", "u1").with_field("name", json!("Ada"));
    let post = EntityNode::untyped("p1")
        .with_field("title", json!("Notes"))
        .with_related(author.into_shared());

    let mut engine = CascadeEngine::new(CascadeConfig::default(), None).unwrap();
    engine.start_transaction().unwrap();
    engine.track_create_as(post.into_shared(), "Post").await.unwrap();

    let response = engine.finish(None, vec![]).unwrap();
    let updated = &response.cascade.updated;

    assert_eq!(updated.len(), 2);
    assert_eq!((updated[0].type_name.as_str(), updated[0].operation), ("Post", Operation::Created));
    assert_eq!((updated[1].type_name.as_str(), updated[1].operation), ("User", Operation::Updated));
    assert_eq!(updated[1].entity, json!({ "name": "Ada" }));
    assert_eq!(response.metadata().depth, 1);
}
