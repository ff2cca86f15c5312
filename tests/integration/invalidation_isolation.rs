//! Integration tests for invalidation strategies and failure isolation

use super::test_utils::{counting_handler, todo};
use cascade_tracker::error::InvalidationError;
use cascade_tracker::invalidation::from_fn;
use cascade_tracker::{
    CascadeConfig, CascadeEngine, InvalidationHint, ResponseConfig, TypeListInvalidation,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn engine_with_handler(
    strategy: Arc<dyn cascade_tracker::InvalidationStrategy>,
) -> (CascadeEngine, Arc<std::sync::atomic::AtomicUsize>) {
    let (count, handler) = counting_handler::<InvalidationError>();
    let config = CascadeConfig {
        response: ResponseConfig::default().with_invalidation_error_handler(handler),
        ..CascadeConfig::default()
    };
    (CascadeEngine::new(config, Some(strategy)).unwrap(), count)
}

#[tokio::test]
async fn test_failing_strategy_yields_no_hints() {
    let strategy = from_fn(|_, _| Err(InvalidationError::Failed("index offline".to_string())));
    let (mut engine, count) = engine_with_handler(strategy);
    engine.start_transaction().unwrap();
    engine.track_create(todo("1", "t")).await.unwrap();

    let response = engine.build_response(Some(json!({ "id": "1" })), true, vec![]);

    assert!(response.success);
    assert!(response.cascade.invalidations.is_empty());
    assert_eq!(response.cascade.updated.len(), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panicking_strategy_is_contained() {
    let strategy = from_fn(|_, _| panic!("strategy bug"));
    let (mut engine, count) = engine_with_handler(strategy);
    engine.start_transaction().unwrap();
    engine.track_create(todo("1", "t")).await.unwrap();

    let response = engine.finish(None, vec![]).unwrap();

    assert!(response.success);
    assert!(response.cascade.invalidations.is_empty());
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_strategy_sees_changes_and_primary_result() {
    let strategy = from_fn(|changes, primary| {
        let owner = primary
            .and_then(|value| value.get("ownerId"))
            .and_then(|value| value.as_str())
            .unwrap_or("unknown")
            .to_string();
        let created = changes.updated().count();
        let hint = InvalidationHint {
            type_name: "User".to_string(),
            id: Some(owner),
            field: Some("todos".to_string()),
            reason: format!("{created} todos created"),
        };
        Ok(Some(vec![hint]))
    });
    let (mut engine, count) = engine_with_handler(strategy);
    engine.start_transaction().unwrap();
    engine.track_create(todo("1", "t")).await.unwrap();
    engine.track_create(todo("2", "t")).await.unwrap();

    let response = engine.build_response(Some(json!({ "ownerId": "u1" })), true, vec![]);

    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(response.cascade.invalidations.len(), 1);
    let hint = &response.cascade.invalidations[0];
    assert_eq!(hint.id.as_deref(), Some("u1"));
    assert_eq!(hint.reason, "2 todos created");
}

#[tokio::test]
async fn test_none_is_treated_as_empty() {
    let (mut engine, count) = engine_with_handler(from_fn(|_, _| Ok(None)));
    engine.start_transaction().unwrap();
    engine.track_create(todo("1", "t")).await.unwrap();

    let response = engine.build_response(None, true, vec![]);

    assert!(response.cascade.invalidations.is_empty());
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_type_list_strategy_skips_plain_updates() {
    let (mut engine, _) = engine_with_handler(Arc::new(TypeListInvalidation));
    engine.start_transaction().unwrap();
    engine.track_update(todo("1", "t")).await.unwrap();
    engine.track_update(todo("2", "t")).await.unwrap();
    engine.track_delete("Tag", "9").unwrap();

    let response = engine.build_response(None, true, vec![]);

    assert_eq!(
        response.cascade.invalidations,
        vec![InvalidationHint::for_type("Tag", "entity deleted")]
    );
}
