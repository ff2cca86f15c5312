//! Property-based tests for the wire encoding

use cascade_tracker::response::{
    CascadeBlock, CascadeMetadata, CascadeResponse, DeletedEntry, ResponseError, UpdatedEntry,
};
use cascade_tracker::{InvalidationHint, Operation};
use proptest::prelude::*;
use serde_json::{json, Value};

fn updated_entry() -> impl Strategy<Value = UpdatedEntry> {
    ("[A-Z][a-z]{1,8}", "[a-z0-9]{1,6}", any::<bool>(), "[ -~]{0,12}").prop_map(
        |(type_name, id, created, title)| UpdatedEntry {
            type_name,
            id,
            operation: if created {
                Operation::Created
            } else {
                Operation::Updated
            },
            entity: json!({ "title": title, "done": created }),
        },
    )
}

fn deleted_entry() -> impl Strategy<Value = DeletedEntry> {
    ("[A-Z][a-z]{1,8}", "[a-z0-9]{1,6}", 0i64..4_000_000_000_000).prop_map(
        |(type_name, id, deleted_at)| DeletedEntry {
            type_name,
            id,
            deleted_at,
        },
    )
}

fn hint() -> impl Strategy<Value = InvalidationHint> {
    (
        "[A-Z][a-z]{1,8}",
        proptest::option::of("[a-z0-9]{1,6}"),
        proptest::option::of("[a-z]{1,8}"),
        "[a-z ]{1,16}",
    )
        .prop_map(|(type_name, id, field, reason)| InvalidationHint {
            type_name,
            id,
            field,
            reason,
        })
}

fn metadata() -> impl Strategy<Value = CascadeMetadata> {
    (
        (
            0i64..4_000_000_000_000,
            proptest::option::of("txn-[0-9]{1,6}"),
            0usize..10,
            0usize..2000,
        ),
        (0u64..100_000, 0u64..10_000, 0usize..5),
        any::<[bool; 5]>(),
    )
        .prop_map(|(counts, timings, flags)| {
            let (timestamp, transaction_id, depth, affected_count) = counts;
            let (tracking_time, construction_time, serialization_errors) = timings;
            CascadeMetadata {
                timestamp,
                transaction_id,
                depth,
                affected_count,
                tracking_time,
                construction_time,
                truncated_updated: flags[0],
                truncated_deleted: flags[1],
                truncated_invalidations: flags[2],
                truncated_size: flags[3],
                streaming: flags[4],
                serialization_errors,
            }
        })
}

fn response_error() -> impl Strategy<Value = ResponseError> {
    ("[ -~]{1,20}", "[A-Z_]{1,12}", proptest::option::of("[a-z]{1,8}")).prop_map(
        |(message, code, field)| ResponseError {
            message,
            code,
            field,
        },
    )
}

/// Null, a bare scalar or an object
fn primary_result() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        "[a-z0-9]{1,6}".prop_map(|id| json!({ "id": id })),
    ]
}

fn response() -> impl Strategy<Value = CascadeResponse> {
    (
        any::<bool>(),
        primary_result(),
        prop::collection::vec(updated_entry(), 0..6),
        prop::collection::vec(deleted_entry(), 0..6),
        prop::collection::vec(hint(), 0..6),
        metadata(),
        prop::collection::vec(response_error(), 0..3),
    )
        .prop_map(
            |(success, data, updated, deleted, invalidations, metadata, errors)| CascadeResponse {
                success,
                data,
                cascade: CascadeBlock {
                    updated,
                    deleted,
                    invalidations,
                    metadata,
                },
                errors,
            },
        )
}

/// Encoding then decoding preserves every documented field
#[test]
fn test_wire_round_trip_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&response(), |response| {
            let encoded = response.to_json().unwrap();
            let decoded = CascadeResponse::from_json(&encoded).unwrap();
            prop_assert_eq!(decoded, response);
            Ok(())
        })
        .unwrap();
}

/// Flags that are false and absent optional fields never reach the wire
#[test]
fn test_wire_omits_defaults_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&response(), |response| {
            let wire: Value = serde_json::from_slice(&response.to_json_bytes().unwrap()).unwrap();
            prop_assert_eq!(wire.get("data"), Some(&response.data));
            let metadata = &wire["cascade"]["metadata"];
            let expected = &response.cascade.metadata;

            prop_assert_eq!(metadata.get("truncatedSize").is_some(), expected.truncated_size);
            prop_assert_eq!(metadata.get("streaming").is_some(), expected.streaming);
            prop_assert_eq!(
                metadata.get("transactionId").is_some(),
                expected.transaction_id.is_some()
            );
            prop_assert_eq!(
                metadata.get("serializationErrors").is_some(),
                expected.serialization_errors > 0
            );
            Ok(())
        })
        .unwrap();
}
