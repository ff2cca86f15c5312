//! Cascade Response Construction
//!
//! Wire payload types and the eager [`ResponseBuilder`]. The builder snapshots the tracked
//! state of a [`TransactionManager`], computes invalidation hints, applies per-category
//! count caps and the byte budget, and stamps metadata.

use crate::config::ResponseConfig;
use crate::error::CascadeError;
use crate::invalidation::{ChangeSet, InvalidationEngine, InvalidationStrategy};
use crate::serialization::SerializationAdapter;
use crate::transaction::TransactionManager;
use crate::types::{now_millis, InvalidationHint, Operation, TrackedEntity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

pub mod streaming;

pub use streaming::{StreamingCascadeResponse, StreamingResponseBuilder};

/// Complete payload returned for one mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeResponse {
    pub success: bool,
    /// Primary mutation result; `null` when there is none
    #[serde(default)]
    pub data: Value,
    pub cascade: CascadeBlock,
    #[serde(default)]
    pub errors: Vec<ResponseError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeBlock {
    pub updated: Vec<UpdatedEntry>,
    pub deleted: Vec<DeletedEntry>,
    pub invalidations: Vec<InvalidationHint>,
    pub metadata: CascadeMetadata,
}

/// Created or updated entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedEntry {
    pub type_name: String,
    pub id: String,
    pub operation: Operation,
    pub entity: Value,
}

impl UpdatedEntry {
    /// `None` for deletions
    pub fn from_tracked(tracked: &TrackedEntity) -> Option<Self> {
        if tracked.is_deleted() {
            return None;
        }
        Some(Self {
            type_name: tracked.key.type_name.clone(),
            id: tracked.key.id.clone(),
            operation: tracked.operation,
            entity: tracked.record.clone().unwrap_or(Value::Null),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedEntry {
    pub type_name: String,
    pub id: String,
    /// Unix milliseconds
    pub deleted_at: i64,
}

impl DeletedEntry {
    /// `None` unless the entity was deleted
    pub fn from_tracked(tracked: &TrackedEntity) -> Option<Self> {
        if !tracked.is_deleted() {
            return None;
        }
        Some(Self {
            type_name: tracked.key.type_name.clone(),
            id: tracked.key.id.clone(),
            deleted_at: tracked.deleted_at.unwrap_or_default(),
        })
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeMetadata {
    /// Unix milliseconds at construction
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// Deepest traversal depth among tracked entities
    pub depth: usize,
    /// Entries across all categories after truncation
    pub affected_count: usize,
    /// Milliseconds since the transaction started
    pub tracking_time: u64,
    /// Milliseconds spent building this response
    pub construction_time: u64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated_updated: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated_deleted: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated_invalidations: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated_size: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub streaming: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub serialization_errors: usize,
}

/// Error entry in the wire payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseError {
    pub message: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ResponseError {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl From<&CascadeError> for ResponseError {
    fn from(err: &CascadeError) -> Self {
        ResponseError::new(err.to_string(), err.code())
    }
}

impl CascadeResponse {
    pub fn to_json(&self) -> Result<String, CascadeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, CascadeError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(input: &str) -> Result<Self, CascadeError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn metadata(&self) -> &CascadeMetadata {
        &self.cascade.metadata
    }
}

pub(crate) fn elapsed_millis(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Builds eager, fully materialized responses
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    config: ResponseConfig,
    invalidations: InvalidationEngine,
}

impl ResponseBuilder {
    pub fn new(config: ResponseConfig, strategy: Option<Arc<dyn InvalidationStrategy>>) -> Self {
        let invalidations = InvalidationEngine::new(strategy, config.on_invalidation_error.clone());
        Self {
            config,
            invalidations,
        }
    }

    pub fn config(&self) -> &ResponseConfig {
        &self.config
    }

    /// Build a response from everything tracked so far. Never fails; without an active
    /// transaction the cascade is empty and carries no transaction id.
    pub fn build_response(
        &self,
        transactions: &TransactionManager,
        primary_result: Option<Value>,
        success: bool,
        errors: Vec<ResponseError>,
    ) -> CascadeResponse {
        let started = Instant::now();
        let tracker = transactions.tracker();
        let changes = ChangeSet::new(tracker.entities());

        let mut invalidations = self.invalidations.compute(&changes, primary_result.as_ref());
        let data = primary_result.unwrap_or(Value::Null);

        let mut updated: Vec<(usize, UpdatedEntry)> = changes
            .updated()
            .filter_map(|t| UpdatedEntry::from_tracked(t).map(|entry| (t.sequence, entry)))
            .collect();
        let mut deleted: Vec<(usize, DeletedEntry)> = changes
            .deleted()
            .filter_map(|t| DeletedEntry::from_tracked(t).map(|entry| (t.sequence, entry)))
            .collect();

        let mut metadata = CascadeMetadata {
            timestamp: now_millis(),
            transaction_id: transactions.transaction_id().map(str::to_string),
            depth: tracker.max_depth_reached(),
            tracking_time: transactions
                .tracking_elapsed()
                .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
                .unwrap_or(0),
            serialization_errors: tracker.serialization_errors(),
            ..CascadeMetadata::default()
        };

        metadata.truncated_updated = truncate(&mut updated, self.config.max_updated_entities)
            || tracker.dropped_updates() > 0;
        metadata.truncated_deleted = truncate(&mut deleted, self.config.max_deleted_entities)
            || tracker.dropped_deletes() > 0;
        metadata.truncated_invalidations =
            truncate(&mut invalidations, self.config.max_invalidations);

        metadata.truncated_size = self.enforce_size_budget(
            &mut updated,
            &mut deleted,
            &mut invalidations,
            &data,
            &errors,
            &metadata,
        );

        if metadata.truncated_updated
            || metadata.truncated_deleted
            || metadata.truncated_invalidations
            || metadata.truncated_size
        {
            info!(
                transaction_id = metadata.transaction_id.as_deref().unwrap_or_default(),
                updated = updated.len(),
                deleted = deleted.len(),
                invalidations = invalidations.len(),
                truncated_size = metadata.truncated_size,
                "cascade response truncated"
            );
        }

        metadata.affected_count = updated.len() + deleted.len() + invalidations.len();
        metadata.construction_time = elapsed_millis(started);

        CascadeResponse {
            success,
            data,
            cascade: CascadeBlock {
                updated: updated.into_iter().map(|(_, entry)| entry).collect(),
                deleted: deleted.into_iter().map(|(_, entry)| entry).collect(),
                invalidations,
                metadata,
            },
            errors,
        }
    }

    /// Same as [`build_response`](Self::build_response) with `success = false`
    pub fn build_error_response(
        &self,
        transactions: &TransactionManager,
        errors: Vec<ResponseError>,
        primary_result: Option<Value>,
    ) -> CascadeResponse {
        self.build_response(transactions, primary_result, false, errors)
    }

    /// Drop the most recently inserted entities until the estimated payload fits the
    /// budget; invalidations go from the tail once both entity lists are empty.
    fn enforce_size_budget(
        &self,
        updated: &mut Vec<(usize, UpdatedEntry)>,
        deleted: &mut Vec<(usize, DeletedEntry)>,
        invalidations: &mut Vec<InvalidationHint>,
        data: &Value,
        errors: &[ResponseError],
        metadata: &CascadeMetadata,
    ) -> bool {
        // Room for the construction time stamped after estimation
        let budget = self
            .config
            .max_response_size_bytes
            .saturating_sub(METADATA_HEADROOM);

        let mut provisional = metadata.clone();
        provisional.affected_count = updated.len() + deleted.len() + invalidations.len();
        provisional.truncated_size = true;

        let mut total = SerializationAdapter::estimate_size(&SizedView {
            success: true,
            data,
            cascade: SizedBlock {
                updated: updated.iter().map(|(_, e)| e).collect(),
                deleted: deleted.iter().map(|(_, e)| e).collect(),
                invalidations,
                metadata: &provisional,
            },
            errors,
        });
        if total <= budget {
            return false;
        }

        while total > budget {
            let drop_updated = match (updated.last(), deleted.last()) {
                (Some((u, _)), Some((d, _))) => u > d,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let removed = if drop_updated {
                popped_size(updated, |(_, e)| e)
            } else {
                popped_size(deleted, |(_, e)| e)
            };
            total = total.saturating_sub(removed);
        }

        while total > budget && !invalidations.is_empty() {
            total = total.saturating_sub(popped_size(invalidations, |hint| hint));
        }

        true
    }
}

const METADATA_HEADROOM: usize = 20;

/// Bytes freed by removing the last entry, including its separating comma
fn popped_size<T, S: Serialize>(entries: &mut Vec<T>, wire: impl Fn(&T) -> &S) -> usize {
    match entries.pop() {
        Some(entry) => {
            let separator = usize::from(!entries.is_empty());
            SerializationAdapter::estimate_size(wire(&entry)) + separator
        }
        None => 0,
    }
}

/// Keep the first `cap` entries; true when anything was cut
fn truncate<T>(entries: &mut Vec<T>, cap: usize) -> bool {
    if entries.len() > cap {
        entries.truncate(cap);
        true
    } else {
        false
    }
}

/// Borrowed mirror of [`CascadeResponse`] used for size estimation without cloning
#[derive(Serialize)]
struct SizedView<'a> {
    success: bool,
    data: &'a Value,
    cascade: SizedBlock<'a>,
    errors: &'a [ResponseError],
}

#[derive(Serialize)]
struct SizedBlock<'a> {
    updated: Vec<&'a UpdatedEntry>,
    deleted: Vec<&'a DeletedEntry>,
    invalidations: &'a [InvalidationHint],
    metadata: &'a CascadeMetadata,
}
