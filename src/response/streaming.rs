//! Streaming response variant.
//!
//! Entity lists are yielded lazily from the tracked state instead of being materialized up
//! front. Count caps apply; the byte budget does not, since the total size is unknown until
//! the consumer has drained the streams.

use super::{
    elapsed_millis, CascadeBlock, CascadeMetadata, CascadeResponse, DeletedEntry, ResponseError,
    UpdatedEntry,
};
use crate::config::ResponseConfig;
use crate::invalidation::{ChangeSet, InvalidationEngine, InvalidationStrategy};
use crate::transaction::TransactionManager;
use crate::types::{now_millis, InvalidationHint};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Response whose entity lists are streams borrowing the tracked state
pub struct StreamingCascadeResponse<'a> {
    pub success: bool,
    pub data: Value,
    pub updated: BoxStream<'a, UpdatedEntry>,
    pub deleted: BoxStream<'a, DeletedEntry>,
    pub invalidations: Vec<InvalidationHint>,
    pub metadata: CascadeMetadata,
    pub errors: Vec<ResponseError>,
}

impl StreamingCascadeResponse<'_> {
    /// Drain both streams into an eager [`CascadeResponse`]
    pub async fn collect(self) -> CascadeResponse {
        let updated: Vec<UpdatedEntry> = self.updated.collect().await;
        let deleted: Vec<DeletedEntry> = self.deleted.collect().await;
        CascadeResponse {
            success: self.success,
            data: self.data,
            cascade: CascadeBlock {
                updated,
                deleted,
                invalidations: self.invalidations,
                metadata: self.metadata,
            },
            errors: self.errors,
        }
    }
}

impl std::fmt::Debug for StreamingCascadeResponse<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingCascadeResponse")
            .field("success", &self.success)
            .field("invalidations", &self.invalidations.len())
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct StreamingResponseBuilder {
    config: ResponseConfig,
    invalidations: InvalidationEngine,
}

impl StreamingResponseBuilder {
    pub fn new(config: ResponseConfig, strategy: Option<Arc<dyn InvalidationStrategy>>) -> Self {
        let invalidations = InvalidationEngine::new(strategy, config.on_invalidation_error.clone());
        Self {
            config,
            invalidations,
        }
    }

    pub fn build_streaming_response<'a>(
        &self,
        transactions: &'a TransactionManager,
        primary_result: Option<Value>,
        success: bool,
        errors: Vec<ResponseError>,
    ) -> StreamingCascadeResponse<'a> {
        let started = Instant::now();
        let tracker = transactions.tracker();
        let changes = ChangeSet::new(tracker.entities());

        let mut invalidations = self.invalidations.compute(&changes, primary_result.as_ref());
        let truncated_invalidations = invalidations.len() > self.config.max_invalidations;
        invalidations.truncate(self.config.max_invalidations);

        let updated_total = changes.updated().count();
        let deleted_total = changes.deleted().count();
        let updated_len = updated_total.min(self.config.max_updated_entities);
        let deleted_len = deleted_total.min(self.config.max_deleted_entities);

        let metadata = CascadeMetadata {
            timestamp: now_millis(),
            transaction_id: transactions.transaction_id().map(str::to_string),
            depth: tracker.max_depth_reached(),
            affected_count: updated_len + deleted_len + invalidations.len(),
            tracking_time: transactions
                .tracking_elapsed()
                .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
                .unwrap_or(0),
            construction_time: elapsed_millis(started),
            truncated_updated: updated_total > updated_len || tracker.dropped_updates() > 0,
            truncated_deleted: deleted_total > deleted_len || tracker.dropped_deletes() > 0,
            truncated_invalidations,
            truncated_size: false,
            streaming: true,
            serialization_errors: tracker.serialization_errors(),
        };

        StreamingCascadeResponse {
            success,
            data: primary_result.unwrap_or(Value::Null),
            updated: stream::iter(
                changes
                    .updated()
                    .filter_map(UpdatedEntry::from_tracked)
                    .take(updated_len),
            )
            .boxed(),
            deleted: stream::iter(
                changes
                    .deleted()
                    .filter_map(DeletedEntry::from_tracked)
                    .take(deleted_len),
            )
            .boxed(),
            invalidations,
            metadata,
            errors,
        }
    }
}
