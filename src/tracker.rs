//! Entity Tracker
//!
//! Records create, update and delete events for one transaction, deduplicated by identity
//! key, and follows entity relationships breadth-first within the configured depth and
//! breadth limits.
//!
//! Entities are stored by identity key rather than by live reference, and a visited set is
//! checked before anything is enqueued, so cyclic graphs terminate. The expansion queue is
//! FIFO and each related-entities accessor is awaited before the next item is processed,
//! which keeps the walk layered no matter how often an accessor suspends.

use crate::config::{validation_failure, TrackerConfig, ValidationError};
use crate::entity::{SharedEntity, Trackable};
use crate::error::{CascadeError, SerializationError};
use crate::serialization::SerializationAdapter;
use crate::types::{now_millis, EntityKey, Operation, TrackedEntity};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Result of a single track call for the entity passed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// New identity recorded
    Inserted,
    /// Existing identity overwritten with the latest operation and record
    Overwritten,
    /// Type is listed in `exclude_types`
    Excluded,
    /// `max_entities` reached and the identity was new
    Dropped,
    /// Serialization failed; reported to the error handler
    Failed,
}

impl TrackOutcome {
    pub fn is_recorded(self) -> bool {
        matches!(self, TrackOutcome::Inserted | TrackOutcome::Overwritten)
    }
}

/// Snapshot of everything tracked in a transaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeData {
    pub transaction_id: Option<String>,
    /// Created and updated entities, in insertion order
    pub updated: Vec<TrackedEntity>,
    /// Deleted entities, in insertion order
    pub deleted: Vec<TrackedEntity>,
    pub max_depth: usize,
    pub serialization_errors: usize,
    pub dropped_updates: usize,
    pub dropped_deletes: usize,
}

impl CascadeData {
    pub fn affected_count(&self) -> usize {
        self.updated.len() + self.deleted.len()
    }
}

struct Expansion {
    entity: SharedEntity,
    depth: usize,
}

pub struct EntityTracker {
    config: TrackerConfig,
    adapter: SerializationAdapter,
    /// Insertion-ordered arena; `index` maps identity keys to positions
    entities: Vec<TrackedEntity>,
    index: HashMap<EntityKey, usize>,
    visited: HashSet<EntityKey>,
    queue: VecDeque<Expansion>,
    serialization_errors: usize,
    dropped_updates: usize,
    dropped_deletes: usize,
}

impl EntityTracker {
    pub fn new(config: TrackerConfig) -> Result<Self, CascadeError> {
        config
            .validate()
            .map_err(|e| validation_failure(vec![ValidationError::Tracker(e)]))?;

        Ok(Self {
            config,
            adapter: SerializationAdapter::new(),
            entities: Vec::new(),
            index: HashMap::new(),
            visited: HashSet::new(),
            queue: VecDeque::new(),
            serialization_errors: 0,
            dropped_updates: 0,
            dropped_deletes: 0,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub async fn track_create(
        &mut self,
        entity: SharedEntity,
        default_type: Option<&str>,
    ) -> TrackOutcome {
        self.track(entity, Operation::Created, default_type).await
    }

    pub async fn track_update(
        &mut self,
        entity: SharedEntity,
        default_type: Option<&str>,
    ) -> TrackOutcome {
        self.track(entity, Operation::Updated, default_type).await
    }

    /// Record a deletion. A key already tracked as created or updated is overwritten.
    pub fn track_delete(&mut self, type_name: &str, id: &str) -> TrackOutcome {
        if self.config.is_excluded(type_name) {
            debug!(type_name = %type_name, id = %id, "skipping excluded type");
            return TrackOutcome::Excluded;
        }

        let key = EntityKey::new(type_name, id);
        self.visited.insert(key.clone());
        self.store(key, Operation::Deleted, None, Some(now_millis()), 0)
    }

    async fn track(
        &mut self,
        entity: SharedEntity,
        operation: Operation,
        default_type: Option<&str>,
    ) -> TrackOutcome {
        let (outcome, key) = self.record_entity(entity.as_ref(), operation, 0, default_type);
        if let Some(key) = key.filter(|_| outcome.is_recorded()) {
            self.enqueue_related(&entity, &key, 0).await;
        }
        self.drain_expansions().await;
        outcome
    }

    /// Serialize and store one entity at `depth`
    fn record_entity(
        &mut self,
        entity: &dyn Trackable,
        operation: Operation,
        depth: usize,
        default_type: Option<&str>,
    ) -> (TrackOutcome, Option<EntityKey>) {
        let key = match self.adapter.resolve_key(entity, default_type) {
            Ok(key) => key,
            Err(err) => {
                self.report_serialization_error(&err);
                return (TrackOutcome::Failed, None);
            }
        };

        if self.config.is_excluded(&key.type_name) {
            debug!(type_name = %key.type_name, id = %key.id, "skipping excluded type");
            return (TrackOutcome::Excluded, Some(key));
        }

        let record = match self.adapter.record(entity, &key) {
            Ok(record) => record,
            Err(err) => {
                self.report_serialization_error(&err);
                return (TrackOutcome::Failed, Some(key));
            }
        };

        self.visited.insert(key.clone());
        let outcome = self.store(key.clone(), operation, Some(record), None, depth);
        (outcome, Some(key))
    }

    fn store(
        &mut self,
        key: EntityKey,
        operation: Operation,
        record: Option<serde_json::Value>,
        deleted_at: Option<i64>,
        depth: usize,
    ) -> TrackOutcome {
        if let Some(&position) = self.index.get(&key) {
            let entry = &mut self.entities[position];
            entry.operation = operation;
            entry.record = record;
            entry.deleted_at = deleted_at;
            entry.depth = depth;
            return TrackOutcome::Overwritten;
        }

        if self.entities.len() >= self.config.max_entities {
            if operation.is_deletion() {
                self.dropped_deletes += 1;
            } else {
                self.dropped_updates += 1;
            }
            if self.dropped_updates + self.dropped_deletes == 1 {
                warn!(
                    max_entities = self.config.max_entities,
                    "entity limit reached, further new entities are dropped"
                );
            }
            debug!(type_name = %key.type_name, id = %key.id, "dropping entity over limit");
            return TrackOutcome::Dropped;
        }

        let sequence = self.entities.len();
        self.index.insert(key.clone(), sequence);
        self.entities.push(TrackedEntity {
            key,
            operation,
            record,
            deleted_at,
            depth,
            sequence,
        });
        TrackOutcome::Inserted
    }

    /// Enqueue up to `max_related_per_entity` unvisited related entities at `depth + 1`
    async fn enqueue_related(&mut self, entity: &SharedEntity, key: &EntityKey, depth: usize) {
        if !self.config.enable_relationship_tracking
            || depth >= self.config.max_depth
            || self.config.max_related_per_entity == 0
        {
            return;
        }

        let related = match entity.related_entities().await {
            Ok(related) => related,
            Err(err) => {
                self.report_serialization_error(&SerializationError::Relationships {
                    key: key.clone(),
                    message: err.to_string(),
                });
                return;
            }
        };

        let mut enqueued = 0;
        for child in related {
            if enqueued == self.config.max_related_per_entity {
                debug!(
                    type_name = %key.type_name,
                    id = %key.id,
                    limit = self.config.max_related_per_entity,
                    "relationship breadth limit reached"
                );
                break;
            }

            let child_key = match self.adapter.resolve_key(child.as_ref(), None) {
                Ok(child_key) => child_key,
                Err(err) => {
                    self.report_serialization_error(&err);
                    continue;
                }
            };
            if self.config.is_excluded(&child_key.type_name) || !self.visited.insert(child_key) {
                continue;
            }

            self.queue.push_back(Expansion {
                entity: child,
                depth: depth + 1,
            });
            enqueued += 1;
        }
    }

    async fn drain_expansions(&mut self) {
        while let Some(Expansion { entity, depth }) = self.queue.pop_front() {
            let (outcome, key) =
                self.record_entity(entity.as_ref(), Operation::Updated, depth, None);
            if let Some(key) = key.filter(|_| outcome.is_recorded()) {
                self.enqueue_related(&entity, &key, depth).await;
            }
        }
    }

    fn report_serialization_error(&mut self, err: &SerializationError) {
        self.serialization_errors += 1;
        debug!(error = %err, count = self.serialization_errors, "serialization error absorbed");
        (self.config.on_serialization_error)(err);
    }

    /// Tracked entities in insertion order
    pub fn entities(&self) -> &[TrackedEntity] {
        &self.entities
    }

    pub fn get(&self, key: &EntityKey) -> Option<&TrackedEntity> {
        self.index.get(key).map(|&position| &self.entities[position])
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn updated_count(&self) -> usize {
        self.entities.iter().filter(|e| !e.is_deleted()).count()
    }

    pub fn deleted_count(&self) -> usize {
        self.entities.iter().filter(|e| e.is_deleted()).count()
    }

    pub fn serialization_errors(&self) -> usize {
        self.serialization_errors
    }

    pub fn dropped_updates(&self) -> usize {
        self.dropped_updates
    }

    pub fn dropped_deletes(&self) -> usize {
        self.dropped_deletes
    }

    /// Deepest traversal depth among tracked entities
    pub fn max_depth_reached(&self) -> usize {
        self.entities.iter().map(|e| e.depth).max().unwrap_or(0)
    }

    pub fn snapshot(&self, transaction_id: Option<String>) -> CascadeData {
        let (deleted, updated): (Vec<_>, Vec<_>) =
            self.entities.iter().cloned().partition(TrackedEntity::is_deleted);
        CascadeData {
            transaction_id,
            updated,
            deleted,
            max_depth: self.max_depth_reached(),
            serialization_errors: self.serialization_errors,
            dropped_updates: self.dropped_updates,
            dropped_deletes: self.dropped_deletes,
        }
    }

    /// Discard all tracked state and counters
    pub fn reset(&mut self) {
        self.entities.clear();
        self.index.clear();
        self.visited.clear();
        self.queue.clear();
        self.serialization_errors = 0;
        self.dropped_updates = 0;
        self.dropped_deletes = 0;
    }
}

impl std::fmt::Debug for EntityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityTracker")
            .field("config", &self.config)
            .field("tracked", &self.entities.len())
            .field("serialization_errors", &self.serialization_errors)
            .finish_non_exhaustive()
    }
}
