//! Cascade Tracker: Mutation Side-Effect Tracking
//!
//! Records every entity created, updated or deleted while a single mutation runs, follows
//! entity relationships to a bounded depth, computes cache-invalidation hints and builds a
//! size- and count-bounded payload that client caches apply without re-querying.

pub mod cache;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod invalidation;
pub mod logging;
pub mod response;
pub mod serialization;
pub mod tracker;
pub mod transaction;
pub mod types;

pub use cache::{apply_cascade, CacheAdapter, InMemoryCache};
pub use config::{CascadeConfig, ConfigLoader, ResponseConfig, TrackerConfig};
pub use engine::CascadeEngine;
pub use entity::{EntityNode, SharedEntity, Trackable};
pub use error::{CascadeError, InvalidationError, SerializationError};
pub use invalidation::{ChangeSet, InvalidationStrategy, StrategyResult, TypeListInvalidation};
pub use response::{CascadeResponse, ResponseBuilder, ResponseError, StreamingResponseBuilder};
pub use tracker::{CascadeData, EntityTracker, TrackOutcome};
pub use transaction::{TransactionGuard, TransactionManager, TransactionState};
pub use types::{EntityKey, InvalidationHint, Operation, TrackedEntity};
