//! Invalidation Engine
//!
//! Wraps a pluggable [`InvalidationStrategy`]. The engine calls the strategy once per
//! response construction and never lets its failure reach the caller: errors and panics
//! are reported to the configured handler and the result degrades to no hints.

use crate::error::{panic_message, ErrorHandler, InvalidationError};
use crate::types::{InvalidationHint, Operation, TrackedEntity};
use serde_json::Value;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Borrowed view of the tracked changes, in insertion order
#[derive(Debug, Clone, Copy)]
pub struct ChangeSet<'a> {
    entities: &'a [TrackedEntity],
}

impl<'a> ChangeSet<'a> {
    pub fn new(entities: &'a [TrackedEntity]) -> Self {
        Self { entities }
    }

    /// Created and updated entities
    pub fn updated(&self) -> impl Iterator<Item = &'a TrackedEntity> + 'a {
        self.entities.iter().filter(|entity| !entity.is_deleted())
    }

    pub fn deleted(&self) -> impl Iterator<Item = &'a TrackedEntity> + 'a {
        self.entities.iter().filter(|entity| entity.is_deleted())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// `Ok(None)` is treated the same as an empty list
pub type StrategyResult = Result<Option<Vec<InvalidationHint>>, InvalidationError>;

/// Computes invalidation hints from the tracked changes and the primary result
pub trait InvalidationStrategy: Send + Sync {
    fn compute_invalidations(
        &self,
        changes: &ChangeSet<'_>,
        primary_result: Option<&Value>,
    ) -> StrategyResult;
}

/// Adapter turning a closure into a strategy; see [`from_fn`]
pub struct FnStrategy<F>(F);

impl<F> InvalidationStrategy for FnStrategy<F>
where
    F: Fn(&ChangeSet<'_>, Option<&Value>) -> StrategyResult + Send + Sync,
{
    fn compute_invalidations(
        &self,
        changes: &ChangeSet<'_>,
        primary_result: Option<&Value>,
    ) -> StrategyResult {
        (self.0)(changes, primary_result)
    }
}

/// Marks list queries stale for every type that gained or lost entities
///
/// Updates alone do not invalidate anything: caches merge the updated records directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeListInvalidation;

impl InvalidationStrategy for TypeListInvalidation {
    fn compute_invalidations(
        &self,
        changes: &ChangeSet<'_>,
        _primary_result: Option<&Value>,
    ) -> StrategyResult {
        let mut seen = HashSet::new();
        let mut hints = Vec::new();
        for entity in changes.updated().chain(changes.deleted()) {
            let reason = match entity.operation {
                Operation::Created => "entity created",
                Operation::Deleted => "entity deleted",
                Operation::Updated => continue,
            };
            if seen.insert((entity.key.type_name.as_str(), reason)) {
                hints.push(InvalidationHint::for_type(entity.key.type_name.clone(), reason));
            }
        }
        Ok(Some(hints))
    }
}

/// Wrap a closure as a shared strategy
pub fn from_fn<F>(f: F) -> Arc<dyn InvalidationStrategy>
where
    F: Fn(&ChangeSet<'_>, Option<&Value>) -> StrategyResult + Send + Sync + 'static,
{
    Arc::new(FnStrategy(f))
}

pub fn default_invalidation_error_handler() -> ErrorHandler<InvalidationError> {
    Arc::new(|err: &InvalidationError| {
        warn!(error = %err, "invalidation computation failed, continuing without hints");
    })
}

/// Failure-isolating wrapper around an optional strategy
#[derive(Clone)]
pub struct InvalidationEngine {
    strategy: Option<Arc<dyn InvalidationStrategy>>,
    on_error: ErrorHandler<InvalidationError>,
}

impl InvalidationEngine {
    pub fn new(
        strategy: Option<Arc<dyn InvalidationStrategy>>,
        on_error: ErrorHandler<InvalidationError>,
    ) -> Self {
        Self { strategy, on_error }
    }

    /// Engine that never produces hints
    pub fn disabled() -> Self {
        Self::new(None, default_invalidation_error_handler())
    }

    pub fn has_strategy(&self) -> bool {
        self.strategy.is_some()
    }

    pub fn compute(
        &self,
        changes: &ChangeSet<'_>,
        primary_result: Option<&Value>,
    ) -> Vec<InvalidationHint> {
        let Some(strategy) = &self.strategy else {
            return Vec::new();
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            strategy.compute_invalidations(changes, primary_result)
        }));

        match outcome {
            Ok(Ok(hints)) => hints.unwrap_or_default(),
            Ok(Err(err)) => {
                (self.on_error)(&err);
                Vec::new()
            }
            Err(payload) => {
                (self.on_error)(&InvalidationError::Panicked(panic_message(payload)));
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for InvalidationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationEngine")
            .field("has_strategy", &self.strategy.is_some())
            .finish()
    }
}
