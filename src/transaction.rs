//! Transaction lifecycle around an [`EntityTracker`].
//!
//! One manager holds exactly one transaction slot. Use one manager per in-flight
//! mutation; tracking calls made while no transaction is active fail with
//! [`CascadeError::TransactionState`].

use crate::config::TrackerConfig;
use crate::entity::SharedEntity;
use crate::error::CascadeError;
use crate::tracker::{CascadeData, EntityTracker, TrackOutcome};
use crate::types::now_millis;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

static TRANSACTION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Details of the active transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTransaction {
    pub id: String,
    pub started_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    Idle,
    Active(ActiveTransaction),
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Idle => "idle",
            TransactionState::Active(_) => "active",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active(_))
    }
}

/// Unique within the process: timestamp, pid and a sequence number
pub fn new_transaction_id() -> String {
    let ts = now_millis();
    let pid = std::process::id();
    let seq = TRANSACTION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("txn-{ts}-{pid}-{seq}")
}

#[derive(Debug)]
pub struct TransactionManager {
    state: TransactionState,
    tracker: EntityTracker,
}

impl TransactionManager {
    pub fn new(config: TrackerConfig) -> Result<Self, CascadeError> {
        Ok(Self {
            state: TransactionState::Idle,
            tracker: EntityTracker::new(config)?,
        })
    }

    pub fn start_transaction(&mut self) -> Result<String, CascadeError> {
        if let TransactionState::Active(active) = &self.state {
            debug!(transaction_id = %active.id, "start requested while a transaction is active");
            return Err(self.state_error("idle"));
        }

        let id = new_transaction_id();
        self.tracker.reset();
        self.state = TransactionState::Active(ActiveTransaction {
            id: id.clone(),
            started_at: Instant::now(),
        });
        debug!(transaction_id = %id, "transaction started");
        Ok(id)
    }

    /// Snapshot tracked state, then discard it and return to idle
    pub fn end_transaction(&mut self) -> Result<CascadeData, CascadeError> {
        let data = self.get_cascade_data()?;
        self.tracker.reset();
        self.state = TransactionState::Idle;
        debug!(
            transaction_id = data.transaction_id.as_deref().unwrap_or_default(),
            updated = data.updated.len(),
            deleted = data.deleted.len(),
            "transaction ended"
        );
        Ok(data)
    }

    pub fn get_cascade_data(&self) -> Result<CascadeData, CascadeError> {
        let active = self.active()?;
        Ok(self.tracker.snapshot(Some(active.id.clone())))
    }

    /// Unconditionally discard tracked state and return to idle
    pub fn reset_transaction_state(&mut self) {
        if let TransactionState::Active(active) = &self.state {
            debug!(transaction_id = %active.id, "transaction state reset");
        }
        self.tracker.reset();
        self.state = TransactionState::Idle;
    }

    /// Start a transaction scoped to the returned guard
    pub fn begin(&mut self) -> Result<TransactionGuard<'_>, CascadeError> {
        self.start_transaction()?;
        Ok(TransactionGuard {
            manager: self,
            released: false,
        })
    }

    pub async fn track_create(
        &mut self,
        entity: SharedEntity,
    ) -> Result<TrackOutcome, CascadeError> {
        self.active()?;
        Ok(self.tracker.track_create(entity, None).await)
    }

    /// Track a creation, using `default_type` when the entity has no type name
    pub async fn track_create_as(
        &mut self,
        entity: SharedEntity,
        default_type: &str,
    ) -> Result<TrackOutcome, CascadeError> {
        self.active()?;
        Ok(self.tracker.track_create(entity, Some(default_type)).await)
    }

    pub async fn track_update(
        &mut self,
        entity: SharedEntity,
    ) -> Result<TrackOutcome, CascadeError> {
        self.active()?;
        Ok(self.tracker.track_update(entity, None).await)
    }

    pub async fn track_update_as(
        &mut self,
        entity: SharedEntity,
        default_type: &str,
    ) -> Result<TrackOutcome, CascadeError> {
        self.active()?;
        Ok(self.tracker.track_update(entity, Some(default_type)).await)
    }

    pub fn track_delete(
        &mut self,
        type_name: &str,
        id: &str,
    ) -> Result<TrackOutcome, CascadeError> {
        self.active()?;
        Ok(self.tracker.track_delete(type_name, id))
    }

    pub fn state(&self) -> &TransactionState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match &self.state {
            TransactionState::Active(active) => Some(active.id.as_str()),
            TransactionState::Idle => None,
        }
    }

    /// Time since the active transaction started
    pub fn tracking_elapsed(&self) -> Option<Duration> {
        match &self.state {
            TransactionState::Active(active) => Some(active.started_at.elapsed()),
            TransactionState::Idle => None,
        }
    }

    pub fn tracker(&self) -> &EntityTracker {
        &self.tracker
    }

    fn active(&self) -> Result<&ActiveTransaction, CascadeError> {
        match &self.state {
            TransactionState::Active(active) => Ok(active),
            TransactionState::Idle => Err(self.state_error("active")),
        }
    }

    fn state_error(&self, expected: &'static str) -> CascadeError {
        CascadeError::TransactionState {
            expected,
            actual: self.state.as_str(),
        }
    }
}

/// Scoped transaction: dropping the guard without [`commit`](Self::commit) resets the
/// manager, so a failed or cancelled mutation never leaves the slot active.
pub struct TransactionGuard<'a> {
    manager: &'a mut TransactionManager,
    released: bool,
}

impl TransactionGuard<'_> {
    /// End the transaction and return its final cascade data
    pub fn commit(mut self) -> Result<CascadeData, CascadeError> {
        self.released = true;
        self.manager.end_transaction()
    }

    /// Discard the transaction explicitly
    pub fn rollback(mut self) {
        self.released = true;
        self.manager.reset_transaction_state();
    }
}

impl Deref for TransactionGuard<'_> {
    type Target = TransactionManager;

    fn deref(&self) -> &Self::Target {
        self.manager
    }
}

impl DerefMut for TransactionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.manager
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.manager.reset_transaction_state();
        }
    }
}
