//! Error types for cascade tracking.
//!
//! Only [`CascadeError`] escapes to callers. Serialization and invalidation failures are
//! absorbed where they happen and reported through the configured handlers.

use crate::types::EntityKey;
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

/// Callback invoked when a recoverable error is absorbed.
pub type ErrorHandler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Lifecycle and setup errors
#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("Transaction state error: expected {expected} transaction, found {actual}")]
    TransactionState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Wire encoding error: {0}")]
    Wire(#[from] serde_json::Error),
}

impl CascadeError {
    /// Machine-readable code used in wire error entries
    pub fn code(&self) -> &'static str {
        match self {
            CascadeError::TransactionState { .. } => "TRANSACTION_STATE_ERROR",
            CascadeError::Config(_) => "CONFIGURATION_ERROR",
            CascadeError::Wire(_) => "WIRE_ENCODING_ERROR",
        }
    }
}

impl From<config::ConfigError> for CascadeError {
    fn from(err: config::ConfigError) -> Self {
        CascadeError::Config(err.to_string())
    }
}

/// Per-entity serialization errors
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Entity of type {type_name} does not expose an id")]
    MissingId { type_name: String },

    #[error("Entity {id} has no type name and no default was supplied")]
    MissingTypeName { id: String },

    #[error("Failed to serialize {key}: {message}")]
    Record { key: EntityKey, message: String },

    #[error("Serializer for {key} panicked: {message}")]
    Panicked { key: EntityKey, message: String },

    #[error("Failed to load relationships of {key}: {message}")]
    Relationships { key: EntityKey, message: String },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

/// Invalidation computation errors
#[derive(Debug, Error)]
pub enum InvalidationError {
    #[error("Invalidation computation failed: {0}")]
    Failed(String),

    #[error("Invalidation strategy panicked: {0}")]
    Panicked(String),
}

/// Extract a readable message from a caught panic payload
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
