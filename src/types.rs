//! Core data model: identity keys, tracked entities and invalidation hints.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identity of one entity within a transaction: (type name, id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityKey {
    pub type_name: String,
    pub id: String,
}

impl EntityKey {
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.id)
    }
}

/// Kind of change recorded for an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Created,
    Updated,
    Deleted,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Created => "CREATED",
            Operation::Updated => "UPDATED",
            Operation::Deleted => "DELETED",
        }
    }

    pub fn is_deletion(self) -> bool {
        matches!(self, Operation::Deleted)
    }
}

/// One recorded change for an identity key
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntity {
    pub key: EntityKey,
    pub operation: Operation,
    /// Serialized record; `None` for deletions
    pub record: Option<Value>,
    /// Unix milliseconds, set for deletions only
    pub deleted_at: Option<i64>,
    /// Traversal depth at which the entity was (last) recorded
    pub depth: usize,
    /// Position in insertion order; stable across overwrites
    pub sequence: usize,
}

impl TrackedEntity {
    pub fn is_deleted(&self) -> bool {
        self.operation.is_deletion()
    }
}

/// Instruction that cached data for a type, entity or field is stale
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationHint {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub reason: String,
}

impl InvalidationHint {
    /// Hint covering every cached entry of a type
    pub fn for_type(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: None,
            field: None,
            reason: reason.into(),
        }
    }

    /// Hint covering one entity
    pub fn for_entity(key: &EntityKey, reason: impl Into<String>) -> Self {
        Self {
            type_name: key.type_name.clone(),
            id: Some(key.id.clone()),
            field: None,
            reason: reason.into(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Current wall-clock time in unix milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
