//! Serialization Adapter
//!
//! Turns a heterogeneous [`Trackable`] into an identity key plus a transmittable record.
//! Failures, including panics inside custom serializers, come back as a
//! [`SerializationError`] for that entity alone.

use crate::entity::Trackable;
use crate::error::{panic_message, SerializationError};
use crate::types::EntityKey;
use serde::Serialize;
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};

/// Identity key and record produced for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedEntity {
    pub key: EntityKey,
    pub record: Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SerializationAdapter;

impl SerializationAdapter {
    pub fn new() -> Self {
        SerializationAdapter
    }

    /// Resolve the identity key, falling back to `default_type` when the entity has no type name
    pub fn resolve_key(
        &self,
        entity: &dyn Trackable,
        default_type: Option<&str>,
    ) -> Result<EntityKey, SerializationError> {
        let type_name = entity
            .type_name()
            .or_else(|| default_type.map(str::to_string));

        let id = entity.entity_id().ok_or_else(|| SerializationError::MissingId {
            type_name: type_name.clone().unwrap_or_else(|| "<unknown>".to_string()),
        })?;

        match type_name {
            Some(type_name) => Ok(EntityKey::new(type_name, id)),
            None => Err(SerializationError::MissingTypeName { id }),
        }
    }

    pub fn serialize(
        &self,
        entity: &dyn Trackable,
        default_type: Option<&str>,
    ) -> Result<SerializedEntity, SerializationError> {
        let key = self.resolve_key(entity, default_type)?;
        let record = self.record(entity, &key)?;
        Ok(SerializedEntity { key, record })
    }

    /// Produce the record for an already-resolved key
    pub fn record(
        &self,
        entity: &dyn Trackable,
        key: &EntityKey,
    ) -> Result<Value, SerializationError> {
        match panic::catch_unwind(AssertUnwindSafe(|| entity.to_record())) {
            Ok(Ok(record)) => Ok(record),
            Ok(Err(err)) => Err(SerializationError::Record {
                key: key.clone(),
                message: err.to_string(),
            }),
            Err(payload) => Err(SerializationError::Panicked {
                key: key.clone(),
                message: panic_message(payload),
            }),
        }
    }

    /// Serialized JSON size in bytes; unencodable values count as zero
    pub fn estimate_size<T: Serialize + ?Sized>(value: &T) -> usize {
        serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
    }
}
