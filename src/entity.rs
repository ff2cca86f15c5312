//! Trackable Entity Contract
//!
//! Any domain object can be tracked as long as it exposes an id. A type name, a custom
//! record serializer and a related-entities accessor are optional capabilities.

use crate::error::SerializationError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::types::EntityKey;

/// Shared handle to a tracked entity
pub type SharedEntity = Arc<dyn Trackable>;

/// Custom record serializer for [`EntityNode`]
pub type RecordSerializer =
    Arc<dyn Fn(&Map<String, Value>) -> Result<Value, SerializationError> + Send + Sync>;

/// Field names treated as identity rather than record data on JSON entities
const IDENTITY_FIELDS: [&str; 3] = ["id", "__typename", "typeName"];

/// Capability contract for anything the tracker can record
#[async_trait]
pub trait Trackable: Send + Sync {
    /// Entity id; `None` means the entity cannot be tracked
    fn entity_id(&self) -> Option<String>;

    /// Entity type name, if the entity knows it
    fn type_name(&self) -> Option<String> {
        None
    }

    /// Transmittable record for this entity
    fn to_record(&self) -> Result<Value, SerializationError>;

    /// Related entities to follow during relationship traversal
    async fn related_entities(&self) -> Result<Vec<SharedEntity>, SerializationError> {
        Ok(Vec::new())
    }
}

/// Duck-typed JSON objects: `id` is a string or number, the type comes from
/// `__typename` or `typeName`, and the record is the object minus those fields.
#[async_trait]
impl Trackable for Value {
    fn entity_id(&self) -> Option<String> {
        match self.get("id")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    fn type_name(&self) -> Option<String> {
        self.get("__typename")
            .or_else(|| self.get("typeName"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn to_record(&self) -> Result<Value, SerializationError> {
        match self {
            Value::Object(map) => Ok(Value::Object(strip_identity(map))),
            other => Err(SerializationError::Custom(format!(
                "expected a JSON object, got {}",
                json_kind(other)
            ))),
        }
    }
}

fn strip_identity(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(name, _)| !IDENTITY_FIELDS.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Entity with explicit fields and relationships
///
/// Useful when the caller's domain objects are not JSON already, or when the relationship
/// graph has to be assembled by hand.
#[derive(Clone, Default)]
pub struct EntityNode {
    type_name: Option<String>,
    id: Option<String>,
    fields: Map<String, Value>,
    related: Vec<SharedEntity>,
    serializer: Option<RecordSerializer>,
}

impl EntityNode {
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Entity whose type name is left to the caller-supplied default
    pub fn untyped(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_related(mut self, entity: SharedEntity) -> Self {
        self.related.push(entity);
        self
    }

    pub fn with_serializer<F>(mut self, serializer: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<Value, SerializationError> + Send + Sync + 'static,
    {
        self.serializer = Some(Arc::new(serializer));
        self
    }

    pub fn into_shared(self) -> SharedEntity {
        Arc::new(self)
    }
}

impl fmt::Debug for EntityNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityNode")
            .field("type_name", &self.type_name)
            .field("id", &self.id)
            .field("fields", &self.fields)
            .field("related", &self.related.len())
            .field("custom_serializer", &self.serializer.is_some())
            .finish()
    }
}

#[async_trait]
impl Trackable for EntityNode {
    fn entity_id(&self) -> Option<String> {
        self.id.clone()
    }

    fn type_name(&self) -> Option<String> {
        self.type_name.clone()
    }

    fn to_record(&self) -> Result<Value, SerializationError> {
        match &self.serializer {
            Some(serializer) => serializer(&self.fields),
            None => Ok(Value::Object(self.fields.clone())),
        }
    }

    async fn related_entities(&self) -> Result<Vec<SharedEntity>, SerializationError> {
        Ok(self.related.clone())
    }
}

/// Any `Serialize` value paired with an explicit identity key
#[derive(Debug, Clone)]
pub struct SerdeEntity<T> {
    key: EntityKey,
    value: T,
}

impl<T> SerdeEntity<T> {
    pub fn new(key: EntityKey, value: T) -> Self {
        Self { key, value }
    }
}

#[async_trait]
impl<T> Trackable for SerdeEntity<T>
where
    T: Serialize + Send + Sync,
{
    fn entity_id(&self) -> Option<String> {
        Some(self.key.id.clone())
    }

    fn type_name(&self) -> Option<String> {
        Some(self.key.type_name.clone())
    }

    fn to_record(&self) -> Result<Value, SerializationError> {
        Ok(serde_json::to_value(&self.value)?)
    }
}
