//! Cache Adapter Contract
//!
//! How a client-side cache consumes a [`CascadeResponse`]. Each client library brings its own
//! [`CacheAdapter`]; [`apply_cascade`] drives any of them with the same rules, and
//! [`InMemoryCache`] is a plain map-backed adapter.

use crate::response::CascadeResponse;
use crate::types::{EntityKey, InvalidationHint, Operation};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Operations a client cache must support to consume a cascade
pub trait CacheAdapter {
    /// Store a newly created entity, replacing anything cached under the key
    fn write(&mut self, key: &EntityKey, entity: &Value);

    /// Merge an updated entity into the cached one
    fn merge(&mut self, key: &EntityKey, entity: &Value);

    fn delete(&mut self, key: &EntityKey);

    /// Mark a field, an entity or a whole type stale
    fn invalidate(&mut self, hint: &InvalidationHint);
}

/// Counts of adapter calls made by [`apply_cascade`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub written: usize,
    pub merged: usize,
    pub deleted: usize,
    pub invalidated: usize,
}

/// Apply a cascade to `adapter`: created entries are written, updated entries merged,
/// deletions evicted, then invalidations applied in order.
pub fn apply_cascade<A: CacheAdapter + ?Sized>(
    adapter: &mut A,
    response: &CascadeResponse,
) -> ApplySummary {
    let mut summary = ApplySummary::default();

    for entry in &response.cascade.updated {
        let key = EntityKey::new(entry.type_name.as_str(), entry.id.as_str());
        match entry.operation {
            Operation::Created => {
                adapter.write(&key, &entry.entity);
                summary.written += 1;
            }
            Operation::Updated => {
                adapter.merge(&key, &entry.entity);
                summary.merged += 1;
            }
            // Deletions never appear in the updated list
            Operation::Deleted => adapter.delete(&key),
        }
    }

    for entry in &response.cascade.deleted {
        adapter.delete(&EntityKey::new(entry.type_name.as_str(), entry.id.as_str()));
        summary.deleted += 1;
    }

    for hint in &response.cascade.invalidations {
        adapter.invalidate(hint);
        summary.invalidated += 1;
    }

    debug!(
        written = summary.written,
        merged = summary.merged,
        deleted = summary.deleted,
        invalidated = summary.invalidated,
        "cascade applied to cache"
    );
    summary
}

/// Map-backed cache with shallow merge semantics
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: HashMap<EntityKey, Value>,
    stale_fields: HashSet<(String, Option<String>, String)>,
    stale_types: HashSet<String>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether every cached entity of `type_name` is stale
    pub fn is_type_stale(&self, type_name: &str) -> bool {
        self.stale_types.contains(type_name)
    }

    /// Whether `field` is stale for the given entity, either directly, for all entities of the
    /// type, or because the whole type is stale
    pub fn is_field_stale(&self, type_name: &str, id: Option<&str>, field: &str) -> bool {
        if self.is_type_stale(type_name) {
            return true;
        }
        let type_wide = (type_name.to_string(), None, field.to_string());
        if self.stale_fields.contains(&type_wide) {
            return true;
        }
        id.is_some_and(|id| {
            self.stale_fields
                .contains(&(type_name.to_string(), Some(id.to_string()), field.to_string()))
        })
    }
}

impl CacheAdapter for InMemoryCache {
    fn write(&mut self, key: &EntityKey, entity: &Value) {
        self.entries.insert(key.clone(), entity.clone());
    }

    fn merge(&mut self, key: &EntityKey, entity: &Value) {
        match (self.entries.get_mut(key), entity) {
            (Some(Value::Object(cached)), Value::Object(fields)) => {
                shallow_merge(cached, fields);
            }
            _ => {
                self.entries.insert(key.clone(), entity.clone());
            }
        }
    }

    fn delete(&mut self, key: &EntityKey) {
        self.entries.remove(key);
    }

    fn invalidate(&mut self, hint: &InvalidationHint) {
        match &hint.field {
            Some(field) => {
                self.stale_fields
                    .insert((hint.type_name.clone(), hint.id.clone(), field.clone()));
            }
            None => {
                self.stale_types.insert(hint.type_name.clone());
            }
        }
    }
}

fn shallow_merge(cached: &mut Map<String, Value>, fields: &Map<String, Value>) {
    for (name, value) in fields {
        cached.insert(name.clone(), value.clone());
    }
}
