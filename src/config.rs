//! Configuration System
//!
//! Limits for the entity tracker and the response builders, plus logging settings.
//! Configuration is layered with the `config` crate: built-in defaults, an optional
//! TOML file, then `CASCADE__`-prefixed environment variables. Invalid values fail
//! before any engine is constructed.

use crate::error::{CascadeError, ErrorHandler, InvalidationError, SerializationError};
use crate::invalidation::default_invalidation_error_handler;
use crate::logging::LoggingConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Entity tracker limits and behaviour
#[derive(Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Maximum relationship traversal depth (0 disables expansion)
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Type names that are never recorded or expanded
    #[serde(default)]
    pub exclude_types: Vec<String>,

    #[serde(default = "default_true")]
    pub enable_relationship_tracking: bool,

    /// Maximum number of distinct identities per transaction
    #[serde(default = "default_max_entities")]
    pub max_entities: usize,

    /// Maximum related entities enqueued per expanded entity
    #[serde(default = "default_max_related_per_entity")]
    pub max_related_per_entity: usize,

    #[serde(skip, default = "default_serialization_error_handler")]
    pub on_serialization_error: ErrorHandler<SerializationError>,
}

/// Response size and count limits
#[derive(Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    #[serde(default = "default_max_response_size_bytes")]
    pub max_response_size_bytes: usize,

    #[serde(default = "default_max_updated_entities")]
    pub max_updated_entities: usize,

    #[serde(default = "default_max_deleted_entities")]
    pub max_deleted_entities: usize,

    #[serde(default = "default_max_invalidations")]
    pub max_invalidations: usize,

    #[serde(skip, default = "default_invalidation_error_handler")]
    pub on_invalidation_error: ErrorHandler<InvalidationError>,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CascadeConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub response: ResponseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_max_depth() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_max_entities() -> usize {
    1000
}

fn default_max_related_per_entity() -> usize {
    100
}

fn default_max_response_size_bytes() -> usize {
    5 * 1024 * 1024 // 5 MiB
}

fn default_max_updated_entities() -> usize {
    500
}

fn default_max_deleted_entities() -> usize {
    100
}

fn default_max_invalidations() -> usize {
    50
}

pub fn default_serialization_error_handler() -> ErrorHandler<SerializationError> {
    Arc::new(|err: &SerializationError| {
        warn!(error = %err, "skipping entity that failed to serialize");
    })
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            exclude_types: Vec::new(),
            enable_relationship_tracking: default_true(),
            max_entities: default_max_entities(),
            max_related_per_entity: default_max_related_per_entity(),
            on_serialization_error: default_serialization_error_handler(),
        }
    }
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            max_response_size_bytes: default_max_response_size_bytes(),
            max_updated_entities: default_max_updated_entities(),
            max_deleted_entities: default_max_deleted_entities(),
            max_invalidations: default_max_invalidations(),
            on_invalidation_error: default_invalidation_error_handler(),
        }
    }
}

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("max_depth", &self.max_depth)
            .field("exclude_types", &self.exclude_types)
            .field(
                "enable_relationship_tracking",
                &self.enable_relationship_tracking,
            )
            .field("max_entities", &self.max_entities)
            .field("max_related_per_entity", &self.max_related_per_entity)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for ResponseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseConfig")
            .field("max_response_size_bytes", &self.max_response_size_bytes)
            .field("max_updated_entities", &self.max_updated_entities)
            .field("max_deleted_entities", &self.max_deleted_entities)
            .field("max_invalidations", &self.max_invalidations)
            .finish_non_exhaustive()
    }
}

impl TrackerConfig {
    pub fn with_serialization_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&SerializationError) + Send + Sync + 'static,
    {
        self.on_serialization_error = Arc::new(handler);
        self
    }

    pub fn is_excluded(&self, type_name: &str) -> bool {
        self.exclude_types.iter().any(|excluded| excluded == type_name)
    }

    /// Validate tracker configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Some(position) = self.exclude_types.iter().position(|t| t.trim().is_empty()) {
            return Err(format!("exclude_types[{}] must not be empty", position));
        }
        Ok(())
    }
}

impl ResponseConfig {
    pub fn with_invalidation_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&InvalidationError) + Send + Sync + 'static,
    {
        self.on_invalidation_error = Arc::new(handler);
        self
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Tracker(String),
    Logging(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Tracker(msg) => write!(f, "Tracker: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl CascadeConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.tracker.validate() {
            errors.push(ValidationError::Tracker(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

pub(crate) fn validation_failure(errors: Vec<ValidationError>) -> CascadeError {
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    CascadeError::Config(format!(
        "Configuration validation failed:\n{}",
        messages.join("\n")
    ))
}

/// Layered configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Environment prefix; nesting uses `__`, e.g. `CASCADE__TRACKER__MAX_DEPTH=2`
    pub const ENV_PREFIX: &'static str = "CASCADE";

    /// Load defaults overridden by environment variables
    pub fn load() -> Result<CascadeConfig, CascadeError> {
        Self::build(None)
    }

    /// Load defaults, then `path`, then environment variables
    pub fn load_from_file(path: &Path) -> Result<CascadeConfig, CascadeError> {
        if !path.exists() {
            return Err(CascadeError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Self::build(Some(path))
    }

    fn build(path: Option<&Path>) -> Result<CascadeConfig, CascadeError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(Self::ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("tracker.exclude_types"),
        );

        let config: CascadeConfig = builder.build()?.try_deserialize()?;
        config.validate().map_err(validation_failure)?;
        Ok(config)
    }
}
