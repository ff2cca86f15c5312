//! Integration tests for Configuration System

use super::test_utils::{todo, Graph, GraphNode};
use cascade_tracker::{CascadeEngine, ConfigLoader, TrackOutcome};
use tempfile::TempDir;

#[tokio::test]
async fn test_file_config_drives_engine() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("cascade.toml");

    std::fs::write(
        &config_file,
        r#"
[tracker]
max_depth = 1
exclude_types = ["AuditLog"]

[response]
max_updated_entities = 1
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    assert!(config.validate().is_ok());
    let mut engine = CascadeEngine::new(config, None).unwrap();

    let graph = Graph::new().edge("a", "b").edge("b", "c").into_shared();
    engine.start_transaction().unwrap();
    engine.track_update(GraphNode::shared(&graph, "a")).await.unwrap();
    assert_eq!(engine.transactions().tracker().len(), 2);

    assert_eq!(
        engine.track_delete("AuditLog", "1").unwrap(),
        TrackOutcome::Excluded
    );
    engine.track_create(todo("1", "t")).await.unwrap();

    let response = engine.finish(None, vec![]).unwrap();
    assert_eq!(response.cascade.updated.len(), 1);
    assert!(response.metadata().truncated_updated);
    assert!(response.cascade.deleted.is_empty());
}

#[test]
fn test_invalid_file_rejected_before_engine_exists() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("cascade.toml");
    std::fs::write(&config_file, "[tracker]\nexclude_types = [\"\"]\n").unwrap();

    let err = ConfigLoader::load_from_file(&config_file).unwrap_err();
    assert_eq!(err.code(), "CONFIGURATION_ERROR");
    assert!(err.to_string().contains("exclude_types[0]"));
}

#[test]
fn test_malformed_limit_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("cascade.toml");
    std::fs::write(&config_file, "[response]\nmax_invalidations = \"many\"\n").unwrap();

    assert!(ConfigLoader::load_from_file(&config_file).is_err());
}
