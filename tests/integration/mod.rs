//! Integration tests for cascade tracking and response construction

mod config_integration;
mod example_scenarios;
mod invalidation_isolation;
mod relationship_traversal;
