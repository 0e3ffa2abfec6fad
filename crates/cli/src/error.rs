use engine_config::SettingsError;
use engine_core::error::{ProgressError, StateStoreError};
use engine_runtime::error::MigrationError;
use planner::PlanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to load the configuration: {0}")]
    Settings(#[from] SettingsError),

    #[error("Invalid migration plan: {0}")]
    Plan(#[from] PlanError),

    #[error("Failed to run the migration: {0}")]
    Runner(#[from] MigrationError),

    #[error("Failed to load progress: {0}")]
    Progress(#[from] ProgressError),

    #[error("Failed to read the state store: {0}")]
    StateStore(#[from] StateStoreError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),
}
