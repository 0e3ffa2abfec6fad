use crate::execution::result::{BlockFailure, RunResult};
use engine_core::error::{ProgressError, StateStoreError};
use planner::PlanError;
use thiserror::Error;

/// Top‐level errors for a migration run.
///
/// Per-block read and write failures never surface here: they are recorded
/// as progress and reported through [`RunResult`]. Only configuration errors,
/// infrastructure failures and a fail-fast abort end the run with an error.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The window or block sizing is invalid.
    #[error("Invalid plan: {0}")]
    Plan(#[from] PlanError),

    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    /// Progress could not be recorded, so the run cannot guarantee
    /// exactly-once bookkeeping.
    #[error("Progress tracking failed: {0}")]
    Progress(#[from] ProgressError),

    #[error("State store error: {0}")]
    StateStore(#[from] StateStoreError),

    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    /// An error occurred while joining a worker task.
    /// This usually indicates that the task panicked.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// Fail-fast mode stopped the run at the first permanent block failure.
    #[error("Migration aborted: block {} failed permanently: {}", .failure.block, .failure.error)]
    Aborted {
        failure: Box<BlockFailure>,
        result: Box<RunResult>,
    },
}
