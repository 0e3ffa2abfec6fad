use crate::error::MigrationError;
use engine_core::{
    retry::RetryPolicy,
    state::{StateStore, memory::MemoryStateStore, sled_store::SledStateStore},
};
use model::core::timestamp::Timestamp;
use planner::{BlockSize, Plan};
use std::{num::NonZeroUsize, path::PathBuf, sync::Arc, time::Duration};
use tracing::info;

/// Where progress records live.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StateLocation {
    #[default]
    Memory,
    Sled(PathBuf),
}

impl StateLocation {
    pub fn open(&self) -> Result<Arc<dyn StateStore>, MigrationError> {
        match self {
            StateLocation::Memory => Ok(Arc::new(MemoryStateStore::new())),
            StateLocation::Sled(path) => {
                info!(path = %path.display(), "Opening state store");
                Ok(Arc::new(SledStateStore::open(path)?))
            }
        }
    }
}

/// Fully validated input of a migration run.
///
/// The window bounds are kept raw: the coordinator validates them itself
/// before building the plan.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mint: Timestamp,
    pub maxt: Timestamp,
    pub block_size: BlockSize,
    pub concurrency: NonZeroUsize,
    pub retry: RetryPolicy,
    pub fail_fast: bool,
    /// Bound on one read-then-write attempt. Expiry counts as a transient
    /// failure.
    pub block_timeout: Option<Duration>,
    /// Explicit run id. Defaults to one derived from the plan hash so a rerun
    /// of the same window and sizing resumes its progress.
    pub run_id: Option<String>,
    /// Pick up progress recorded under the same run id.
    pub resume: bool,
    pub state: StateLocation,
}

impl RunConfig {
    pub fn new(mint: Timestamp, maxt: Timestamp, block_size: BlockSize) -> Self {
        Self {
            mint,
            maxt,
            block_size,
            concurrency: NonZeroUsize::MIN,
            retry: RetryPolicy::default(),
            fail_fast: false,
            block_timeout: None,
            run_id: None,
            resume: true,
            state: StateLocation::Memory,
        }
    }

    /// The id progress is recorded under. Derived from the plan so that
    /// rerunning the same window and sizing resumes where it stopped.
    pub fn run_id(&self, plan: &Plan) -> String {
        self.run_id
            .clone()
            .unwrap_or_else(|| format!("run-{}", plan.hash()))
    }
}
