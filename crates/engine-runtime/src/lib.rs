pub mod coordinator;
pub mod error;
pub mod execution;

pub use coordinator::{MigrationCoordinator, RunState};
pub use execution::{
    result::{BlockFailure, RunOutcome, RunResult},
    settings::{RunConfig, StateLocation},
};
