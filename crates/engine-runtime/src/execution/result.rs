use chrono::{DateTime, Utc};
use engine_core::metrics::MetricsSnapshot;
use planner::Block;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every block of the window is migrated.
    Completed,
    /// The run went through every block but some failed.
    CompletedWithFailures,
    /// Stopped on request. Unfinished blocks are left `Pending`.
    Cancelled,
    /// Fail-fast stopped the run at the first permanent failure.
    Aborted,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::CompletedWithFailures => "completed_with_failures",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A block given up on, with the bounds needed to re-run just that range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockFailure {
    pub block: Block,
    pub error: String,
    /// `false` when a transient error outlived the retry ceiling.
    pub permanent: bool,
    /// Attempts made during this run.
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: String,
    pub outcome: RunOutcome,
    pub total_blocks: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Already complete when the run started.
    pub skipped: u64,
    /// Left `Pending` by cancellation or abort.
    pub not_started: u64,
    pub attempts: u64,
    pub retries: u64,
    pub failures: Vec<BlockFailure>,
    pub first_permanent_error: Option<BlockFailure>,
    pub metrics: MetricsSnapshot,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}
