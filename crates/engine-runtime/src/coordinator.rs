use crate::{
    error::MigrationError,
    execution::{
        dispatcher::Dispatcher,
        result::{RunOutcome, RunResult},
        settings::RunConfig,
    },
};
use chrono::{DateTime, Utc};
use engine_core::{
    connectors::{destination::SampleWriter, source::SampleReader},
    event_bus::EventBus,
    metrics::Metrics,
    progress::{ProgressTracker, StatusCounts},
    state::{StateStore, models::WalEntry},
};
use model::events::MigrationEvent;
use planner::{Plan, Window};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Live view of a run, readable while it is in progress.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub run_id: String,
    pub total_blocks: u64,
    pub counts: StatusCounts,
    pub started_at: DateTime<Utc>,
    pub cancelled: bool,
}

struct ActiveRun {
    progress: Arc<ProgressTracker>,
    total_blocks: u64,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Entry point of a migration: validates the window, plans the blocks,
/// restores progress and drives the worker pool to completion.
pub struct MigrationCoordinator {
    config: RunConfig,
    reader: Arc<dyn SampleReader>,
    writer: Arc<dyn SampleWriter>,
    store: Arc<dyn StateStore>,
    events: EventBus,
    cancel: CancellationToken,
    active: RwLock<Option<ActiveRun>>,
}

impl MigrationCoordinator {
    /// Opens the state store named by `config.state`.
    pub fn new(
        config: RunConfig,
        reader: Arc<dyn SampleReader>,
        writer: Arc<dyn SampleWriter>,
    ) -> Result<Self, MigrationError> {
        let store = config.state.open()?;
        Ok(Self::with_store(config, reader, writer, store))
    }

    pub fn with_store(
        config: RunConfig,
        reader: Arc<dyn SampleReader>,
        writer: Arc<dyn SampleWriter>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            config,
            reader,
            writer,
            store,
            events: EventBus::new(),
            cancel: CancellationToken::new(),
            active: RwLock::new(None),
        }
    }

    /// Ties every run to an externally owned token, e.g. one fired by a
    /// signal handler. Once that token fires, later runs start cancelled.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Stops dispatching new blocks of the active run. In-flight blocks
    /// finish their current step and are left `Pending` for the next run.
    /// The coordinator can be started again afterwards.
    pub async fn cancel(&self) {
        match self.active.read().await.as_ref() {
            Some(active) => {
                info!(run_id = %active.progress.run_id(), "Cancellation requested");
                active.cancel.cancel();
            }
            None => debug!("Cancellation requested with no active run"),
        }
    }

    /// The parent of every run's token. Cancelling it stops the active run
    /// and every later one.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The block partition of the configured window.
    pub fn plan(&self) -> Result<Plan, MigrationError> {
        let window = Window::new(self.config.mint, self.config.maxt)?;
        Ok(Plan::new(window, self.config.block_size)?)
    }

    /// Runs the migration to completion, cancellation or abort.
    ///
    /// Block failures do not make this return an error: they are reported in
    /// the [`RunResult`]. With fail-fast enabled, a permanent block failure
    /// ends the run with [`MigrationError::Aborted`].
    pub async fn start(&self) -> Result<RunResult, MigrationError> {
        let plan = self.plan()?;
        let started_at = Utc::now();

        let mut run_id = self.config.run_id(&plan);
        let progress = if self.config.resume {
            ProgressTracker::resume(run_id.clone(), self.store.clone()).await?
        } else {
            run_id = format!("{}-{}", run_id, started_at.timestamp_millis());
            ProgressTracker::new(run_id.clone(), self.store.clone())
        };
        let progress = Arc::new(progress);
        let run_cancel = self.cancel.child_token();

        *self.active.write().await = Some(ActiveRun {
            progress: progress.clone(),
            total_blocks: plan.len(),
            started_at,
            cancel: run_cancel.clone(),
        });

        info!(
            run_id = %run_id,
            window = %plan.window(),
            block_ms = plan.block_duration_ms(),
            blocks = plan.len(),
            resume = self.config.resume,
            "Starting migration"
        );

        self.store
            .append_wal(&WalEntry::RunStart {
                run_id: run_id.clone(),
                plan_hash: plan.hash(),
                mint: plan.window().mint(),
                maxt: plan.window().maxt(),
                total_blocks: plan.len(),
                at: started_at,
            })
            .await?;
        self.events
            .publish(MigrationEvent::RunStarted {
                run_id: run_id.clone(),
                mint: plan.window().mint(),
                maxt: plan.window().maxt(),
                total_blocks: plan.len(),
                timestamp: started_at,
            })
            .await;

        let dispatcher = Dispatcher::new(
            self.reader.clone(),
            self.writer.clone(),
            self.events.clone(),
            Metrics::new(),
        );
        let result = dispatcher
            .run(&plan, progress, &self.config, &run_cancel)
            .await?;

        self.finish(&result).await?;

        if result.outcome == RunOutcome::Aborted
            && let Some(failure) = result.first_permanent_error.clone()
        {
            return Err(MigrationError::Aborted {
                failure: Box::new(failure),
                result: Box::new(result),
            });
        }

        Ok(result)
    }

    /// Snapshot of the current or last run, if one was started.
    pub async fn status(&self) -> Option<RunState> {
        let active = self.active.read().await;
        let active = active.as_ref()?;

        Some(RunState {
            run_id: active.progress.run_id().to_string(),
            total_blocks: active.total_blocks,
            counts: active.progress.counts().await,
            started_at: active.started_at,
            cancelled: active.cancel.is_cancelled(),
        })
    }

    async fn finish(&self, result: &RunResult) -> Result<(), MigrationError> {
        self.store
            .append_wal(&WalEntry::RunDone {
                run_id: result.run_id.clone(),
                outcome: result.outcome.to_string(),
                succeeded: result.succeeded,
                failed: result.failed,
                skipped: result.skipped,
                at: result.finished_at,
            })
            .await?;
        self.store.flush().await?;

        self.events
            .publish(MigrationEvent::RunFinished {
                run_id: result.run_id.clone(),
                outcome: result.outcome.to_string(),
                succeeded: result.succeeded,
                failed: result.failed,
                skipped: result.skipped,
                duration_ms: result.duration_ms(),
                timestamp: result.finished_at,
            })
            .await;

        match result.outcome {
            RunOutcome::Completed => info!(
                run_id = %result.run_id,
                succeeded = result.succeeded,
                skipped = result.skipped,
                duration_ms = result.duration_ms(),
                "Migration completed"
            ),
            RunOutcome::CompletedWithFailures => warn!(
                run_id = %result.run_id,
                succeeded = result.succeeded,
                failed = result.failed,
                "Migration completed with failed blocks"
            ),
            RunOutcome::Cancelled => warn!(
                run_id = %result.run_id,
                succeeded = result.succeeded,
                not_started = result.not_started,
                "Migration cancelled"
            ),
            RunOutcome::Aborted => error!(
                run_id = %result.run_id,
                succeeded = result.succeeded,
                failed = result.failed,
                "Migration aborted"
            ),
        }

        Ok(())
    }
}
