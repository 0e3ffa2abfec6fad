use crate::{
    error::MigrationError,
    execution::{
        result::{BlockFailure, RunOutcome, RunResult},
        settings::RunConfig,
        worker::{BlockOutcome, BlockWorker},
    },
};
use chrono::Utc;
use engine_core::{
    connectors::{destination::SampleWriter, source::SampleReader},
    error::ProgressError,
    event_bus::EventBus,
    metrics::Metrics,
    progress::ProgressTracker,
};
use planner::Plan;
use std::sync::Arc;
use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Feeds the pending blocks of a plan to a bounded pool of workers.
///
/// At most `concurrency` blocks are in flight. Blocks are handed out in
/// ascending time order; completion order is unspecified.
pub struct Dispatcher {
    reader: Arc<dyn SampleReader>,
    writer: Arc<dyn SampleWriter>,
    events: EventBus,
    metrics: Metrics,
}

#[derive(Default)]
struct Tally {
    succeeded: u64,
    failed: u64,
    interrupted: u64,
    failures: Vec<BlockFailure>,
    first_permanent: Option<BlockFailure>,
}

impl Tally {
    fn absorb(&mut self, outcome: BlockOutcome) {
        match outcome {
            BlockOutcome::Succeeded => self.succeeded += 1,
            BlockOutcome::Interrupted => self.interrupted += 1,
            BlockOutcome::Failed(failure) => {
                self.failed += 1;
                if failure.permanent && self.first_permanent.is_none() {
                    self.first_permanent = Some(failure.clone());
                }
                self.failures.push(failure);
            }
        }
    }
}

impl Dispatcher {
    pub fn new(
        reader: Arc<dyn SampleReader>,
        writer: Arc<dyn SampleWriter>,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        Self {
            reader,
            writer,
            events,
            metrics,
        }
    }

    /// Migrates every block of `plan` not yet recorded as succeeded.
    ///
    /// Returns once every dispatched block has reached a resting state.
    /// Cancelling `cancel` stops dispatching; blocks already running finish
    /// their current read or write and go back to `Pending`.
    pub async fn run(
        &self,
        plan: &Plan,
        progress: Arc<ProgressTracker>,
        config: &RunConfig,
        cancel: &CancellationToken,
    ) -> Result<RunResult, MigrationError> {
        let started_at = Utc::now();
        let run_id = progress.run_id().to_string();

        // Child token so fail-fast stops this run without touching the caller's.
        let stop = cancel.child_token();
        let worker = Arc::new(BlockWorker {
            run_id: run_id.clone(),
            reader: self.reader.clone(),
            writer: self.writer.clone(),
            progress: progress.clone(),
            retry: config.retry.clone(),
            block_timeout: config.block_timeout,
            fail_fast: config.fail_fast,
            events: self.events.clone(),
            metrics: self.metrics.clone(),
            stop: stop.clone(),
        });

        let semaphore = Arc::new(Semaphore::new(config.concurrency.get()));
        let mut pending = progress.pending_blocks(plan.blocks()).await;
        let mut tasks: JoinSet<Result<BlockOutcome, ProgressError>> = JoinSet::new();
        let mut tally = Tally::default();
        let mut fault: Option<MigrationError> = None;
        let mut exhausted = false;

        info!(
            run_id = %run_id,
            blocks = plan.len(),
            already_complete = pending.completed(),
            concurrency = config.concurrency.get(),
            "Dispatching blocks"
        );

        loop {
            while let Some(joined) = tasks.try_join_next() {
                Self::collect(joined, &mut tally, &mut fault, &stop);
            }

            let permit = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => permit,
            };
            // The semaphore is never closed.
            let Ok(permit) = permit else { break };

            if stop.is_cancelled() {
                break;
            }

            let Some(block) = pending.next() else {
                exhausted = true;
                break;
            };

            tasks.spawn(worker.clone().run(block, permit));
        }

        while let Some(joined) = tasks.join_next().await {
            Self::collect(joined, &mut tally, &mut fault, &stop);
        }

        if let Some(err) = fault {
            return Err(err);
        }

        // Blocks this run never reached go back to `Pending`, including ones
        // an earlier run left `Failed`.
        let mut remaining = 0u64;
        if !exhausted {
            for block in pending.by_ref() {
                progress.record_pending(&block).await?;
                remaining += 1;
            }
        }
        let skipped = pending.skipped();
        let metrics = self.metrics.snapshot();

        let outcome = if config.fail_fast && tally.first_permanent.is_some() {
            RunOutcome::Aborted
        } else if remaining > 0 || tally.interrupted > 0 {
            RunOutcome::Cancelled
        } else if tally.failed > 0 {
            RunOutcome::CompletedWithFailures
        } else {
            RunOutcome::Completed
        };

        if remaining > 0 {
            warn!(run_id = %run_id, not_started = remaining, "Dispatch stopped early");
        }

        Ok(RunResult {
            run_id,
            outcome,
            total_blocks: plan.len(),
            succeeded: tally.succeeded,
            failed: tally.failed,
            skipped,
            not_started: remaining + tally.interrupted,
            attempts: metrics.blocks_started,
            retries: metrics.retry_count,
            failures: tally.failures,
            first_permanent_error: tally.first_permanent,
            metrics,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// A worker that cannot record progress takes the whole run down: the
    /// remaining workers are stopped and the first such error is kept.
    fn collect(
        joined: Result<Result<BlockOutcome, ProgressError>, JoinError>,
        tally: &mut Tally,
        fault: &mut Option<MigrationError>,
        stop: &CancellationToken,
    ) {
        let err = match joined {
            Ok(Ok(outcome)) => {
                tally.absorb(outcome);
                return;
            }
            Ok(Err(err)) => MigrationError::from(err),
            Err(err) => MigrationError::from(err),
        };

        error!(error = %err, "Worker failed, stopping run");
        stop.cancel();
        if fault.is_none() {
            *fault = Some(err);
        }
    }
}
