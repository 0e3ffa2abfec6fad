use crate::execution::result::BlockFailure;
use chrono::Utc;
use engine_core::{
    connectors::{BlockContext, destination::SampleWriter, source::SampleReader},
    error::{ExecutionError, ProgressError},
    event_bus::EventBus,
    metrics::Metrics,
    progress::ProgressTracker,
    retry::RetryPolicy,
};
use model::events::MigrationEvent;
use planner::Block;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(crate) enum BlockOutcome {
    Succeeded,
    Failed(BlockFailure),
    /// Stopped by cancellation and returned to `Pending`.
    Interrupted,
}

/// Runs the read-then-write pipeline for one block at a time, driving the
/// block's record through
/// `InFlight -> (Succeeded | Retrying -> InFlight | Failed | Pending)`.
pub(crate) struct BlockWorker {
    pub run_id: String,
    pub reader: Arc<dyn SampleReader>,
    pub writer: Arc<dyn SampleWriter>,
    pub progress: Arc<ProgressTracker>,
    pub retry: RetryPolicy,
    pub block_timeout: Option<Duration>,
    pub fail_fast: bool,
    pub events: EventBus,
    pub metrics: Metrics,
    /// Fires on user cancellation and on fail-fast abort.
    pub stop: CancellationToken,
}

impl BlockWorker {
    pub async fn run(
        self: Arc<Self>,
        block: Block,
        _permit: OwnedSemaphorePermit,
    ) -> Result<BlockOutcome, ProgressError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.progress.record_start(&block).await?;
            self.metrics.increment_started();
            self.publish_started(&block, attempt).await;
            debug!(block.mint = block.mint(), block.maxt = block.maxt(), attempt, "Block started");

            let started = Instant::now();
            let err = match self.execute(&block, attempt).await {
                Ok(samples) => {
                    self.progress.record_success(&block).await?;
                    self.metrics.increment_succeeded();
                    self.metrics.increment_samples(samples);

                    let duration_ms = started.elapsed().as_millis() as u64;
                    info!(
                        block.mint = block.mint(),
                        block.maxt = block.maxt(),
                        samples,
                        duration_ms,
                        "Block migrated"
                    );
                    self.events
                        .publish(MigrationEvent::BlockSucceeded {
                            run_id: self.run_id.clone(),
                            mint: block.mint(),
                            maxt: block.maxt(),
                            samples,
                            duration_ms,
                            timestamp: Utc::now(),
                        })
                        .await;

                    return Ok(BlockOutcome::Succeeded);
                }
                Err(err) => err,
            };

            if err == ExecutionError::Cancelled {
                return self.interrupt(block, attempt).await;
            }

            let reason = err.to_string();
            let Some(delay) = self.retry.next_delay(attempt, &err) else {
                return self.give_up(block, attempt, err).await;
            };

            self.progress.record_retry(&block, &reason).await?;
            self.metrics.increment_retries();
            warn!(
                block.mint = block.mint(),
                block.maxt = block.maxt(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %reason,
                "Block failed, retrying"
            );
            self.events
                .publish(MigrationEvent::BlockRetrying {
                    run_id: self.run_id.clone(),
                    mint: block.mint(),
                    maxt: block.maxt(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    error: reason,
                    timestamp: Utc::now(),
                })
                .await;

            tokio::select! {
                biased;
                _ = self.stop.cancelled() => return self.interrupt(block, attempt).await,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One attempt: fetch, then store. Cancellation is honoured between the
    /// two calls, never in the middle of a write.
    async fn execute(&self, block: &Block, attempt: u32) -> Result<u64, ExecutionError> {
        // Per-attempt token: a timed-out attempt stops its adapter work
        // without stopping the run.
        let attempt_cancel = self.stop.child_token();
        let ctx = BlockContext {
            run_id: self.run_id.clone(),
            attempt,
            deadline: self.block_timeout.map(|t| Instant::now() + t),
            cancel: attempt_cancel.clone(),
        };

        let pipeline = async {
            let batch = self.reader.fetch(block, &ctx).await?;
            if ctx.is_cancelled() {
                return Err(ExecutionError::Cancelled);
            }

            let samples = batch.sample_count();
            self.writer.store(block, batch, &ctx).await?;
            Ok(samples)
        };

        match self.block_timeout {
            Some(limit) => match tokio::time::timeout(limit, pipeline).await {
                Ok(result) => result,
                Err(_) => {
                    attempt_cancel.cancel();
                    Err(ExecutionError::Timeout(limit))
                }
            },
            None => pipeline.await,
        }
    }

    async fn give_up(
        &self,
        block: Block,
        attempt: u32,
        err: ExecutionError,
    ) -> Result<BlockOutcome, ProgressError> {
        let reason = err.to_string();
        let permanent = matches!(err, ExecutionError::Permanent(_));

        self.progress.record_failure(&block, &reason).await?;
        self.metrics.increment_failed();
        error!(
            block.mint = block.mint(),
            block.maxt = block.maxt(),
            attempts = attempt,
            permanent,
            error = %reason,
            "Block failed"
        );
        self.events
            .publish(MigrationEvent::BlockFailed {
                run_id: self.run_id.clone(),
                mint: block.mint(),
                maxt: block.maxt(),
                attempts: attempt,
                error: reason.clone(),
                timestamp: Utc::now(),
            })
            .await;

        if permanent && self.fail_fast && !self.stop.is_cancelled() {
            warn!(
                block.mint = block.mint(),
                block.maxt = block.maxt(),
                "Fail-fast enabled, stopping run"
            );
            self.stop.cancel();
        }

        let failure = BlockFailure {
            block,
            error: reason,
            permanent,
            attempts: attempt,
        };
        Ok(BlockOutcome::Failed(failure))
    }

    async fn interrupt(&self, block: Block, attempt: u32) -> Result<BlockOutcome, ProgressError> {
        self.progress.record_pending(&block).await?;
        debug!(
            block.mint = block.mint(),
            block.maxt = block.maxt(),
            "Block interrupted, left pending"
        );
        Ok(BlockOutcome::Interrupted)
    }

    async fn publish_started(&self, block: &Block, attempt: u32) {
        self.events
            .publish(MigrationEvent::BlockStarted {
                run_id: self.run_id.clone(),
                mint: block.mint(),
                maxt: block.maxt(),
                attempt,
                timestamp: Utc::now(),
            })
            .await;
    }
}
