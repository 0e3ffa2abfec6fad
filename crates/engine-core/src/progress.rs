use crate::{
    error::ProgressError,
    state::{
        StateStore,
        models::{BlockStatus, ProgressRecord},
    },
};
use chrono::Utc;
use planner::Block;
use serde::Serialize;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Per-block progress bookkeeping shared by every worker of a run.
///
/// Each block's record sits behind its own mutex, held across the store
/// write, so two workers never interleave updates to the same block while
/// updates to different blocks proceed independently. The outer map lock is
/// only taken to find or insert an entry.
pub struct ProgressTracker {
    run_id: String,
    store: Arc<dyn StateStore>,
    records: RwLock<HashMap<Block, Arc<Mutex<ProgressRecord>>>>,
}

/// Aggregate number of blocks in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub in_flight: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retrying: u64,
}

impl StatusCounts {
    fn add(&mut self, status: &BlockStatus) {
        match status {
            BlockStatus::Pending => self.pending += 1,
            BlockStatus::InFlight => self.in_flight += 1,
            BlockStatus::Succeeded => self.succeeded += 1,
            BlockStatus::Failed { .. } => self.failed += 1,
            BlockStatus::Retrying { .. } => self.retrying += 1,
        }
    }
}

impl ProgressTracker {
    /// A tracker with no prior progress. Records written by earlier runs with
    /// the same id are ignored until [`ProgressTracker::resume`] is used.
    pub fn new(run_id: impl Into<String>, store: Arc<dyn StateStore>) -> Self {
        Self {
            run_id: run_id.into(),
            store,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Loads every persisted record of `run_id`.
    pub async fn resume(
        run_id: impl Into<String>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, ProgressError> {
        let run_id = run_id.into();
        let loaded = store.load_records(&run_id).await?;

        let mut counts = StatusCounts::default();
        let mut records = HashMap::with_capacity(loaded.len());
        for record in loaded {
            counts.add(&record.status);
            records.insert(record.block, Arc::new(Mutex::new(record)));
        }

        info!(
            run_id = %run_id,
            succeeded = counts.succeeded,
            failed = counts.failed,
            interrupted = counts.in_flight + counts.retrying,
            "Resumed progress"
        );

        Ok(Self {
            run_id,
            store,
            records: RwLock::new(records),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Marks the block as being worked on.
    pub async fn record_start(&self, block: &Block) -> Result<(), ProgressError> {
        self.transition(block, BlockStatus::InFlight, |record| {
            record.last_attempted_at = Some(Utc::now());
        })
        .await
        .map(|_| ())
    }

    pub async fn record_success(&self, block: &Block) -> Result<(), ProgressError> {
        self.transition(block, BlockStatus::Succeeded, |_| {})
            .await
            .map(|_| ())
    }

    /// Marks the block as permanently failed and returns its attempt count.
    pub async fn record_failure(&self, block: &Block, reason: &str) -> Result<u32, ProgressError> {
        let status = BlockStatus::Failed {
            reason: reason.to_string(),
        };
        self.transition(block, status, |record| {
            record.attempts = record.attempts.saturating_add(1);
        })
        .await
    }

    /// Marks the block as waiting for another attempt and returns its attempt
    /// count.
    pub async fn record_retry(&self, block: &Block, reason: &str) -> Result<u32, ProgressError> {
        let status = BlockStatus::Retrying {
            reason: reason.to_string(),
        };
        self.transition(block, status, |record| {
            record.attempts = record.attempts.saturating_add(1);
        })
        .await
    }

    /// Returns an unfinished block to `Pending`. Blocks that were never
    /// touched, already pending, or already finished are left alone, so this
    /// is safe to call for every block a cancelled run did not get to.
    pub async fn record_pending(&self, block: &Block) -> Result<(), ProgressError> {
        let Some(entry) = self.records.read().await.get(block).cloned() else {
            return Ok(());
        };

        let mut record = entry.lock().await;
        if !record.status.can_transition_to(&BlockStatus::Pending) {
            return Ok(());
        }

        let mut next = record.clone();
        next.status = BlockStatus::Pending;
        next.updated_at = Utc::now();
        self.store.save_record(&next).await?;
        *record = next;
        Ok(())
    }

    pub async fn is_complete(&self, block: &Block) -> bool {
        let entry = self.records.read().await.get(block).cloned();
        match entry {
            Some(entry) => entry.lock().await.status == BlockStatus::Succeeded,
            None => false,
        }
    }

    pub async fn record(&self, block: &Block) -> Option<ProgressRecord> {
        let entry = self.records.read().await.get(block).cloned()?;
        let record = entry.lock().await;
        Some(record.clone())
    }

    /// Filters `blocks` down to those still needing work: everything except
    /// `Succeeded`. Failed and interrupted (`InFlight`, `Retrying`) blocks are
    /// re-admitted. The filter is lazy over `blocks`; only the set of
    /// finished blocks is captured up front.
    pub async fn pending_blocks<I>(&self, blocks: I) -> PendingBlocks<I::IntoIter>
    where
        I: IntoIterator<Item = Block>,
    {
        let entries: Vec<(Block, Arc<Mutex<ProgressRecord>>)> = self
            .records
            .read()
            .await
            .iter()
            .map(|(block, entry)| (*block, entry.clone()))
            .collect();

        let mut completed = HashSet::new();
        for (block, entry) in entries {
            if entry.lock().await.status == BlockStatus::Succeeded {
                completed.insert(block);
            }
        }

        debug!(
            run_id = %self.run_id,
            completed = completed.len(),
            "Computed pending blocks"
        );

        PendingBlocks {
            inner: blocks.into_iter(),
            completed,
            skipped: 0,
        }
    }

    pub async fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in self.snapshot().await {
            counts.add(&record.status);
        }
        counts
    }

    /// Copies of every known record, ordered by block start time.
    pub async fn snapshot(&self) -> Vec<ProgressRecord> {
        let entries: Vec<Arc<Mutex<ProgressRecord>>> =
            self.records.read().await.values().cloned().collect();

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            records.push(entry.lock().await.clone());
        }
        records.sort_by_key(|r| r.block);
        records
    }

    async fn entry(&self, block: &Block) -> Arc<Mutex<ProgressRecord>> {
        if let Some(entry) = self.records.read().await.get(block) {
            return entry.clone();
        }

        self.records
            .write()
            .await
            .entry(*block)
            .or_insert_with(|| Arc::new(Mutex::new(ProgressRecord::pending(&self.run_id, *block))))
            .clone()
    }

    /// Applies a status change under the block's lock and persists it before
    /// publishing it in memory. Returns the resulting attempt count.
    async fn transition<F>(
        &self,
        block: &Block,
        status: BlockStatus,
        update: F,
    ) -> Result<u32, ProgressError>
    where
        F: FnOnce(&mut ProgressRecord),
    {
        let entry = self.entry(block).await;
        let mut record = entry.lock().await;

        if !record.status.can_transition_to(&status) {
            return Err(ProgressError::InvalidTransition {
                block: *block,
                from: record.status.clone(),
                to: status,
            });
        }

        let mut next = record.clone();
        next.status = status;
        next.updated_at = Utc::now();
        update(&mut next);

        self.store.save_record(&next).await?;
        *record = next;
        Ok(record.attempts)
    }
}

/// Lazy filter produced by [`ProgressTracker::pending_blocks`].
pub struct PendingBlocks<I> {
    inner: I,
    completed: HashSet<Block>,
    skipped: u64,
}

impl<I> PendingBlocks<I> {
    /// Blocks passed over so far because they had already succeeded.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Finished blocks known when the filter was built.
    pub fn completed(&self) -> usize {
        self.completed.len()
    }
}

impl<I: Iterator<Item = Block>> Iterator for PendingBlocks<I> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        for block in self.inner.by_ref() {
            if self.completed.contains(&block) {
                self.skipped += 1;
                continue;
            }
            return Some(block);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{memory::MemoryStateStore, sled_store::SledStateStore};
    use planner::{BlockSize, Plan, Window};
    use tempfile::tempdir;

    const RUN_ID: &str = "test-run";

    fn plan() -> Plan {
        Plan::new(Window::new(0, 99).unwrap(), BlockSize::Duration(9)).unwrap()
    }

    fn memory() -> Arc<dyn StateStore> {
        Arc::new(MemoryStateStore::new())
    }

    #[tokio::test]
    async fn tracks_block_lifecycle() {
        let tracker = ProgressTracker::new(RUN_ID, memory());
        let block = plan().block(0).unwrap();

        assert!(!tracker.is_complete(&block).await);
        tracker.record_start(&block).await.unwrap();
        assert_eq!(
            tracker.record(&block).await.unwrap().status,
            BlockStatus::InFlight
        );

        assert_eq!(tracker.record_retry(&block, "reset").await.unwrap(), 1);
        tracker.record_start(&block).await.unwrap();
        tracker.record_success(&block).await.unwrap();

        let record = tracker.record(&block).await.unwrap();
        assert_eq!(record.status, BlockStatus::Succeeded);
        assert_eq!(record.attempts, 1);
        assert!(record.last_attempted_at.is_some());
        assert!(tracker.is_complete(&block).await);
    }

    #[tokio::test]
    async fn failure_increments_attempts() {
        let tracker = ProgressTracker::new(RUN_ID, memory());
        let block = plan().block(2).unwrap();

        tracker.record_start(&block).await.unwrap();
        assert_eq!(tracker.record_retry(&block, "timeout").await.unwrap(), 1);
        tracker.record_start(&block).await.unwrap();
        assert_eq!(tracker.record_failure(&block, "rejected").await.unwrap(), 2);

        let record = tracker.record(&block).await.unwrap();
        assert_eq!(
            record.status,
            BlockStatus::Failed {
                reason: "rejected".into()
            }
        );
    }

    #[tokio::test]
    async fn rejects_illegal_transitions() {
        let tracker = ProgressTracker::new(RUN_ID, memory());
        let block = plan().block(1).unwrap();

        // Cannot succeed without being started.
        assert!(matches!(
            tracker.record_success(&block).await,
            Err(ProgressError::InvalidTransition { .. })
        ));

        tracker.record_start(&block).await.unwrap();
        tracker.record_success(&block).await.unwrap();

        // A finished block is never restarted.
        assert!(matches!(
            tracker.record_start(&block).await,
            Err(ProgressError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn pending_blocks_is_complement_of_succeeded() {
        let plan = plan();
        let tracker = ProgressTracker::new(RUN_ID, memory());
        let all: Vec<Block> = plan.blocks().collect();

        let succeeded: HashSet<Block> = [0usize, 3, 4, 9].iter().map(|&i| all[i]).collect();
        for block in &succeeded {
            tracker.record_start(block).await.unwrap();
            tracker.record_success(block).await.unwrap();
        }

        // Failed and interrupted blocks must come back.
        tracker.record_start(&all[5]).await.unwrap();
        tracker.record_failure(&all[5], "bad").await.unwrap();
        tracker.record_start(&all[6]).await.unwrap();

        let mut pending = tracker.pending_blocks(plan.blocks()).await;
        let remaining: Vec<Block> = pending.by_ref().collect();
        let expected: Vec<Block> = all
            .iter()
            .filter(|b| !succeeded.contains(*b))
            .copied()
            .collect();

        assert_eq!(remaining, expected);
        assert_eq!(pending.skipped(), succeeded.len() as u64);
        assert_eq!(pending.completed(), succeeded.len());
    }

    #[tokio::test]
    async fn record_pending_only_touches_unfinished_blocks() {
        let plan = plan();
        let tracker = ProgressTracker::new(RUN_ID, memory());
        let (a, b, c) = (
            plan.block(0).unwrap(),
            plan.block(1).unwrap(),
            plan.block(2).unwrap(),
        );

        tracker.record_start(&a).await.unwrap();
        tracker.record_retry(&a, "reset").await.unwrap();
        tracker.record_start(&b).await.unwrap();
        tracker.record_success(&b).await.unwrap();

        for block in [a, b, c] {
            tracker.record_pending(&block).await.unwrap();
        }

        assert_eq!(tracker.record(&a).await.unwrap().status, BlockStatus::Pending);
        assert_eq!(
            tracker.record(&b).await.unwrap().status,
            BlockStatus::Succeeded
        );
        assert!(tracker.record(&c).await.is_none(), "untouched stays absent");
    }

    #[tokio::test]
    async fn counts_by_status() {
        let plan = plan();
        let tracker = ProgressTracker::new(RUN_ID, memory());
        let blocks: Vec<Block> = plan.blocks().take(4).collect();

        tracker.record_start(&blocks[0]).await.unwrap();
        tracker.record_success(&blocks[0]).await.unwrap();
        tracker.record_start(&blocks[1]).await.unwrap();
        tracker.record_failure(&blocks[1], "x").await.unwrap();
        tracker.record_start(&blocks[2]).await.unwrap();
        tracker.record_retry(&blocks[2], "y").await.unwrap();
        tracker.record_start(&blocks[3]).await.unwrap();

        assert_eq!(
            tracker.counts().await,
            StatusCounts {
                pending: 0,
                in_flight: 1,
                succeeded: 1,
                failed: 1,
                retrying: 1,
            }
        );
    }

    #[tokio::test]
    async fn resumes_from_durable_store() {
        let dir = tempdir().unwrap();
        let plan = plan();
        let all: Vec<Block> = plan.blocks().collect();

        {
            let store: Arc<dyn StateStore> =
                Arc::new(SledStateStore::open(dir.path()).expect("open sled"));
            let tracker = ProgressTracker::new(RUN_ID, store.clone());
            for block in &all[..3] {
                tracker.record_start(block).await.unwrap();
                tracker.record_success(block).await.unwrap();
            }
            tracker.record_start(&all[3]).await.unwrap();
            store.flush().await.unwrap();
        }

        let store: Arc<dyn StateStore> =
            Arc::new(SledStateStore::open(dir.path()).expect("open sled"));
        let tracker = ProgressTracker::resume(RUN_ID, store).await.unwrap();

        assert!(tracker.is_complete(&all[0]).await);
        assert_eq!(
            tracker.record(&all[3]).await.unwrap().status,
            BlockStatus::InFlight
        );

        let pending: Vec<Block> = tracker.pending_blocks(plan.blocks()).await.collect();
        assert_eq!(pending, all[3..].to_vec());

        // The interrupted block can be picked up again.
        tracker.record_start(&all[3]).await.unwrap();
        tracker.record_success(&all[3]).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_updates_to_distinct_blocks() {
        let plan = plan();
        let tracker = Arc::new(ProgressTracker::new(RUN_ID, memory()));

        let mut handles = Vec::new();
        for block in plan.blocks() {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                tracker.record_start(&block).await.unwrap();
                tracker.record_success(&block).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(tracker.counts().await.succeeded, plan.len());
        assert_eq!(tracker.pending_blocks(plan.blocks()).await.count(), 0);
    }
}
