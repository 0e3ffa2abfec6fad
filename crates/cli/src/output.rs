use crate::error::CliError;
use chrono::{DateTime, Utc};
use engine_core::state::models::{BlockStatus, ProgressRecord, WalEntry};
use model::core::timestamp::{Timestamp, display};
use planner::Plan;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub fn print_plan(plan: &Plan, run_id: &str, limit: Option<u64>) {
    let window = plan.window();
    println!("Run id         {run_id}");
    println!(
        "Window         {} .. {}",
        display(window.mint()),
        display(window.maxt())
    );
    println!("Block size     {} ({}ms)", plan.block_size(), plan.block_duration_ms());
    println!("Blocks         {}", plan.len());
    println!("-----------------------------");

    let shown = limit.unwrap_or(u64::MAX);
    for (index, block) in plan.blocks().take(shown.min(plan.len()) as usize).enumerate() {
        println!(
            "{:>6}  [{}, {}]  {} .. {}",
            index,
            block.mint(),
            block.maxt(),
            display(block.mint()),
            display(block.maxt())
        );
    }
    if shown < plan.len() {
        println!("... {} more", plan.len() - shown);
    }
}

#[derive(Debug, Serialize)]
pub struct FailedBlock {
    pub mint: Timestamp,
    pub maxt: Timestamp,
    pub attempts: u32,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct LastRun {
    pub outcome: String,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub finished_at: DateTime<Utc>,
}

/// Progress of one run as recorded in the state store.
#[derive(Debug, Serialize)]
pub struct ProgressReport {
    pub run_id: String,
    pub total_blocks: u64,
    /// Includes blocks that were never started.
    pub pending: u64,
    pub in_flight: u64,
    pub retrying: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub failed_blocks: Vec<FailedBlock>,
    pub last_run: Option<LastRun>,
}

impl ProgressReport {
    pub fn new(run_id: &str, plan: &Plan, records: &[ProgressRecord], wal: &[WalEntry]) -> Self {
        let mut report = ProgressReport {
            run_id: run_id.to_string(),
            total_blocks: plan.len(),
            pending: 0,
            in_flight: 0,
            retrying: 0,
            succeeded: 0,
            failed: 0,
            failed_blocks: Vec::new(),
            last_run: None,
        };

        // Records of blocks outside this plan belong to another sizing.
        for record in records.iter().filter(|r| plan.index_of(&r.block).is_some()) {
            match &record.status {
                BlockStatus::Pending => {}
                BlockStatus::InFlight => report.in_flight += 1,
                BlockStatus::Retrying { .. } => report.retrying += 1,
                BlockStatus::Succeeded => report.succeeded += 1,
                BlockStatus::Failed { reason } => {
                    report.failed += 1;
                    report.failed_blocks.push(FailedBlock {
                        mint: record.block.mint(),
                        maxt: record.block.maxt(),
                        attempts: record.attempts,
                        reason: reason.clone(),
                    });
                }
            }
        }
        report.pending = report.total_blocks
            - report.in_flight
            - report.retrying
            - report.succeeded
            - report.failed;

        report.last_run = wal.iter().rev().find_map(|entry| match entry {
            WalEntry::RunDone {
                outcome,
                succeeded,
                failed,
                skipped,
                at,
                ..
            } => Some(LastRun {
                outcome: outcome.clone(),
                succeeded: *succeeded,
                failed: *failed,
                skipped: *skipped,
                finished_at: *at,
            }),
            WalEntry::RunStart { .. } => None,
        });

        report
    }
}

pub fn print_progress_table(report: &ProgressReport) {
    println!("Progress for run '{}':", report.run_id);
    println!("-----------------------------");
    println!("{:<16} {}", "Blocks", report.total_blocks);
    println!("{:<16} {}", "Succeeded", report.succeeded);
    println!("{:<16} {}", "Failed", report.failed);
    println!("{:<16} {}", "In flight", report.in_flight);
    println!("{:<16} {}", "Retrying", report.retrying);
    println!("{:<16} {}", "Pending", report.pending);

    let last = report
        .last_run
        .as_ref()
        .map(|run| format!("{} at {}", run.outcome, run.finished_at.to_rfc3339()))
        .unwrap_or_else(|| "n/a".to_string());
    println!("{:<16} {}", "Last run", last);

    for block in &report.failed_blocks {
        println!(
            "  failed [{}, {}] after {} attempt(s): {}",
            block.mint, block.maxt, block.attempts, block.reason
        );
    }
}
