use crate::{
    error::CliError,
    output::ProgressReport,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use commands::Commands;
use connectors::{CsvBlockWriter, CsvSampleReader};
use engine_config::MigrationSettings;
use engine_core::progress::ProgressTracker;
use engine_runtime::{MigrationCoordinator, RunConfig, error::MigrationError};
use planner::{Plan, Window};
use std::{path::Path, sync::Arc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;
mod shutdown;

/// Capacity of the `--events` channel. A slower consumer loses events
/// rather than slowing the workers down.
const EVENT_BUFFER: usize = 1024;

#[derive(Parser)]
#[command(
    name = "tsmigrate",
    version,
    about = "Block-by-block time-series migration tool"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Log filter, e.g. `debug` or `engine_runtime=debug`; RUST_LOG takes precedence"
    )]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let code = match run(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "tsmigrate failed");
            eprintln!("Error: {err}");
            ExitCode::GeneralError
        }
    };

    std::process::exit(code.as_i32());
}

fn init_tracing(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands) -> Result<ExitCode, CliError> {
    match command {
        Commands::Migrate { config, events } => migrate(&config, events).await,
        Commands::Plan { config, limit } => {
            let (_, run_config) = load_settings(&config)?;
            let plan = build_plan(&run_config)?;
            output::print_plan(&plan, &run_config.run_id(&plan), limit);
            Ok(ExitCode::Success)
        }
        Commands::Progress { config, json } => {
            show_progress(&config, json).await?;
            Ok(ExitCode::Success)
        }
    }
}

fn load_settings(path: &Path) -> Result<(MigrationSettings, RunConfig), CliError> {
    let settings = MigrationSettings::load(path)?;
    let run_config = settings.validate()?;
    Ok((settings, run_config))
}

fn build_plan(config: &RunConfig) -> Result<Plan, CliError> {
    let window = Window::new(config.mint, config.maxt)?;
    Ok(Plan::new(window, config.block_size)?)
}

async fn migrate(path: &Path, print_events: bool) -> Result<ExitCode, CliError> {
    let (settings, run_config) = load_settings(path)?;
    info!(
        config = %path.display(),
        source = %settings.source.path.display(),
        destination = %settings.destination.dir.display(),
        "Loaded migration config"
    );

    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    let reader = Arc::new(CsvSampleReader::new(settings.source.path));
    let writer = Arc::new(CsvBlockWriter::new(settings.destination.dir));
    let coordinator = MigrationCoordinator::new(run_config, reader, writer)?
        .with_cancel_token(shutdown.cancel_token());

    let printer = if print_events {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        coordinator.events().subscribe(tx).await;
        Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match serde_json::to_string(&*event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => warn!(error = %err, "Failed to serialize event"),
                }
            }
        }))
    } else {
        None
    };

    let outcome = coordinator.start().await;
    // Dropping the coordinator closes the event channel.
    drop(coordinator);
    if let Some(printer) = printer
        && let Err(err) = printer.await
    {
        warn!(error = %err, "Event printer stopped unexpectedly");
    }

    let result = match outcome {
        Ok(result) => result,
        Err(MigrationError::Aborted { failure, result }) => {
            error!(
                block = %failure.block,
                error = %failure.error,
                "Migration aborted on permanent failure"
            );
            *result
        }
        Err(err) => return Err(err.into()),
    };

    output::print_json(&result)?;

    if shutdown.is_shutdown_requested() {
        info!(run_id = %result.run_id, "Rerun the same config to resume");
    }
    Ok(ExitCode::for_outcome(result.outcome))
}

async fn show_progress(path: &Path, as_json: bool) -> Result<(), CliError> {
    let (_, run_config) = load_settings(path)?;
    let plan = build_plan(&run_config)?;
    let run_id = run_config.run_id(&plan);

    let store = run_config.state.open()?;
    let tracker = ProgressTracker::resume(run_id.clone(), store.clone()).await?;
    let records = tracker.snapshot().await;
    let wal = store.iter_wal(&run_id).await?;

    let report = ProgressReport::new(&run_id, &plan, &records, &wal);
    if as_json {
        output::print_json(&report)?;
    } else {
        output::print_progress_table(&report);
    }

    Ok(())
}
