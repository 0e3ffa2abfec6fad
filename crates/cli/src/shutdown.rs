use engine_runtime::RunOutcome;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Listens for SIGINT and SIGTERM and cancels the running migration.
///
/// Cancellation is cooperative: blocks already being written finish their
/// current step, everything else is left pending for the next run.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register_handlers(&self) {
        let cancel_token = self.cancel_token.clone();
        let shutdown_flag = self.shutdown_requested.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(err) = signal::ctrl_c().await {
                    error!(error = %err, "Failed to install SIGINT handler");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(err) => {
                        error!(error = %err, "Failed to install SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received SIGINT (Ctrl+C), stopping after in-flight blocks");
                }
                _ = terminate => {
                    info!("Received SIGTERM, stopping after in-flight blocks");
                }
                _ = cancel_token.cancelled() => return,
            }

            shutdown_flag.store(true, Ordering::SeqCst);
            cancel_token.cancel();
        });
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

/// Exit codes for the CLI application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    ShutdownRequested = 130, // Standard exit code for SIGINT
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn for_outcome(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed => ExitCode::Success,
            RunOutcome::Cancelled => ExitCode::ShutdownRequested,
            RunOutcome::CompletedWithFailures | RunOutcome::Aborted => ExitCode::GeneralError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_outcomes_to_exit_codes() {
        assert_eq!(ExitCode::for_outcome(RunOutcome::Completed).as_i32(), 0);
        assert_eq!(
            ExitCode::for_outcome(RunOutcome::CompletedWithFailures).as_i32(),
            1
        );
        assert_eq!(ExitCode::for_outcome(RunOutcome::Aborted).as_i32(), 1);
        assert_eq!(ExitCode::for_outcome(RunOutcome::Cancelled).as_i32(), 130);
    }

    #[tokio::test]
    async fn exposes_the_shared_token() {
        let token = CancellationToken::new();
        let shutdown = ShutdownCoordinator::new(token.clone());

        shutdown.cancel_token().cancel();
        assert!(token.is_cancelled());
        assert!(!shutdown.is_shutdown_requested());
    }
}
