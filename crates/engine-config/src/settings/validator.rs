use crate::{
    error::SettingsError,
    settings::{BlockSizeSetting, MigrationSettings},
};
use engine_core::retry::RetryPolicy;
use engine_runtime::{RunConfig, StateLocation};
use planner::BlockSize;
use std::{num::NonZeroUsize, path::PathBuf, time::Duration};
use tracing::{info, warn};

const DEFAULT_STATE_DIR: &str = ".tsmigrate/state";

impl MigrationSettings {
    /// Checks every setting and builds the run configuration.
    ///
    /// All problems are reported together. The window order is left to the
    /// coordinator, which rejects an inverted window before planning.
    pub fn validate(&self) -> Result<RunConfig, SettingsError> {
        let mut errors: Vec<String> = Vec::new();

        let concurrency = NonZeroUsize::new(self.concurrency);
        if concurrency.is_none() {
            errors.push("concurrency must be greater than zero".into());
        }

        let block_size = match self.block_size {
            BlockSizeSetting::DurationMs(ms) if ms <= 0 => {
                errors.push(format!("block_size.duration_ms must be positive, got {ms}"));
                None
            }
            BlockSizeSetting::DurationMs(ms) => Some(BlockSize::Duration(ms)),
            BlockSizeSetting::Count(0) => {
                errors.push("block_size.count must be greater than zero".into());
                None
            }
            BlockSizeSetting::Count(n) => Some(BlockSize::Count(n)),
        };

        if self.retry.max_attempts == 0 {
            errors.push("retry.max_attempts must be at least 1".into());
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            warn!(
                base_delay_ms = self.retry.base_delay_ms,
                max_delay_ms = self.retry.max_delay_ms,
                "Retry max delay is below the base delay, every retry waits the max delay"
            );
        }

        if self.block_timeout_ms == Some(0) {
            errors.push("block_timeout_ms must be greater than zero".into());
        }

        if let Some(run_id) = &self.run_id
            && run_id.trim().is_empty()
        {
            errors.push("run_id must not be blank".into());
        }

        let (Some(concurrency), Some(block_size)) = (concurrency, block_size) else {
            return Err(SettingsError::ValidationFailed(errors));
        };
        if !errors.is_empty() {
            return Err(SettingsError::ValidationFailed(errors));
        }

        let state_dir = self.state_path()?;
        let config = RunConfig {
            mint: self.window.start,
            maxt: self.window.end,
            block_size,
            concurrency,
            retry: RetryPolicy::new(
                self.retry.max_attempts,
                Duration::from_millis(self.retry.base_delay_ms),
                Duration::from_millis(self.retry.max_delay_ms),
            ),
            fail_fast: self.fail_fast,
            block_timeout: self.block_timeout_ms.map(Duration::from_millis),
            run_id: self.run_id.clone(),
            resume: self.resume,
            state: StateLocation::Sled(state_dir),
        };

        info!(
            mint = config.mint,
            maxt = config.maxt,
            block_size = %config.block_size,
            concurrency = config.concurrency.get(),
            fail_fast = config.fail_fast,
            "Settings validated"
        );

        Ok(config)
    }

    /// Resolved progress store directory: `state_dir` with `~` expanded, or
    /// `~/.tsmigrate/state`.
    pub fn state_path(&self) -> Result<PathBuf, SettingsError> {
        match &self.state_dir {
            Some(raw) => expand_home(raw),
            None => dirs::home_dir()
                .map(|home| home.join(DEFAULT_STATE_DIR))
                .ok_or(SettingsError::MissingHomeDir),
        }
    }
}

fn expand_home(raw: &str) -> Result<PathBuf, SettingsError> {
    let rest = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return Ok(PathBuf::from(raw)),
    };

    let home = dirs::home_dir().ok_or(SettingsError::MissingHomeDir)?;
    Ok(if rest.is_empty() { home } else { home.join(rest) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(extra: &str) -> MigrationSettings {
        MigrationSettings::from_json(&format!(
            r#"{{
                "window": {{ "start": 0, "end": 86399999 }},
                "block_size": {{ "duration_ms": 3599999 }},
                "state_dir": "/tmp/tsmigrate-state",
                "source": {{ "path": "in.csv" }},
                "destination": {{ "dir": "out" }}
                {extra}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn builds_run_config() {
        let config = settings(r#", "concurrency": 8, "block_timeout_ms": 1500, "fail_fast": true"#)
            .validate()
            .unwrap();

        assert_eq!(config.mint, 0);
        assert_eq!(config.maxt, 86_399_999);
        assert_eq!(config.block_size, BlockSize::Duration(3_599_999));
        assert_eq!(config.concurrency.get(), 8);
        assert_eq!(config.block_timeout, Some(Duration::from_millis(1500)));
        assert!(config.fail_fast);
        assert!(config.resume);
        assert_eq!(
            config.state,
            StateLocation::Sled(PathBuf::from("/tmp/tsmigrate-state"))
        );
    }

    #[test]
    fn collects_every_problem() {
        let err = settings(
            r#", "concurrency": 0, "block_timeout_ms": 0, "retry": { "max_attempts": 0 }"#,
        )
        .validate()
        .unwrap_err();

        let SettingsError::ValidationFailed(errors) = err else {
            panic!("expected validation failure, got {err}");
        };
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("concurrency")));
        assert!(errors.iter().any(|e| e.contains("max_attempts")));
        assert!(errors.iter().any(|e| e.contains("block_timeout_ms")));
    }

    #[test]
    fn rejects_empty_block_sizes() {
        let mut zero_count = settings("");
        zero_count.block_size = BlockSizeSetting::Count(0);
        assert!(matches!(
            zero_count.validate(),
            Err(SettingsError::ValidationFailed(_))
        ));

        let mut zero_duration = settings("");
        zero_duration.block_size = BlockSizeSetting::DurationMs(0);
        assert!(matches!(
            zero_duration.validate(),
            Err(SettingsError::ValidationFailed(_))
        ));
    }

    #[test]
    fn leaves_window_order_to_the_coordinator() {
        let mut inverted = settings("");
        inverted.window.start = 10;
        inverted.window.end = 0;

        let config = inverted.validate().unwrap();
        assert_eq!((config.mint, config.maxt), (10, 0));
    }

    #[test]
    fn expands_home_directory() {
        let Some(home) = dirs::home_dir() else {
            return;
        };

        assert_eq!(expand_home("~").unwrap(), home);
        assert_eq!(expand_home("~/state").unwrap(), home.join("state"));
        assert_eq!(expand_home("~other/x").unwrap(), PathBuf::from("~other/x"));
        assert_eq!(expand_home("rel/dir").unwrap(), PathBuf::from("rel/dir"));

        let mut defaulted = settings("");
        defaulted.state_dir = None;
        assert_eq!(
            defaulted.state_path().unwrap(),
            home.join(DEFAULT_STATE_DIR)
        );
    }
}
