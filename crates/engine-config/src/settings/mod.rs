pub mod timestamp;
pub mod validator;

use crate::error::SettingsError;
use engine_core::retry::RetryPolicy;
use model::core::timestamp::Timestamp;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk description of a migration, as written by the operator.
///
/// Only shape is checked on deserialization; [`MigrationSettings::validate`]
/// turns it into a runnable configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationSettings {
    pub window: WindowSettings,
    pub block_size: BlockSizeSetting,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub block_timeout_ms: Option<u64>,
    /// Directory of the progress store. `~` expands to the home directory.
    #[serde(default)]
    pub state_dir: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default = "default_resume")]
    pub resume: bool,
    pub source: SourceSettings,
    pub destination: DestinationSettings,
}

/// Both bounds are inclusive.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowSettings {
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub start: Timestamp,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub end: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSizeSetting {
    DurationMs(i64),
    Count(u64),
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSettings {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationSettings {
    pub dir: PathBuf,
}

fn default_concurrency() -> usize {
    1
}

fn default_resume() -> bool {
    true
}

impl MigrationSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), "Loaded config file");
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_full_document() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "window": {{ "start": "2024-01-01T00:00:00Z", "end": 1704153600000 }},
                "block_size": {{ "duration_ms": 3600000 }},
                "concurrency": 4,
                "retry": {{ "max_attempts": 5, "base_delay_ms": 100, "max_delay_ms": 1000 }},
                "fail_fast": true,
                "block_timeout_ms": 60000,
                "state_dir": "/var/lib/tsmigrate",
                "run_id": "nightly",
                "source": {{ "path": "samples.csv" }},
                "destination": {{ "dir": "out" }}
            }}"#
        )
        .unwrap();

        let settings = MigrationSettings::load(file.path()).unwrap();

        assert_eq!(settings.window.start, 1_704_067_200_000);
        assert_eq!(settings.window.end, 1_704_153_600_000);
        assert_eq!(settings.block_size, BlockSizeSetting::DurationMs(3_600_000));
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.retry.max_attempts, 5);
        assert!(settings.fail_fast);
        assert!(settings.resume);
        assert_eq!(settings.run_id.as_deref(), Some("nightly"));
        assert_eq!(settings.source.path, PathBuf::from("samples.csv"));
    }

    #[test]
    fn applies_defaults() {
        let settings = MigrationSettings::from_json(
            r#"{
                "window": { "start": 0, "end": 999 },
                "block_size": { "count": 10 },
                "source": { "path": "in.csv" },
                "destination": { "dir": "out" }
            }"#,
        )
        .unwrap();

        assert_eq!(settings.block_size, BlockSizeSetting::Count(10));
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.retry.max_attempts, RetryPolicy::default().max_attempts);
        assert!(!settings.fail_fast);
        assert!(settings.block_timeout_ms.is_none());
        assert!(settings.state_dir.is_none());
    }

    #[test]
    fn rejects_unparseable_timestamp() {
        let err = MigrationSettings::from_json(
            r#"{
                "window": { "start": "last tuesday", "end": 999 },
                "block_size": { "count": 10 },
                "source": { "path": "in.csv" },
                "destination": { "dir": "out" }
            }"#,
        )
        .unwrap_err();

        assert!(matches!(err, SettingsError::Parse(_)));
        assert!(err.to_string().contains("last tuesday"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = MigrationSettings::from_json(
            r#"{
                "window": { "start": 0, "end": 999 },
                "block_size": { "count": 10 },
                "parallelism": 8,
                "source": { "path": "in.csv" },
                "destination": { "dir": "out" }
            }"#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("parallelism"));
    }

    #[test]
    fn reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MigrationSettings::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }
}
