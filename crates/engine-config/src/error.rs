use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating a migration configuration file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    /// One entry per rejected setting.
    #[error("Invalid settings: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    /// No explicit `state_dir` and no home directory to default to.
    #[error("Could not determine home directory for the default state dir")]
    MissingHomeDir,
}
