use engine_core::{
    error::ExecutionError,
    retry::{RetryDisposition, classify_execution_error},
};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The file is readable but its content is not a sample table.
    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Invalid series selector '{selector}': {reason}")]
    InvalidSeries { selector: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The blocking task doing the file work panicked.
    #[error("File task failed: {0}")]
    Task(String),

    #[error("Cancelled")]
    Cancelled,
}

impl ConnectorError {
    /// Wraps an I/O error, keeping the path for the cases the operator has
    /// to fix by hand.
    pub fn from_io(err: io::Error, path: &std::path::Path) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ConnectorError::NotFound(path.display().to_string()),
            io::ErrorKind::PermissionDenied => {
                ConnectorError::PermissionDenied(path.display().to_string())
            }
            _ => ConnectorError::Io(err),
        }
    }

    pub fn disposition(&self) -> RetryDisposition {
        classify_execution_error(&ExecutionError::from(self))
    }
}

/// Only interrupted or otherwise flaky I/O is worth another attempt; bad
/// input stays bad.
impl From<&ConnectorError> for ExecutionError {
    fn from(err: &ConnectorError) -> Self {
        match err {
            ConnectorError::Cancelled => ExecutionError::Cancelled,
            ConnectorError::Io(io_err) if is_transient_io(io_err) => {
                ExecutionError::transient(err.to_string())
            }
            ConnectorError::Csv(csv_err) => match csv_err.kind() {
                csv::ErrorKind::Io(io_err) if is_transient_io(io_err) => {
                    ExecutionError::transient(err.to_string())
                }
                _ => ExecutionError::permanent(err.to_string()),
            },
            _ => ExecutionError::permanent(err.to_string()),
        }
    }
}

impl From<ConnectorError> for ExecutionError {
    fn from(err: ConnectorError) -> Self {
        ExecutionError::from(&err)
    }
}

fn is_transient_io(err: &io::Error) -> bool {
    !matches!(
        err.kind(),
        io::ErrorKind::NotFound
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::Unsupported
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn classifies_io_by_kind() {
        let missing = ConnectorError::from_io(
            io::Error::new(io::ErrorKind::NotFound, "gone"),
            Path::new("/data/samples.csv"),
        );
        assert!(matches!(missing, ConnectorError::NotFound(ref p) if p == "/data/samples.csv"));
        assert_eq!(missing.disposition(), RetryDisposition::Stop);

        let interrupted = ConnectorError::from_io(
            io::Error::new(io::ErrorKind::Interrupted, "signal"),
            Path::new("/data/samples.csv"),
        );
        assert_eq!(interrupted.disposition(), RetryDisposition::Retry);
    }

    #[test]
    fn bad_input_is_permanent() {
        let err = ConnectorError::InvalidFormat("missing header".into());
        assert!(matches!(ExecutionError::from(err), ExecutionError::Permanent(_)));
    }

    #[test]
    fn cancellation_passes_through() {
        assert_eq!(
            ExecutionError::from(ConnectorError::Cancelled),
            ExecutionError::Cancelled
        );
    }
}
