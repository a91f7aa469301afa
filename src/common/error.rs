//! Error handling module
//!
//! This module defines the crate-level error type and result alias. The
//! configuration store and the downstream subsystems have their own, more
//! precise error types which convert into [`PolicyError`].

use thiserror::Error;
use std::io;

use crate::config::StoreError;
use crate::subsystems::DownstreamError;

/// Policy daemon error type
#[derive(Error, Debug)]
pub enum PolicyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration store error (missing file, malformed document, failed write)
    #[error("Configuration store error: {0}")]
    Store(#[from] StoreError),

    /// A downstream subsystem failed to converge on a new setting
    #[error("Downstream convergence error: {0}")]
    Downstream(#[from] DownstreamError),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

impl From<notify::Error> for PolicyError {
    fn from(err: notify::Error) -> Self {
        PolicyError::Watcher(err.to_string())
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `PolicyError`.
pub type Result<T> = std::result::Result<T, PolicyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let policy_err: PolicyError = io_err.into();

        match policy_err {
            PolicyError::Io(_) => {}
            _ => panic!("Should convert to IO error"),
        }

        let store_err = StoreError::NotFound(PathBuf::from("/nonexistent.json"));
        let policy_err: PolicyError = store_err.into();
        assert!(matches!(policy_err, PolicyError::Store(StoreError::NotFound(_))));
    }

    #[test]
    fn test_error_display() {
        let err = PolicyError::Config("Invalid socket address".to_string());
        let err_str = format!("{}", err);
        assert!(err_str.contains("Invalid socket address"));

        let err: PolicyError = DownstreamError::new("firewall", "nft binary missing").into();
        assert!(err.to_string().contains("firewall"));
        assert!(err.to_string().contains("nft binary missing"));
    }
}
