//! Configuration store errors
//!
//! Only durable I/O can fail. Invalid field values never surface here: they
//! are substituted by the validator and recorded as fallbacks.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error returned by a [`ConfigStore`](crate::config::ConfigStore)
#[derive(Error, Debug)]
pub enum StoreError {
    /// The configuration file does not exist
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but is not a well-formed JSON object
    #[error("Error parsing configuration file {}: {message}", path.display())]
    Parse {
        /// File that failed to parse
        path: PathBuf,
        /// Parser diagnostic
        message: String,
    },

    /// Reading, writing or renaming the file failed
    #[error("I/O error on configuration file {}: {source}", path.display())]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Map an I/O error for `path`, turning `NotFound` into [`StoreError::NotFound`]
    pub fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(path),
            _ => StoreError::Io { path, source: err },
        }
    }

    /// Short name of the failure class, used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not-found",
            StoreError::Parse { .. } => "parse-error",
            StoreError::Io { .. } => "io-error",
        }
    }
}

/// Result type alias for configuration store operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_maps_not_found() {
        let err = StoreError::from_io("/etc/policyd/x.json", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = StoreError::from_io("/etc/policyd/x.json", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(err.to_string().contains("/etc/policyd/x.json"));
        assert_eq!(err.kind(), "io-error");
    }
}
