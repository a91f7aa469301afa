//! File identity tracking
//!
//! A file is identified by its length and a SHA-256 digest of its bytes.
//! Modification times are deliberately not part of the identity: rewriting
//! a file with identical content must not look like a change.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::common::fs::read_file;

/// Content identity of the configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    len: u64,
    digest: [u8; 32],
}

impl FileIdentity {
    /// Identity of an in-memory byte buffer
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest: [u8; 32] = Sha256::digest(bytes).into();
        Self { len: bytes.len() as u64, digest }
    }

    /// Identity of the file currently at `path`
    pub fn of_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        read_file(path.as_ref()).map(|bytes| Self::of_bytes(&bytes))
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}b/", self.len)?;
        for byte in &self.digest[..6] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Notification that the file settled on new content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub timestamp: DateTime<Utc>,
    pub identity: FileIdentity,
}

impl WatchEvent {
    pub fn new(identity: FileIdentity) -> Self {
        Self { timestamp: Utc::now(), identity }
    }
}

/// Last identity the daemon has seen or written
///
/// Shared between the watcher and the reload pipeline. The pipeline records
/// the identity of every document it saves, so the watcher can tell the
/// daemon's own writes apart from external edits.
#[derive(Debug, Clone, Default)]
pub struct IdentityBaseline {
    inner: Arc<Mutex<Option<FileIdentity>>>,
}

impl IdentityBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, identity: FileIdentity) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(identity);
    }

    pub fn current(&self) -> Option<FileIdentity> {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True when `identity` is the one last recorded
    pub fn matches(&self, identity: &FileIdentity) -> bool {
        self.current().as_ref() == Some(identity)
    }
}
