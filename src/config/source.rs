//! Configuration store
//!
//! Durable storage of the raw document. The store does not interpret field
//! values; it only guarantees that what it hands out is a JSON object and
//! that a save replaces the file atomically.

use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::common::fs::{read_file, write_atomic};
use crate::config::document::RawDocument;
use crate::config::error::{Result, StoreError};
use crate::config::identity::FileIdentity;

/// Raw document together with the identity of the bytes it was parsed from
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub raw: RawDocument,
    pub identity: FileIdentity,
}

/// Where the raw configuration document lives
///
/// Saving is split into `encode` and `write` so a caller can learn the
/// identity of the bytes before they become visible on disk.
pub trait ConfigStore: Send + Sync {
    /// Read and parse the document
    fn load(&self) -> Result<LoadedDocument>;

    /// Serialise a document the way `write` will store it
    fn encode(&self, document: &RawDocument) -> Result<Vec<u8>>;

    /// Atomically replace the stored bytes
    fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Location watched for changes and shown in logs
    fn path(&self) -> &Path;

    /// Encode and write, returning the identity of what was written
    fn save(&self, document: &RawDocument) -> Result<FileIdentity> {
        let bytes = self.encode(document)?;
        self.write(&bytes)?;
        Ok(FileIdentity::of_bytes(&bytes))
    }
}

/// JSON file on the local filesystem
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<LoadedDocument> {
        debug!("Loading configuration from file: {}", self.path.display());

        let bytes = read_file(&self.path).map_err(|e| StoreError::from_io(&self.path, e))?;
        let identity = FileIdentity::of_bytes(&bytes);

        let raw = RawDocument::parse(&bytes).map_err(|e| {
            warn!("Error parsing {}: {}", self.path.display(), e);
            StoreError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            }
        })?;

        debug!("Loaded {} top-level keys ({})", raw.as_map().len(), identity);
        Ok(LoadedDocument { raw, identity })
    }

    fn encode(&self, document: &RawDocument) -> Result<Vec<u8>> {
        document.to_pretty_vec().map_err(|e| StoreError::Io {
            path: self.path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.path, bytes).map_err(|e| StoreError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        debug!("Saved configuration to {} ({} bytes)", self.path.display(), bytes.len());
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        let err = store.load().unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_load_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(&path, "[\"proc\"]").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert_eq!(err.kind(), "parse-error");
    }

    #[test]
    fn test_save_then_load_returns_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        let store = JsonFileStore::new(&path);

        let mut doc = RawDocument::new();
        doc.set("Firewall", json!("nftables"));
        doc.set("Unknown.Nested", json!([1, 2]));

        let saved = store.save(&doc).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.identity, saved);
        assert_eq!(loaded.raw, doc);
        assert_eq!(FileIdentity::of_file(&path).unwrap(), saved);
    }
}
