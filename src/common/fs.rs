//! Filesystem helpers
//!
//! Reading whole files and replacing them atomically, so that a concurrent
//! reader (the configuration watcher) never observes a truncated document.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Read the whole file into memory
pub fn read_file(path: &Path) -> io::Result<Vec<u8>> {
    fs::read(path)
}

/// Replace `path` with `contents` atomically
///
/// The data is written to a temporary file in the same directory, flushed to
/// disk, then renamed over the destination. Permissions of an existing
/// destination are carried over to the new file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".policyd-")
        .suffix(".tmp")
        .tempfile_in(dir)?;

    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    if let Ok(metadata) = fs::metadata(path) {
        tmp.as_file().set_permissions(metadata.permissions())?;
    }

    tmp.persist(path).map_err(|e| e.error)?;

    // Best effort: make the rename itself durable.
    if let Ok(dir_handle) = fs::File::open(dir) {
        let _ = dir_handle.sync_all();
    }

    Ok(())
}
