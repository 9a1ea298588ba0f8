//! Crash-safe file writes.
//!
//! Content goes to a uniquely named temporary sibling which is then renamed
//! over the target, so readers see either the old file or the new one. The
//! temporary file is removed on every failure path before the error returns.
//!
//! Writers to the same path serialize on an exclusive lock held on a hidden
//! `.<name>.lock` sibling. The lock file stays on disk between writes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fd_lock::RwLock;
use uuid::Uuid;

use crate::document::fingerprint;
use crate::error::{Error, Result};

/// Read a file along with the fingerprint of its content.
pub fn read_with_fingerprint(path: &Path) -> Result<(String, String)> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let hash = fingerprint(&content);
            Ok((content, hash))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(Error::NotFound(path.display().to_string()))
        }
        Err(source) => Err(Error::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Replace `path` with `content` atomically.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let mut lock = open_lock(path)?;
    let _guard = lock.write().map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })?;
    replace(path, content)
}

/// Write only if the file still has the fingerprint the caller read.
///
/// The fingerprint is re-read under the path's write lock, so of several
/// writers holding the same fingerprint exactly one succeeds. Returns the
/// fingerprint of the new content. On mismatch the file is left untouched
/// and [`Error::Conflict`] is returned.
pub fn write_with_expected_fingerprint(
    path: &Path,
    content: &str,
    expected: &str,
) -> Result<String> {
    let mut lock = open_lock(path)?;
    let _guard = lock.write().map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })?;

    let (_, actual) = read_with_fingerprint(path)?;
    if actual != expected {
        tracing::warn!(path = %path.display(), "Rejected write: content changed since read");
        return Err(Error::Conflict {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    replace(path, content)?;
    Ok(fingerprint(content))
}

// Caller holds the path's write lock.
fn replace(path: &Path, content: &str) -> Result<()> {
    let tmp = temp_sibling(path)?;

    if let Err(source) = write_temp(&tmp, content).and_then(|()| fs::rename(&tmp, path)) {
        remove_temp(&tmp);
        return Err(Error::Write {
            path: path.to_path_buf(),
            source,
        });
    }

    sync_parent(path);
    tracing::debug!(path = %path.display(), bytes = content.len(), "Wrote file");
    Ok(())
}

fn open_lock(path: &Path) -> Result<RwLock<File>> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;
    let lock_path = path.with_file_name(format!(".{}.lock", name.to_string_lossy()));
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|source| Error::Write {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(RwLock::new(file))
}

fn temp_sibling(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;
    let tmp_name = format!(
        ".{}.{}.tmp",
        name.to_string_lossy(),
        Uuid::new_v4().simple()
    );
    Ok(path.with_file_name(tmp_name))
}

fn write_temp(tmp: &Path, content: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(tmp)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()
}

fn remove_temp(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %tmp.display(), "Failed to remove temp file: {}", e);
        }
    }
}

// Makes the rename durable on filesystems that need it; failure is not an error.
fn sync_parent(path: &Path) {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Ok(handle) = File::open(dir) {
            let _ = handle.sync_all();
        }
    }
}
