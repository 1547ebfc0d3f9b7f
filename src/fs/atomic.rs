//! Atomic whole-file writes.
//!
//! Content is written into `<path>.lock`, synced to disk and renamed over
//! `path`. Readers see either the old file or the new one. While the write is
//! in flight the lockfile also keeps other writers out, and it is removed by
//! the staging cleanup hooks if the process dies half way.
//!
//! Source and destination share a directory, so the rename never crosses a
//! filesystem.

use crate::error::{Result, StagingError};
use crate::locks::{LockFile, LockFlags, LockTimeout};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Atomically replace the contents of `path` with `content`.
///
/// Fails with [`StagingError::Locked`] if another writer holds the lockfile.
///
/// # Example
///
/// ```no_run
/// use stagelock::fs::atomic_write;
/// use std::path::Path;
///
/// atomic_write(Path::new("config.yaml"), b"key: value\n")?;
/// # Ok::<(), stagelock::error::StagingError>(())
/// ```
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    atomic_write_with(path, content, LockTimeout::Immediate)
}

/// Like [`atomic_write`], waiting up to `timeout` for a competing writer.
pub fn atomic_write_with<P: AsRef<Path>>(
    path: P,
    content: &[u8],
    timeout: LockTimeout,
) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| StagingError::Io {
            context: format!("failed to create parent directory '{}'", parent.display()),
            source: e,
        })?;
    }

    let mut lock = LockFile::new();
    lock.acquire(path, LockFlags::SYNC, timeout)?;

    if let Err(e) = lock.write_all(content) {
        lock.rollback();
        return Err(StagingError::Io {
            context: format!("failed to write to lockfile for '{}'", path.display()),
            source: e,
        });
    }

    lock.commit()
}

/// Atomically write a string to a file.
///
/// Convenience wrapper around `atomic_write` for string content.
pub fn atomic_write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}
