//! Lockfile creation and append-mode pre-population.

use super::types::LockFlags;
use crate::error::{Result, StagingError};
use crate::fs::{lock_path_for, resolve_symlink};
use crate::staging::StagingFile;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The file a lock on `path` actually protects.
pub(super) fn lock_target(path: &Path, flags: LockFlags) -> Result<PathBuf> {
    let absolute = std::path::absolute(path).map_err(|source| StagingError::Locked {
        path: path.to_path_buf(),
        source,
    })?;
    if flags.contains(LockFlags::NO_DEREF) {
        Ok(absolute)
    } else {
        Ok(resolve_symlink(&absolute))
    }
}

/// Try once to create the lockfile for `target`.
///
/// Returns the raw `io::Error` so the caller can decide whether to retry.
pub(super) fn create_lockfile(staging: &mut StagingFile, target: &Path) -> io::Result<()> {
    match staging.create(lock_path_for(target)) {
        Ok(_) => Ok(()),
        Err(StagingError::Create { source, .. } | StagingError::Permissions { source, .. }) => {
            Err(source)
        }
        Err(other) => Err(io::Error::other(other.to_string())),
    }
}

/// Copy the current contents of `target` (if any) into the lockfile.
///
/// The lockfile's write position ends up after the copied bytes.
pub(super) fn copy_destination(staging: &mut StagingFile, target: &Path) -> io::Result<u64> {
    let mut source = match File::open(target) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let Some(lockfile) = staging.file() else {
        return Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "lockfile has no open descriptor",
        ));
    };
    let copied = io::copy(&mut source, lockfile)?;
    debug!(path = %target.display(), bytes = copied, "copied destination into lockfile");
    Ok(copied)
}
