//! The exclusive-update controller.

use super::backoff::retry_with_backoff;
use super::message::{die, unable_to_lock_die};
use super::operations::{copy_destination, create_lockfile, lock_target};
use super::types::{LockFlags, LockTimeout};
use crate::error::{Result, StagingError};
use crate::fs::{SharedRepository, strip_lock_suffix};
use crate::staging::{StagingFile, StagingState};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A lock on a destination file, held by creating `<destination>.lock`.
///
/// New content is written into the lockfile and published with
/// [`commit`](Self::commit), which renames it over the destination. Readers
/// of the destination never see a partial write. [`rollback`](Self::rollback)
/// discards the lockfile instead.
///
/// A `LockFile` may be reused for another lock after a commit or rollback.
/// If the process exits or is killed while the lock is held, the lockfile is
/// removed by the staging cleanup hooks; dropping the `LockFile` rolls back.
#[derive(Debug, Default)]
pub struct LockFile {
    staging: StagingFile,
    flags: LockFlags,
}

impl LockFile {
    /// An unlocked controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// An unlocked controller whose lockfiles get `shared` permission bits.
    pub fn with_shared_repository(shared: SharedRepository) -> Self {
        Self {
            staging: StagingFile::with_shared_repository(shared),
            flags: LockFlags::NONE,
        }
    }

    /// Lock `path` for update and return the lockfile descriptor.
    ///
    /// If the lock is held by someone else, retry with quadratic backoff
    /// until `timeout` expires. Failures other than contention are returned
    /// immediately. With [`LockFlags::DIE_ON_ERROR`] a failure terminates the
    /// process instead.
    pub fn acquire(
        &mut self,
        path: impl AsRef<Path>,
        flags: LockFlags,
        timeout: impl Into<LockTimeout>,
    ) -> Result<&mut File> {
        let path = path.as_ref();
        let timeout = timeout.into();
        let target = self.target_or_die(path, flags)?;

        let staging = &mut self.staging;
        if let Err(source) = retry_with_backoff(timeout, || create_lockfile(staging, &target)) {
            return Err(self.lock_failure(&target, source, flags));
        }

        self.locked(&target, flags, timeout);
        self.descriptor()
    }

    /// Lock `path` and pre-populate the lockfile with the current contents
    /// of `path`, positioned at the end so that writes append.
    ///
    /// There is no retry: a held lock fails immediately.
    pub fn acquire_for_append(&mut self, path: impl AsRef<Path>, flags: LockFlags) -> Result<&mut File> {
        let path = path.as_ref();
        let target = self.target_or_die(path, flags)?;

        if let Err(source) = create_lockfile(&mut self.staging, &target) {
            return Err(self.lock_failure(&target, source, flags));
        }

        if let Err(source) = copy_destination(&mut self.staging, &target) {
            self.staging.delete();
            let err = StagingError::AppendCopy {
                path: target,
                source,
            };
            if flags.contains(LockFlags::DIE_ON_ERROR) {
                die(&err.to_string());
            }
            return Err(err);
        }

        self.locked(&target, flags, LockTimeout::Immediate);
        self.descriptor()
    }

    /// Publish the lockfile by renaming it over the locked destination.
    ///
    /// On failure the lockfile has been removed and the error from the close
    /// or rename is returned.
    ///
    /// # Panics
    ///
    /// If the lock is not held.
    pub fn commit(&mut self) -> Result<()> {
        let destination = self.locked_path();
        self.commit_to(destination)
    }

    /// Publish the lockfile by renaming it to `path`, which must be on the
    /// same filesystem as the lockfile.
    ///
    /// # Panics
    ///
    /// If the lock is not held.
    pub fn commit_to(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !self.is_locked() {
            panic!("BUG: commit of unlocked lockfile to '{}'", path.display());
        }
        self.staging.finalize_rename(path)?;
        if self.flags.contains(LockFlags::SYNC) {
            sync_parent_dir(path);
        }
        info!(path = %path.display(), "committed lockfile");
        Ok(())
    }

    /// Discard the lockfile. A no-op if the lock is not held.
    pub fn rollback(&mut self) {
        if self.is_locked() {
            debug!(path = %self.locked_path().display(), "rolling back lockfile");
        }
        self.staging.delete();
    }

    /// Whether the lockfile exists and belongs to this controller.
    pub fn is_locked(&self) -> bool {
        self.staging.is_active()
    }

    /// The destination being locked (the lockfile path without `.lock`).
    ///
    /// # Panics
    ///
    /// If the lock is not held.
    pub fn locked_path(&self) -> PathBuf {
        let Some(lock_path) = self.staging.path() else {
            panic!("BUG: locked_path() called for unlocked object");
        };
        match strip_lock_suffix(lock_path) {
            Some(path) => path,
            None => panic!(
                "BUG: lockfile '{}' does not end in .lock",
                lock_path.display()
            ),
        }
    }

    /// Path of the lockfile itself, while the lock is held.
    pub fn lock_path(&self) -> Option<&Path> {
        self.staging.path()
    }

    /// The underlying staging file, for closing, reopening or buffering.
    pub fn staging(&mut self) -> &mut StagingFile {
        &mut self.staging
    }

    /// State of the underlying staging file.
    pub fn state(&self) -> StagingState {
        self.staging.state()
    }

    fn target_or_die(&self, path: &Path, flags: LockFlags) -> Result<PathBuf> {
        match lock_target(path, flags) {
            Ok(target) => Ok(target),
            Err(StagingError::Locked { source, .. }) if flags.contains(LockFlags::DIE_ON_ERROR) => {
                unable_to_lock_die(path, &source)
            }
            Err(e) => Err(e),
        }
    }

    fn lock_failure(&self, target: &Path, source: io::Error, flags: LockFlags) -> StagingError {
        if flags.contains(LockFlags::DIE_ON_ERROR) {
            unable_to_lock_die(target, &source);
        }
        debug!(path = %target.display(), error = %source, "failed to acquire lock");
        StagingError::Locked {
            path: target.to_path_buf(),
            source,
        }
    }

    fn locked(&mut self, target: &Path, flags: LockFlags, timeout: LockTimeout) {
        self.flags = flags;
        self.staging.set_fsync(flags.contains(LockFlags::SYNC));
        debug!(path = %target.display(), %timeout, "acquired lock");
    }

    fn descriptor(&mut self) -> Result<&mut File> {
        let lock_path = self.staging.path().map(Path::to_path_buf).unwrap_or_default();
        self.staging.file().ok_or_else(|| StagingError::Io {
            context: format!("lockfile '{}' is not open", lock_path.display()),
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        })
    }
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.staging.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.staging.flush()
    }
}

/// Persist the directory entry created by a rename. Best effort.
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        })
    {
        let _ = dir.sync_all();
    }
}
