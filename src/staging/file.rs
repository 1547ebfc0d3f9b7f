//! The staging file handle and its lifecycle operations.

use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::os::fd::{AsRawFd, IntoRawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use super::registry::{self, Record};
use crate::error::{Result, StagingError};
use crate::fs::{SharedRepository, adjust_shared_perm, fill_template};

/// Attempts made to find an unused name for a templated staging file.
const TEMPLATE_ATTEMPTS: usize = 100;

/// Where a staging file is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingState {
    /// No artifact on disk: never created, or already finalized or deleted.
    Inactive,
    /// The artifact exists and belongs to this handle.
    Active,
    /// The descriptor was released; the artifact is still on disk.
    Closed,
}

#[derive(Debug, Default)]
enum Descriptor {
    #[default]
    None,
    Raw(File),
    Buffered(BufWriter<File>),
}

/// A file created exclusively, registered for removal if the process dies
/// before it is finalized.
///
/// The handle can be reused: after [`finalize_rename`](Self::finalize_rename)
/// or [`delete`](Self::delete) it may be passed to another creation call.
/// Dropping a handle deletes any artifact it still owns.
#[derive(Debug)]
pub struct StagingFile {
    record: Option<&'static Record>,
    path: Option<PathBuf>,
    state: StagingState,
    descriptor: Descriptor,
    shared: SharedRepository,
    fsync: bool,
}

impl Default for StagingFile {
    fn default() -> Self {
        Self::new()
    }
}

impl StagingFile {
    /// A fresh, unregistered handle.
    pub fn new() -> Self {
        Self {
            record: None,
            path: None,
            state: StagingState::Inactive,
            descriptor: Descriptor::None,
            shared: SharedRepository::Umask,
            fsync: false,
        }
    }

    /// A handle that applies `shared` permission bits to files it creates.
    pub fn with_shared_repository(shared: SharedRepository) -> Self {
        let mut file = Self::new();
        file.shared = shared;
        file
    }

    /// Sync file contents to disk whenever the descriptor is closed.
    pub fn set_fsync(&mut self, fsync: bool) {
        self.fsync = fsync;
    }

    /// Current lifecycle state.
    ///
    /// Reports [`StagingState::Inactive`] once the cleanup sweep has removed
    /// the artifact, even if this handle never saw it happen.
    pub fn state(&self) -> StagingState {
        match self.record {
            Some(record) if record.is_active() => self.state,
            _ => StagingState::Inactive,
        }
    }

    /// Whether the artifact exists and belongs to this handle.
    pub fn is_active(&self) -> bool {
        self.state() != StagingState::Inactive
    }

    /// Whether this handle has a record in the process registry.
    pub fn is_registered(&self) -> bool {
        self.record.is_some()
    }

    /// Absolute path of the artifact, while there is one.
    pub fn path(&self) -> Option<&Path> {
        if self.is_active() {
            self.path.as_deref()
        } else {
            None
        }
    }

    /// The raw descriptor, unless it is closed or wrapped by
    /// [`open_buffered`](Self::open_buffered).
    pub fn file(&mut self) -> Option<&mut File> {
        self.forget_swept_descriptor();
        match &mut self.descriptor {
            Descriptor::Raw(file) => Some(file),
            _ => None,
        }
    }

    /// Whether a descriptor (raw or buffered) is open.
    pub fn has_descriptor(&self) -> bool {
        !matches!(self.descriptor, Descriptor::None) && self.record.is_some_and(Record::is_active)
    }

    /// Link this handle into the registry for a new creation cycle.
    ///
    /// # Panics
    ///
    /// If the handle is still active, or still carries a path from a cycle
    /// that was never finalized or deleted.
    fn register(&mut self, path: &Path) -> &'static Record {
        self.forget_swept_artifact();
        match self.record {
            Some(record) if record.is_active() => panic!(
                "BUG: cannot create staging file '{}' using an active object",
                path.display()
            ),
            Some(record) if record.has_path() || self.path.is_some() => panic!(
                "BUG: staging file '{}' created with an improperly reset object",
                path.display()
            ),
            Some(record) => record,
            None => {
                let record = registry::claim();
                self.record = Some(record);
                self.state = StagingState::Inactive;
                self.descriptor = Descriptor::None;
                record
            }
        }
    }

    /// Create `path` exclusively and take ownership of it.
    ///
    /// Fails with `AlreadyExists` if the path is taken. If the shared
    /// permission bits cannot be applied, the new file is deleted again and
    /// the permission error is returned.
    pub fn create(&mut self, path: impl AsRef<Path>) -> Result<&mut File> {
        let path = path.as_ref();
        let record = self.register(path);
        let absolute = absolute_path(path)?;
        let c_path = c_path(&absolute)?;

        let file = open_exclusive(&absolute).map_err(|source| StagingError::Create {
            path: absolute.clone(),
            source,
        })?;
        self.activate(record, absolute, c_path, file);
        self.normalize_permissions()?;
        Ok(self.raw_file_after_open())
    }

    /// Create a uniquely named file from `template`.
    ///
    /// The six bytes before the last `suffix_len` bytes of the template must
    /// be `XXXXXX`; they are replaced with random characters until an unused
    /// name is found.
    pub fn create_unique(
        &mut self,
        template: impl AsRef<Path>,
        suffix_len: usize,
    ) -> Result<&mut File> {
        let template = template.as_ref();
        let record = self.register(template);
        let absolute = absolute_path(template)?;
        c_path(&absolute)?;

        let mut rng = rand::rng();
        let mut last_error = None;
        for _ in 0..TEMPLATE_ATTEMPTS {
            let candidate = fill_template(&absolute, suffix_len, &mut rng).map_err(|source| {
                StagingError::Create {
                    path: absolute.clone(),
                    source,
                }
            })?;
            match open_exclusive(&candidate) {
                Ok(file) => {
                    let c_path = c_path(&candidate)?;
                    self.activate(record, candidate, c_path, file);
                    return Ok(self.raw_file_after_open());
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => last_error = Some(e),
                Err(source) => {
                    return Err(StagingError::Create {
                        path: candidate,
                        source,
                    });
                }
            }
        }
        Err(StagingError::Create {
            path: absolute,
            source: last_error.unwrap_or_else(|| io::Error::from(io::ErrorKind::AlreadyExists)),
        })
    }

    /// Like [`create_unique`](Self::create_unique), with the template taken
    /// relative to `$TMPDIR` (or `/tmp`).
    pub fn create_unique_in_tmpdir(
        &mut self,
        template: impl AsRef<Path>,
        suffix_len: usize,
    ) -> Result<&mut File> {
        let tmpdir = std::env::var_os("TMPDIR")
            .filter(|dir| !dir.is_empty())
            .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
        self.create_unique(tmpdir.join(template), suffix_len)
    }

    /// Take cleanup ownership of a file that already exists at `path`.
    ///
    /// No descriptor is opened; use [`reopen`](Self::reopen) to write to it.
    pub fn register_existing(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let record = self.register(path);
        let absolute = absolute_path(path)?;
        let c_path = c_path(&absolute)?;
        debug!(path = %absolute.display(), "registered existing staging file");
        record.activate(c_path, -1);
        self.path = Some(absolute);
        self.state = StagingState::Active;
        self.descriptor = Descriptor::None;
        Ok(())
    }

    /// Wrap the open descriptor in a buffered writer.
    ///
    /// # Panics
    ///
    /// If the handle is not active, if a buffered writer already exists, or
    /// if the descriptor has been closed.
    pub fn open_buffered(&mut self) -> &mut BufWriter<File> {
        self.forget_swept_descriptor();
        if self.state() != StagingState::Active {
            panic!("BUG: open_buffered() called for an inactive staging file");
        }
        match &self.descriptor {
            Descriptor::Raw(_) => {}
            Descriptor::Buffered(_) => panic!(
                "BUG: open_buffered() called twice for '{}'",
                self.display_path()
            ),
            Descriptor::None => panic!(
                "BUG: open_buffered() called for '{}' without an open descriptor",
                self.display_path()
            ),
        }
        if let Descriptor::Raw(file) = std::mem::take(&mut self.descriptor) {
            self.descriptor = Descriptor::Buffered(BufWriter::new(file));
        }
        match &mut self.descriptor {
            Descriptor::Buffered(writer) => writer,
            _ => unreachable!(),
        }
    }

    /// Release the descriptor, keeping the file on disk.
    ///
    /// A no-op if no descriptor is open. If flushing or closing fails the
    /// staging file is deleted and the original error is returned.
    pub fn close(&mut self) -> Result<()> {
        self.forget_swept_descriptor();
        let descriptor = std::mem::take(&mut self.descriptor);
        let result = match descriptor {
            Descriptor::None => return Ok(()),
            Descriptor::Raw(file) => self.sync_and_close(file),
            Descriptor::Buffered(mut writer) => {
                let flushed = writer.flush();
                let (file, _) = writer.into_parts();
                let closed = self.sync_and_close(file);
                flushed.and(closed)
            }
        };

        match result {
            Ok(()) => {
                if self.state() != StagingState::Inactive {
                    self.state = StagingState::Closed;
                }
                Ok(())
            }
            Err(source) => {
                let path = self.path.clone().unwrap_or_default();
                error!(path = %path.display(), error = %source, "failed to close staging file");
                let cleanup = self.discard();
                Err(StagingError::Close {
                    path,
                    source,
                    cleanup,
                })
            }
        }
    }

    /// Open the staging file for writing again after [`close`](Self::close).
    ///
    /// # Panics
    ///
    /// If a descriptor is still open, or the handle is inactive.
    pub fn reopen(&mut self) -> Result<&mut File> {
        if self.has_descriptor() {
            panic!(
                "BUG: reopen a staging file that is still open: '{}'",
                self.display_path()
            );
        }
        let (Some(record), Some(path)) = (self.record, self.path.clone()) else {
            panic!("BUG: reopen a staging file that has been removed");
        };
        if !record.is_active() {
            panic!("BUG: reopen a staging file that has been removed");
        }

        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|source| StagingError::Reopen { path, source })?;
        record.set_fd(file.as_raw_fd());
        self.descriptor = Descriptor::Raw(file);
        self.state = StagingState::Active;
        Ok(self.raw_file_after_open())
    }

    /// Close the staging file and atomically rename it to `destination`.
    ///
    /// On failure the staging file has been deleted and the error from the
    /// close or the rename is returned. On success the handle owns nothing
    /// on disk and may be reused.
    ///
    /// # Panics
    ///
    /// If the handle is inactive.
    pub fn finalize_rename(&mut self, destination: impl AsRef<Path>) -> Result<()> {
        let destination = destination.as_ref();
        if self.state() == StagingState::Inactive {
            panic!(
                "BUG: attempt to rename inactive staging file to '{}'",
                destination.display()
            );
        }

        self.close()?;

        let from = self.path.clone().unwrap_or_default();
        if let Err(source) = fs::rename(&from, destination) {
            error!(
                from = %from.display(),
                to = %destination.display(),
                error = %source,
                "failed to publish staging file"
            );
            let cleanup = self.discard();
            return Err(StagingError::Rename {
                from,
                to: destination.to_path_buf(),
                source,
                cleanup,
            });
        }

        debug!(from = %from.display(), to = %destination.display(), "published staging file");
        self.deactivate();
        Ok(())
    }

    /// Close and remove the staging file. A no-op when inactive.
    ///
    /// Never fails: close errors are ignored and a file that is already gone
    /// is not an error.
    pub fn delete(&mut self) {
        if self.state() == StagingState::Inactive {
            self.release_descriptor_quietly();
            return;
        }
        let path = self.display_path();
        if let Some(e) = self.discard() {
            warn!(path = %path, error = %e, "could not remove staging file");
        }
    }

    /// Drop local state for an artifact the cleanup sweep already removed.
    fn forget_swept_artifact(&mut self) {
        if self.record.is_some() && self.state() == StagingState::Inactive {
            self.release_descriptor_quietly();
            self.path = None;
            self.state = StagingState::Inactive;
        }
    }

    /// Let go of a descriptor the cleanup sweep has already closed. Its
    /// number may since have been reused for an unrelated file, so it must
    /// be neither written to nor closed again.
    fn forget_swept_descriptor(&mut self) {
        if !self.record.is_some_and(Record::is_active) {
            self.release_descriptor_quietly();
        }
    }

    fn activate(&mut self, record: &'static Record, path: PathBuf, c_path: CString, file: File) {
        debug!(path = %path.display(), "created staging file");
        record.activate(c_path, file.as_raw_fd());
        self.path = Some(path);
        self.state = StagingState::Active;
        self.descriptor = Descriptor::Raw(file);
    }

    fn normalize_permissions(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if let Err(source) = adjust_shared_perm(&path, self.shared) {
            error!(path = %path.display(), "cannot fix permission bits");
            self.delete();
            return Err(StagingError::Permissions { path, source });
        }
        Ok(())
    }

    fn raw_file_after_open(&mut self) -> &mut File {
        match &mut self.descriptor {
            Descriptor::Raw(file) => file,
            _ => unreachable!("descriptor was just opened"),
        }
    }

    fn sync_and_close(&self, file: File) -> io::Result<()> {
        let synced = if self.fsync { file.sync_all() } else { Ok(()) };
        synced.and(self.close_raw(file))
    }

    /// Close `file` unless the cleanup sweep already closed it.
    fn close_raw(&self, file: File) -> io::Result<()> {
        let fd = file.into_raw_fd();
        let owned = self.record.is_some_and(|record| record.take_fd() == fd);
        if !owned {
            return Ok(());
        }
        // SAFETY: `fd` came from `into_raw_fd` and is closed exactly once.
        if unsafe { libc::close(fd) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn release_descriptor_quietly(&mut self) {
        match std::mem::take(&mut self.descriptor) {
            Descriptor::None => {}
            Descriptor::Raw(file) => {
                let _ = self.close_raw(file);
            }
            Descriptor::Buffered(writer) => {
                let (file, _) = writer.into_parts();
                let _ = self.close_raw(file);
            }
        }
    }

    /// Best-effort removal. Returns the unlink error, if any, so callers can
    /// report it alongside their primary error.
    fn discard(&mut self) -> Option<io::Error> {
        self.release_descriptor_quietly();
        let cleanup = match self.path.as_deref().map(fs::remove_file) {
            Some(Err(e)) if e.kind() != io::ErrorKind::NotFound => Some(e),
            _ => None,
        };
        self.deactivate();
        cleanup
    }

    fn deactivate(&mut self) {
        if let Some(record) = self.record {
            record.deactivate();
        }
        self.path = None;
        self.state = StagingState::Inactive;
    }

    #[cfg(test)]
    pub(crate) fn record(&self) -> Option<&'static Record> {
        self.record
    }

    fn display_path(&self) -> String {
        self.path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }
}

impl Write for StagingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.forget_swept_descriptor();
        match &mut self.descriptor {
            Descriptor::Raw(file) => file.write(buf),
            Descriptor::Buffered(writer) => writer.write(buf),
            Descriptor::None => Err(not_open()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.forget_swept_descriptor();
        match &mut self.descriptor {
            Descriptor::Raw(file) => file.flush(),
            Descriptor::Buffered(writer) => writer.flush(),
            Descriptor::None => Err(not_open()),
        }
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        let Some(record) = self.record else {
            return;
        };
        if record.is_active() && !record.is_owned_by_current_process() {
            // Inherited across fork: the file belongs to the parent.
            self.release_descriptor_quietly();
            return;
        }
        self.delete();
        record.release();
    }
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "staging file is not open")
}

fn open_exclusive(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .mode(0o666)
        .open(path)
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|source| StagingError::Create {
        path: path.to_path_buf(),
        source,
    })
}

fn c_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| StagingError::Create {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"),
    })
}
