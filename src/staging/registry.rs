//! Process-wide registry of staging files.
//!
//! Every [`StagingFile`](super::StagingFile) that has ever been created owns
//! a [`Record`] in an append-only arena. Records are never freed; when a
//! handle is dropped its record is released and later handed out again.
//!
//! The first registration installs two hooks: an `atexit(3)` handler and a
//! handler for the common fatal signals. Both run [`sweep`], which deletes
//! every still-active staging file whose owner is the current process. The
//! sweep touches only atomics, raw descriptors and preallocated C strings, so
//! it is safe to run from a signal handler.

use std::ffi::{CString, c_char};
use std::ptr;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicPtr, Ordering};

use libc::c_int;

use super::sigchain;

/// Which context the sweep is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SweepMode {
    /// Normal process exit; heap memory may be released.
    Exit,
    /// Inside a signal handler; nothing may allocate or free.
    Signal,
}

/// Lifecycle state for one staging file, shared with the cleanup hooks.
#[derive(Debug)]
pub(crate) struct Record {
    /// Held by a live `StagingFile` handle.
    claimed: AtomicBool,
    /// The staging artifact exists on disk and belongs to `owner`.
    active: AtomicBool,
    owner: AtomicI32,
    fd: AtomicI32,
    path: AtomicPtr<c_char>,
    next: AtomicPtr<Record>,
}

impl Record {
    fn new() -> Self {
        Self {
            claimed: AtomicBool::new(true),
            active: AtomicBool::new(false),
            owner: AtomicI32::new(0),
            fd: AtomicI32::new(-1),
            path: AtomicPtr::new(ptr::null_mut()),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Whether a path is still attached (leftover state from a use that was
    /// never finalized or deleted).
    pub(crate) fn has_path(&self) -> bool {
        !self.path.load(Ordering::Acquire).is_null()
    }

    pub(crate) fn owner(&self) -> libc::pid_t {
        self.owner.load(Ordering::Acquire)
    }

    pub(crate) fn is_owned_by_current_process(&self) -> bool {
        self.owner() == current_pid()
    }

    /// Mark the record active for `path`, owned by this process.
    pub(crate) fn activate(&self, path: CString, fd: c_int) {
        self.replace_path(path.into_raw());
        self.fd.store(fd, Ordering::Release);
        self.owner.store(current_pid(), Ordering::Release);
        self.active.store(true, Ordering::Release);
    }

    pub(crate) fn set_fd(&self, fd: c_int) {
        self.fd.store(fd, Ordering::Release);
    }

    /// Detach the descriptor from the record. Returns -1 if the sweep
    /// already closed it.
    pub(crate) fn take_fd(&self) -> c_int {
        self.fd.swap(-1, Ordering::AcqRel)
    }

    /// Return the record to the inactive state and drop its path.
    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        self.fd.store(-1, Ordering::Release);
        self.replace_path(ptr::null_mut());
    }

    pub(crate) fn release(&self) {
        self.claimed.store(false, Ordering::Release);
    }

    fn replace_path(&self, new: *mut c_char) {
        let old = self.path.swap(new, Ordering::AcqRel);
        if !old.is_null() {
            // SAFETY: every non-null pointer stored in `path` came from
            // `CString::into_raw` and is swapped out exactly once.
            drop(unsafe { CString::from_raw(old) });
        }
    }

    /// Forcibly close and unlink the staging artifact.
    fn force_delete(&self, mode: SweepMode) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let fd = self.take_fd();
        if fd >= 0 {
            // SAFETY: the descriptor belongs to this record; the owning
            // handle checks `take_fd` before closing it again.
            unsafe { libc::close(fd) };
        }
        let path = match mode {
            SweepMode::Exit => self.path.load(Ordering::Acquire),
            // Leave the allocation in place; freeing is not signal-safe.
            SweepMode::Signal => self.path.swap(ptr::null_mut(), Ordering::AcqRel),
        };
        if !path.is_null() {
            // SAFETY: `path` is a NUL-terminated string owned by the record.
            unsafe { libc::unlink(path) };
        }
        if mode == SweepMode::Exit {
            self.replace_path(ptr::null_mut());
        }
    }

    #[cfg(test)]
    pub(crate) fn set_owner(&self, pid: libc::pid_t) {
        self.owner.store(pid, Ordering::Release);
    }
}

static HEAD: AtomicPtr<Record> = AtomicPtr::new(ptr::null_mut());
static HOOKS: Once = Once::new();

fn current_pid() -> libc::pid_t {
    // SAFETY: getpid has no preconditions and is async-signal-safe.
    unsafe { libc::getpid() }
}

extern "C" fn remove_on_exit() {
    sweep(SweepMode::Exit);
}

extern "C" fn remove_on_signal(signo: c_int) {
    sweep(SweepMode::Signal);
    sigchain::pop(signo);
    // SAFETY: raise is async-signal-safe. The signal stays blocked until this
    // handler returns, then the restored action handles it.
    unsafe { libc::raise(signo) };
}

fn install_hooks() {
    HOOKS.call_once(|| {
        let installed = sigchain::push_common(remove_on_signal);
        // SAFETY: `remove_on_exit` is a plain extern "C" fn that never unwinds.
        if unsafe { libc::atexit(remove_on_exit) } != 0 {
            tracing::warn!("could not register staging file cleanup at exit");
        }
        tracing::debug!(signals = installed, "installed staging file cleanup hooks");
    });
}

fn records() -> impl Iterator<Item = &'static Record> {
    let mut cursor = HEAD.load(Ordering::Acquire);
    std::iter::from_fn(move || {
        // SAFETY: records are leaked boxes and are never freed.
        let record = unsafe { cursor.as_ref() }?;
        cursor = record.next.load(Ordering::Acquire);
        Some(record)
    })
}

/// Hand out a clean, unclaimed record, installing the cleanup hooks on the
/// first call in the process.
pub(crate) fn claim() -> &'static Record {
    install_hooks();

    for record in records() {
        if record
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            record.deactivate();
            record.owner.store(0, Ordering::Release);
            return record;
        }
    }

    let record: &'static Record = Box::leak(Box::new(Record::new()));
    let new = ptr::from_ref(record).cast_mut();
    let mut head = HEAD.load(Ordering::Acquire);
    loop {
        record.next.store(head, Ordering::Release);
        match HEAD.compare_exchange_weak(head, new, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return record,
            Err(current) => head = current,
        }
    }
}

/// Delete every active staging file owned by this process.
///
/// Idempotent: records that are already inactive are skipped.
pub(crate) fn sweep(mode: SweepMode) {
    sweep_owned_by(current_pid(), mode);
}

fn sweep_owned_by(owner: libc::pid_t, mode: SweepMode) {
    for record in records() {
        if record.owner() == owner {
            record.force_delete(mode);
        }
    }
}

/// Remove every staging file this process still holds.
///
/// This is the same cleanup the exit hook performs. It is useful before
/// `exec`, or for a long-running process that wants to drop abandoned locks
/// without exiting. Handles whose files were removed observe the inactive
/// state afterwards.
pub fn remove_staging_files() {
    sweep(SweepMode::Exit);
}

/// Number of records in the arena (claimed or not).
pub fn registry_len() -> usize {
    records().count()
}

#[cfg(test)]
pub(crate) fn sweep_as(owner: libc::pid_t, mode: SweepMode) {
    sweep_owned_by(owner, mode);
}
