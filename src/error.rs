//! Error types for stagelock.
//!
//! Recoverable failures (contention, permissions, I/O during write, close or
//! rename) are returned as [`StagingError`] and always keep the originating
//! `std::io::Error`, even when a best-effort cleanup ran afterwards. Calling a
//! lifecycle operation in the wrong state is a bug in the caller and panics
//! instead; those conditions never show up here.

use crate::exit_codes;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for staging and lock operations.
#[derive(Error, Debug)]
pub enum StagingError {
    /// Exclusive creation of a staging file failed.
    #[error("unable to create '{}': {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A closed staging file could not be reopened for writing.
    #[error("could not reopen '{}' for writing: {source}", .path.display())]
    Reopen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Flushing or closing the staging descriptor failed; the staging file
    /// has been deleted.
    #[error("failed to close '{}': {source}", .path.display())]
    Close {
        path: PathBuf,
        #[source]
        source: io::Error,
        /// Error from the best-effort delete that followed, if any (ignored).
        cleanup: Option<io::Error>,
    },

    /// Publishing the staging file failed; the staging file has been deleted.
    #[error("unable to rename '{}' to '{}': {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
        /// Error from the best-effort delete that followed, if any (ignored).
        cleanup: Option<io::Error>,
    },

    /// Shared-repository permission bits could not be applied.
    #[error("cannot fix permission bits on '{}': {source}", .path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The destination could not be copied into its lockfile for appending.
    #[error("cannot copy '{}' into its lockfile: {source}", .path.display())]
    AppendCopy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The lockfile for a destination could not be acquired.
    ///
    /// `path` is the destination, not the `.lock` file.
    #[error("Unable to create '{}.lock': {source}", .path.display())]
    Locked {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration file could not be read or is invalid.
    #[error("{0}")]
    Config(String),

    /// Any other I/O failure, with context.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StagingError {
    /// The primary I/O error behind this failure, if any.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            StagingError::Create { source, .. }
            | StagingError::Reopen { source, .. }
            | StagingError::Close { source, .. }
            | StagingError::Rename { source, .. }
            | StagingError::Permissions { source, .. }
            | StagingError::AppendCopy { source, .. }
            | StagingError::Locked { source, .. }
            | StagingError::Io { source, .. } => Some(source),
            StagingError::Config(_) => None,
        }
    }

    /// The system error code of the primary failure (`errno`).
    pub fn raw_os_error(&self) -> Option<i32> {
        self.io_error().and_then(io::Error::raw_os_error)
    }

    /// Whether the failure was caused by someone else holding the file.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            StagingError::Create { source, .. } | StagingError::Locked { source, .. }
                if source.kind() == io::ErrorKind::AlreadyExists
        )
    }

    /// The secondary cleanup failure that was swallowed, if any.
    pub fn cleanup_error(&self) -> Option<&io::Error> {
        match self {
            StagingError::Close { cleanup, .. } | StagingError::Rename { cleanup, .. } => {
                cleanup.as_ref()
            }
            _ => None,
        }
    }

    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            StagingError::Locked { .. } => exit_codes::LOCK_FAILURE,
            StagingError::Config(_) => exit_codes::USER_ERROR,
            _ => exit_codes::IO_FAILURE,
        }
    }
}

/// Result type alias for stagelock operations.
pub type Result<T> = std::result::Result<T, StagingError>;
