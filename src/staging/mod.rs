//! Staging files and their crash-safety machinery.
//!
//! A staging file is created exclusively, written, and then either renamed
//! over its destination or deleted. Until one of those happens it is tracked
//! in a process-wide registry, and hooks installed on first use remove it if
//! the process exits or is killed by one of the common fatal signals.
//!
//! # States
//!
//! ```text
//! Inactive --create--> Active --close--> Closed --reopen--> Active
//!     ^                  |                 |
//!     +--finalize/delete-+-----------------+
//! ```
//!
//! # Fork
//!
//! Each registry record remembers the process that created its file. A
//! forked child inherits the records but never deletes files it does not
//! own, neither in the cleanup hooks nor when it drops an inherited handle.
//!
//! # Threads
//!
//! A handle is a plain value with `&mut self` operations and must not be
//! shared between threads without outside synchronization. A cleanup sweep
//! racing with a rename on another thread of the same process is not
//! supported.

mod file;
mod registry;
mod sigchain;


pub use file::{StagingFile, StagingState};
pub use registry::{registry_len, remove_staging_files};
