//! Exclusive file updates through lockfiles.
//!
//! To change a file, create `<file>.lock` with exclusive-create semantics,
//! write the new content into it, and rename it over `<file>`. Exclusive
//! creation means only one process can hold the lock; the rename means
//! readers see either the old content or the new, never a mix.
//!
//! # Lock Files
//!
//! A lockfile is a staging file (see [`crate::staging`]) whose path is the
//! destination plus [`LOCK_SUFFIX`](crate::fs::LOCK_SUFFIX). If the holder
//! exits or is killed by a common fatal signal the lockfile is removed.
//! After `SIGKILL` or a power failure a stale lockfile can remain; it blocks
//! writers until removed by hand (see [`inspect`]).
//!
//! # Contention
//!
//! [`LockFile::acquire`] retries with quadratic backoff (1ms, 4ms, 9ms, ...,
//! capped at 1s per wait) until its timeout expires.

mod backoff;
mod lockfile;
mod message;
mod metadata;
mod operations;
mod types;

#[cfg(test)]
mod tests;

// Re-export public API
pub use lockfile::LockFile;
pub use message::{die, unable_to_lock_die, unable_to_lock_message};
pub use metadata::{LockInfo, inspect};
pub use types::{LockFlags, LockTimeout};
