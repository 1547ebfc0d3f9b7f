//! Exit code constants for the stagelock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config)
//! - 2: I/O failure while staging or publishing a file
//! - 3: Lock acquisition failure (staging file held by someone else)
//! - 128: Fatal termination requested by `LockFlags::DIE_ON_ERROR`

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or an invalid configuration file.
pub const USER_ERROR: i32 = 1;

/// I/O failure: write, close, rename or copy of a staging file failed.
pub const IO_FAILURE: i32 = 2;

/// Lock acquisition failure: the staging file could not be created.
pub const LOCK_FAILURE: i32 = 3;

/// Fatal termination after an unrecoverable lock failure.
pub const FATAL: i32 = 128;
