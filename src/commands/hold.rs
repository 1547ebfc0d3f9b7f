//! Implementation of the `stagelock hold` command.
//!
//! Holds a lock without ever committing it. Useful to block other writers
//! for a while and to watch the lockfile disappear when the holder is
//! interrupted.

use super::copy_stdin;
use crate::cli::HoldArgs;
use stagelock::config::Config;
use stagelock::error::Result;
use stagelock::locks::LockFile;
use std::io::{self, IsTerminal, Write};
use std::thread;
use std::time::Duration;
use tracing::info;

/// Execute the `stagelock hold` command.
pub fn cmd_hold(args: HoldArgs, config: &Config) -> Result<()> {
    let mut lock = LockFile::with_shared_repository(config.shared_repository);
    let file = lock.acquire(
        &args.path,
        config.lock_flags(),
        config.timeout(args.timeout_ms),
    )?;
    if !io::stdin().is_terminal() {
        copy_stdin(file, &args.path)?;
    }

    if let Some(lock_path) = lock.lock_path() {
        println!("{}", lock_path.display());
    }
    let _ = io::stdout().flush();

    info!(path = %args.path.display(), hold_ms = args.hold_ms, "holding lock");
    thread::sleep(Duration::from_millis(args.hold_ms));

    lock.rollback();
    Ok(())
}
