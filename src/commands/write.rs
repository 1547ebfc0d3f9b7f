//! Implementation of the `stagelock write` and `stagelock append` commands.

use super::copy_stdin;
use crate::cli::{AppendArgs, WriteArgs};
use stagelock::config::Config;
use stagelock::error::Result;
use stagelock::locks::{LockFile, LockFlags};
use tracing::info;

/// Execute the `stagelock write` command.
///
/// The destination is replaced only if all of stdin was staged; on any
/// error the lockfile is rolled back when `lock` is dropped.
pub fn cmd_write(args: WriteArgs, config: &Config) -> Result<()> {
    let mut flags = config.lock_flags();
    if args.no_deref {
        flags |= LockFlags::NO_DEREF;
    }
    if args.die {
        flags |= LockFlags::DIE_ON_ERROR;
    }

    let mut lock = LockFile::with_shared_repository(config.shared_repository);
    let file = lock.acquire(&args.path, flags, config.timeout(args.timeout_ms))?;
    let bytes = copy_stdin(file, &args.path)?;
    lock.commit()?;

    info!(path = %args.path.display(), bytes, "wrote file");
    Ok(())
}

/// Execute the `stagelock append` command.
pub fn cmd_append(args: AppendArgs, config: &Config) -> Result<()> {
    let mut flags = config.lock_flags();
    if args.no_deref {
        flags |= LockFlags::NO_DEREF;
    }

    let mut lock = LockFile::with_shared_repository(config.shared_repository);
    let file = lock.acquire_for_append(&args.path, flags)?;
    let bytes = copy_stdin(file, &args.path)?;
    lock.commit()?;

    info!(path = %args.path.display(), bytes, "appended to file");
    Ok(())
}
