//! Implementation of the `stagelock status` command.

use crate::cli::StatusArgs;
use stagelock::config::Config;
use stagelock::error::{Result, StagingError};
use stagelock::locks::{self, LockFlags};

/// Minutes after which a lockfile is reported as probably stale.
const STALE_LOCK_MINUTES: u32 = 60;

/// Execute the `stagelock status` command.
///
/// Prints whether `<path>.lock` exists and, if so, how large and how old it
/// is. Never modifies anything.
pub fn cmd_status(args: StatusArgs, config: &Config) -> Result<()> {
    let mut flags = LockFlags::NONE;
    if config.no_deref {
        flags |= LockFlags::NO_DEREF;
    }
    let info = locks::inspect(&args.path, flags)?;

    if args.json {
        let json = serde_json::to_string_pretty(&info).map_err(|e| StagingError::Io {
            context: "failed to serialize status".to_string(),
            source: e.into(),
        })?;
        println!("{}", json);
        return Ok(());
    }

    println!("{}", info);
    if info.locked && info.is_stale(STALE_LOCK_MINUTES) {
        println!(
            "  lockfile '{}' is older than {} minutes; if no process is using it, remove it by hand",
            info.lock_path.display(),
            STALE_LOCK_MINUTES
        );
    }
    Ok(())
}
