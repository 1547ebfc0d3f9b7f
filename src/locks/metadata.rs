//! Inspection of lockfiles on disk.

use super::operations::lock_target;
use super::types::LockFlags;
use crate::error::{Result, StagingError};
use crate::fs::lock_path_for;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// What is known about the lockfile for a destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// The destination file.
    pub destination: PathBuf,

    /// The lockfile path (`<destination>.lock`).
    pub lock_path: PathBuf,

    /// Whether the lockfile currently exists.
    pub locked: bool,

    /// Size of the lockfile in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Last modification time of the lockfile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl LockInfo {
    /// Calculate the age of the lockfile since its last modification.
    pub fn age(&self) -> Option<Duration> {
        self.modified_at
            .map(|modified| Utc::now().signed_duration_since(modified))
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let Some(age) = self.age() else {
            return "-".to_string();
        };
        let minutes = age.num_minutes();
        let hours = age.num_hours();
        let days = age.num_days();

        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m", minutes)
        } else {
            format!("{}s", age.num_seconds().max(0))
        }
    }

    /// Whether the lockfile has not been touched for `stale_minutes`.
    ///
    /// A stale lockfile usually means its writer died without cleanup (for
    /// example on `SIGKILL`) and it must be removed by hand.
    pub fn is_stale(&self, stale_minutes: u32) -> bool {
        self.age()
            .is_some_and(|age| age.num_minutes() > i64::from(stale_minutes))
    }
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.locked {
            write!(
                f,
                "{}: locked ({} bytes staged, age: {})",
                self.destination.display(),
                self.size.unwrap_or(0),
                self.age_string()
            )
        } else {
            write!(f, "{}: unlocked", self.destination.display())
        }
    }
}

/// Look at the lockfile for `path` without touching it.
pub fn inspect(path: impl AsRef<Path>, flags: LockFlags) -> Result<LockInfo> {
    let destination = lock_target(path.as_ref(), flags)?;
    let lock_path = lock_path_for(&destination);

    match fs::symlink_metadata(&lock_path) {
        Ok(metadata) => Ok(LockInfo {
            destination,
            lock_path,
            locked: true,
            size: Some(metadata.len()),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(LockInfo {
            destination,
            lock_path,
            locked: false,
            size: None,
            modified_at: None,
        }),
        Err(source) => Err(StagingError::Io {
            context: format!("failed to inspect lockfile '{}'", lock_path.display()),
            source,
        }),
    }
}
