//! Lock flags and acquisition timeouts.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

/// Options for lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockFlags(u8);

impl LockFlags {
    /// No options.
    pub const NONE: LockFlags = LockFlags(0);

    /// If the lock cannot be taken, print a message and exit the process
    /// instead of returning an error.
    pub const DIE_ON_ERROR: LockFlags = LockFlags(1);

    /// Lock the path as given. Without this flag symbolic links are resolved
    /// first, so both the lockfile and the eventual rename target the file
    /// the link points at.
    pub const NO_DEREF: LockFlags = LockFlags(2);

    /// Sync the lockfile contents (and the containing directory after the
    /// rename) to disk when committing.
    pub const SYNC: LockFlags = LockFlags(4);

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: LockFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for LockFlags {
    type Output = LockFlags;

    fn bitor(self, rhs: LockFlags) -> LockFlags {
        LockFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for LockFlags {
    fn bitor_assign(&mut self, rhs: LockFlags) {
        self.0 |= rhs.0;
    }
}

/// How long to keep retrying while someone else holds the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockTimeout {
    /// Try exactly once.
    #[default]
    Immediate,
    /// Retry with backoff until this much time has passed since the first
    /// attempt.
    After(Duration),
    /// Retry until the lock is acquired.
    Forever,
}

impl LockTimeout {
    /// Interpret a millisecond count: `0` tries once, a negative value
    /// retries forever.
    pub fn from_millis(timeout_ms: i64) -> Self {
        match timeout_ms {
            0 => LockTimeout::Immediate,
            ms if ms < 0 => LockTimeout::Forever,
            ms => LockTimeout::After(Duration::from_millis(ms.unsigned_abs())),
        }
    }
}

impl From<i64> for LockTimeout {
    fn from(timeout_ms: i64) -> Self {
        LockTimeout::from_millis(timeout_ms)
    }
}

impl From<i32> for LockTimeout {
    fn from(timeout_ms: i32) -> Self {
        LockTimeout::from_millis(i64::from(timeout_ms))
    }
}

impl From<Duration> for LockTimeout {
    fn from(timeout: Duration) -> Self {
        if timeout.is_zero() {
            LockTimeout::Immediate
        } else {
            LockTimeout::After(timeout)
        }
    }
}

impl fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTimeout::Immediate => write!(f, "no retry"),
            LockTimeout::After(d) => write!(f, "{}ms", d.as_millis()),
            LockTimeout::Forever => write!(f, "forever"),
        }
    }
}
