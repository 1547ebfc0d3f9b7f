//! Config struct definition and default implementation.

use super::types::*;
use crate::fs::SharedRepository;
use serde::{Deserialize, Serialize};

/// Configuration for lock acquisition and staging files.
///
/// This struct represents the contents of `stagelock.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Default acquisition timeout in milliseconds. `0` tries once, `-1`
    /// waits forever.
    pub timeout_ms: i64,

    /// Lock symlinks themselves instead of the files they point at.
    pub no_deref: bool,

    // =========================================================================
    // Staging file settings
    // =========================================================================
    /// Permission adjustment for newly created staging files.
    pub shared_repository: SharedRepository,

    /// Sync staging content to disk before publishing it.
    #[serde(default = "default_true")]
    pub fsync: bool,

    // =========================================================================
    // Diagnostics
    // =========================================================================
    /// Log level when no `-v` is given on the command line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_ms: 0,
            no_deref: false,
            shared_repository: SharedRepository::default(),
            fsync: default_true(),
            log_level: None,
        }
    }
}
