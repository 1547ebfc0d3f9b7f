//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::error::{Result, StagingError};
use crate::locks::{LockFlags, LockTimeout};
use std::path::Path;
use tracing::debug;

/// Config file looked up in the current directory when none is given.
pub const CONFIG_FILE_NAME: &str = "stagelock.yaml";

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            StagingError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load `explicit` if given, else [`CONFIG_FILE_NAME`] from `dir` if it
    /// exists, else the defaults.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "loading config");
            return Self::load(path);
        }
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            debug!(path = %candidate.display(), "loading config");
            return Self::load(candidate);
        }
        Ok(Self::default())
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| StagingError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            StagingError::Config(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Modes and log levels are checked while parsing; here only
    /// `timeout_ms` remains, which must be `-1` or greater.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms < -1 {
            return Err(StagingError::Config(format!(
                "config validation failed: timeout_ms must be -1 (forever) or at least 0, got {}",
                self.timeout_ms
            )));
        }
        Ok(())
    }

    /// Lock flags implied by this config.
    pub fn lock_flags(&self) -> LockFlags {
        let mut flags = LockFlags::NONE;
        if self.no_deref {
            flags |= LockFlags::NO_DEREF;
        }
        if self.fsync {
            flags |= LockFlags::SYNC;
        }
        flags
    }

    /// Acquisition timeout, with `override_ms` taking precedence.
    pub fn timeout(&self, override_ms: Option<i64>) -> LockTimeout {
        LockTimeout::from_millis(override_ms.unwrap_or(self.timeout_ms))
    }
}
