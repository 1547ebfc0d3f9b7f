//! Crash-safe, mutually exclusive file updates.
//!
//! - [`staging`]: files that are removed automatically if the process exits
//!   or is killed before they are published
//! - [`locks`]: exclusive updates of a destination through `<file>.lock`
//! - [`fs`]: lockfile naming, permissions, and an atomic write helper
//! - [`config`]: `stagelock.yaml` defaults for the command-line tool

pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod locks;
pub mod staging;
