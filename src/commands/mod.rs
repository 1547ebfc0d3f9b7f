//! Command implementations for stagelock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations.

mod hold;
mod status;
mod write;

use crate::cli::Command;
use stagelock::config::Config;
use stagelock::error::{Result, StagingError};
use std::io;
use std::path::Path;

/// Dispatch a command to its implementation.
///
/// This is the main entry point for command execution. Each command
/// is routed to its handler function.
pub fn dispatch(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Write(args) => write::cmd_write(args, config),
        Command::Append(args) => write::cmd_append(args, config),
        Command::Hold(args) => hold::cmd_hold(args, config),
        Command::Status(args) => status::cmd_status(args, config),
    }
}

/// Copy stdin into `out`, naming `path` on failure.
fn copy_stdin(out: &mut impl io::Write, path: &Path) -> Result<u64> {
    io::copy(&mut io::stdin().lock(), out).map_err(|source| StagingError::Io {
        context: format!("failed to write new content for '{}'", path.display()),
        source,
    })
}
