//! CLI argument parsing for stagelock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Stagelock: crash-safe, mutually exclusive file updates.
///
/// New content is staged in `<file>.lock` and renamed over `<file>` on
/// success. Only one writer can hold the lock at a time, readers never see
/// partial content, and the lockfile is removed if the writer exits or is
/// killed by a common fatal signal.
#[derive(Parser, Debug)]
#[command(name = "stagelock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: ./stagelock.yaml if present).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for stagelock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replace a file with the contents of stdin.
    ///
    /// Locks the file, copies stdin into the lockfile, and commits it.
    Write(WriteArgs),

    /// Append stdin to a file.
    ///
    /// The lockfile starts with the file's current contents.
    Append(AppendArgs),

    /// Hold the lock on a file for a while, then give it up.
    ///
    /// Prints the lockfile path once the lock is held. Stdin is written into
    /// the lockfile but never committed.
    Hold(HoldArgs),

    /// Show whether a file is currently locked.
    Status(StatusArgs),
}

/// Arguments for the `write` command.
#[derive(Parser, Debug)]
pub struct WriteArgs {
    /// File to replace.
    pub path: PathBuf,

    /// Milliseconds to keep retrying a held lock (0 = once, -1 = forever).
    #[arg(long, allow_negative_numbers = true)]
    pub timeout_ms: Option<i64>,

    /// Lock a symlink itself instead of its target.
    #[arg(long)]
    pub no_deref: bool,

    /// Exit immediately with a fatal error if the lock cannot be taken.
    #[arg(long)]
    pub die: bool,
}

/// Arguments for the `append` command.
#[derive(Parser, Debug)]
pub struct AppendArgs {
    /// File to append to.
    pub path: PathBuf,

    /// Lock a symlink itself instead of its target.
    #[arg(long)]
    pub no_deref: bool,
}

/// Arguments for the `hold` command.
#[derive(Parser, Debug)]
pub struct HoldArgs {
    /// File to lock.
    pub path: PathBuf,

    /// Milliseconds to keep retrying a held lock (0 = once, -1 = forever).
    #[arg(long, allow_negative_numbers = true)]
    pub timeout_ms: Option<i64>,

    /// How long to hold the lock, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub hold_ms: u64,
}

/// Arguments for the `status` command.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// File whose lock to inspect.
    pub path: PathBuf,

    /// Print machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
