//! Stagelock: crash-safe, mutually exclusive file updates.
//!
//! This is the main entry point for the `stagelock` CLI. It parses arguments,
//! loads the config, installs logging, dispatches to the appropriate command
//! handler, and handles errors with proper exit codes.

mod cli;
mod commands;

use cli::Cli;
use stagelock::config::{Config, LogLevel};
use stagelock::error::StagingError;
use stagelock::exit_codes;
use stagelock::locks::unable_to_lock_message;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let config = Config::discover(cli.config.as_deref(), Path::new("."));
    let level = match (&config, cli.verbose) {
        (Ok(config), 0) => config.log_level.unwrap_or_default(),
        (_, count) => LogLevel::from_verbosity(count),
    };
    init_logging(level);

    let result = config.and_then(|config| commands::dispatch(cli.command, &config));

    match result {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            report(&err);

            // Return appropriate exit code
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn init_logging(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_max_level(level.as_tracing())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Print a user-actionable error message to stderr.
fn report(err: &StagingError) {
    match err {
        StagingError::Locked { path, source } => {
            eprintln!("Error: {}", unable_to_lock_message(path, source));
        }
        _ => eprintln!("Error: {}", err),
    }
    if let Some(cleanup) = err.cleanup_error() {
        eprintln!("  (cleanup also failed: {})", cleanup);
    }
}
