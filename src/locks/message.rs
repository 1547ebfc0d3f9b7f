//! Diagnostics for failed lock acquisition.

use crate::exit_codes;
use crate::staging::remove_staging_files;
use std::io;
use std::path::Path;

/// Describe why locking `path` failed with `err`.
///
/// `path` is the destination, not the lockfile. Contention gets a longer
/// explanation, since the usual cause is another running process or a stale
/// lockfile left by one that crashed.
pub fn unable_to_lock_message(path: &Path, err: &io::Error) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    if err.kind() == io::ErrorKind::AlreadyExists {
        format!(
            "Unable to create '{}.lock': {}.\n\n\
             Another process seems to be updating this file. Please make sure\n\
             all processes are terminated then try again. If it still fails, a\n\
             process may have crashed while holding the lock:\n\
             remove the file manually to continue.",
            absolute.display(),
            err
        )
    } else {
        format!("Unable to create '{}.lock': {}", absolute.display(), err)
    }
}

/// Print [`unable_to_lock_message`] and terminate the process.
///
/// Staging files held by this process are removed before exiting.
pub fn unable_to_lock_die(path: &Path, err: &io::Error) -> ! {
    die(&unable_to_lock_message(path, err))
}

/// Print `fatal: <message>` and terminate the process with
/// [`exit_codes::FATAL`].
pub fn die(message: &str) -> ! {
    tracing::error!("{}", message);
    eprintln!("fatal: {}", message);
    remove_staging_files();
    std::process::exit(exit_codes::FATAL)
}
