//! The exit hook removes lockfiles a process still holds when it exits.
//!
//! The test re-runs its own test binary as the child process. The child takes
//! a lock, leaks the handle so no destructor runs, and calls `exit(0)`.

use stagelock::locks::{LockFile, LockFlags};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

const CHILD_TARGET_ENV: &str = "STAGELOCK_EXIT_CHILD_TARGET";

fn run_child(target: PathBuf) -> ! {
    let mut lock = LockFile::new();
    lock.acquire(&target, LockFlags::NONE, 0)
        .expect("child failed to lock")
        .write_all(b"never committed\n")
        .expect("child failed to write");
    println!("holding {}", lock.lock_path().unwrap().display());
    std::mem::forget(lock);
    std::process::exit(0)
}

#[test]
fn lockfile_removed_on_normal_exit() {
    if let Some(target) = std::env::var_os(CHILD_TARGET_ENV) {
        run_child(PathBuf::from(target));
    }

    let temp = TempDir::new().unwrap();
    let target = temp.path().join("config");
    let lock_path = temp.path().join("config.lock");

    let output = Command::new(std::env::current_exe().unwrap())
        .args(["--exact", "lockfile_removed_on_normal_exit", "--nocapture"])
        .env(CHILD_TARGET_ENV, &target)
        .output()
        .expect("failed to spawn child");

    assert!(
        output.status.success(),
        "child failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains(&format!("holding {}", lock_path.display())),
        "child never held the lock: {}",
        stdout
    );
    assert!(!lock_path.exists(), "lockfile survived a normal exit");
    assert!(!target.exists());
}
