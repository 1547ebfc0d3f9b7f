//! Tests for the locks subsystem.

use super::*;
use crate::error::StagingError;
use crate::staging::StagingState;
use chrono::{Duration, Utc};
use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::fs::symlink;
use std::path::Path;
use std::thread;
use std::time::{Duration as StdDuration, Instant};
use tempfile::TempDir;

fn lock_exists(path: &Path) -> bool {
    crate::fs::lock_path_for(path).exists()
}

#[test]
fn test_acquire_and_commit_replaces_destination() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");
    fs::write(&config, "old\n").unwrap();

    let mut lock = LockFile::new();
    lock.acquire(&config, LockFlags::NONE, 0)
        .unwrap()
        .write_all(b"new\n")
        .unwrap();

    assert!(lock.is_locked());
    assert!(lock_exists(&config));
    // Readers keep seeing the old content until commit.
    assert_eq!(fs::read_to_string(&config).unwrap(), "old\n");

    lock.commit().unwrap();

    assert_eq!(fs::read_to_string(&config).unwrap(), "new\n");
    assert!(!lock_exists(&config));
    assert!(!lock.is_locked());
}

#[test]
fn test_acquire_creates_destination_on_commit() {
    let temp = TempDir::new().unwrap();
    let fresh = temp.path().join("fresh");

    let mut lock = LockFile::new();
    write!(lock.acquire(&fresh, LockFlags::NONE, 0).unwrap(), "hello").unwrap();
    lock.commit().unwrap();

    assert_eq!(fs::read_to_string(&fresh).unwrap(), "hello");
}

#[test]
fn test_second_lock_fails_while_held() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");

    let mut first = LockFile::new();
    first.acquire(&config, LockFlags::NONE, 0).unwrap();

    let mut second = LockFile::new();
    let err = second.acquire(&config, LockFlags::NONE, 0).unwrap_err();

    assert!(matches!(err, StagingError::Locked { .. }));
    assert!(err.is_contention());
    assert!(!second.is_locked());
    // The holder's lockfile survives the failed attempt.
    assert!(lock_exists(&config));
    assert!(first.is_locked());
}

#[test]
fn test_timeout_gives_up_after_deadline() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");

    let mut holder = LockFile::new();
    holder.acquire(&config, LockFlags::NONE, 0).unwrap();

    let start = Instant::now();
    let mut waiter = LockFile::new();
    let err = waiter.acquire(&config, LockFlags::NONE, 50).unwrap_err();

    assert!(err.is_contention());
    assert!(start.elapsed() >= StdDuration::from_millis(50));
}

#[test]
fn test_timeout_succeeds_once_holder_releases() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");

    let mut holder = LockFile::new();
    holder.acquire(&config, LockFlags::NONE, 0).unwrap();

    let waiter_path = config.clone();
    let waiter = thread::spawn(move || {
        let mut lock = LockFile::new();
        lock.acquire(&waiter_path, LockFlags::NONE, StdDuration::from_secs(10))
            .map(|file| file.write_all(b"waited\n").unwrap())?;
        lock.commit()
    });

    thread::sleep(StdDuration::from_millis(50));
    holder.rollback();

    waiter.join().unwrap().unwrap();
    assert_eq!(fs::read_to_string(&config).unwrap(), "waited\n");
}

#[test]
fn test_append_prepopulates_lockfile() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");
    fs::write(&config, "a=1\n").unwrap();

    let mut lock = LockFile::new();
    let file = lock.acquire_for_append(&config, LockFlags::NONE).unwrap();
    assert_eq!(file.stream_position().unwrap(), 4);
    file.write_all(b"b=2\n").unwrap();

    assert_eq!(fs::read_to_string(&config).unwrap(), "a=1\n");
    lock.commit().unwrap();
    assert_eq!(fs::read_to_string(&config).unwrap(), "a=1\nb=2\n");
}

#[test]
fn test_append_to_missing_destination_starts_empty() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");

    let mut lock = LockFile::new();
    let file = lock.acquire_for_append(&config, LockFlags::NONE).unwrap();
    assert_eq!(file.stream_position().unwrap(), 0);
    file.write_all(b"b=2\n").unwrap();
    lock.commit().unwrap();

    assert_eq!(fs::read_to_string(&config).unwrap(), "b=2\n");
}

#[test]
fn test_append_fails_immediately_when_locked() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");

    let mut holder = LockFile::new();
    holder.acquire(&config, LockFlags::NONE, 0).unwrap();

    let mut other = LockFile::new();
    let err = other.acquire_for_append(&config, LockFlags::NONE).unwrap_err();
    assert!(err.is_contention());
}

#[test]
fn test_append_from_unreadable_destination_fails() {
    let temp = TempDir::new().unwrap();
    // A directory can be opened but not read, so the copy fails.
    let config = temp.path().join("config");
    fs::create_dir(&config).unwrap();

    let mut lock = LockFile::new();
    let err = lock.acquire_for_append(&config, LockFlags::NONE).unwrap_err();

    assert!(matches!(err, StagingError::AppendCopy { .. }));
    assert!(!lock.is_locked());
    assert!(!lock_exists(&config));
}

#[test]
fn test_commit_to_other_destination() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");
    let other = temp.path().join("config.new");
    fs::write(&config, "untouched").unwrap();

    let mut lock = LockFile::new();
    lock.acquire(&config, LockFlags::NONE, 0)
        .unwrap()
        .write_all(b"moved")
        .unwrap();
    lock.commit_to(&other).unwrap();

    assert_eq!(fs::read_to_string(&config).unwrap(), "untouched");
    assert_eq!(fs::read_to_string(&other).unwrap(), "moved");
    assert!(!lock_exists(&config));
}

#[test]
fn test_rollback_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");
    fs::write(&config, "keep").unwrap();

    let mut lock = LockFile::new();
    lock.acquire(&config, LockFlags::NONE, 0)
        .unwrap()
        .write_all(b"discard")
        .unwrap();

    lock.rollback();
    lock.rollback();

    assert!(!lock_exists(&config));
    assert_eq!(fs::read_to_string(&config).unwrap(), "keep");
}

#[test]
fn test_rollback_after_commit_is_noop() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");

    let mut lock = LockFile::new();
    write!(lock.acquire(&config, LockFlags::NONE, 0).unwrap(), "done").unwrap();
    lock.commit().unwrap();
    lock.rollback();

    assert_eq!(fs::read_to_string(&config).unwrap(), "done");
}

#[test]
fn test_drop_rolls_back() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");

    {
        let mut lock = LockFile::new();
        lock.acquire(&config, LockFlags::NONE, 0).unwrap();
        assert!(lock_exists(&config));
    }

    assert!(!lock_exists(&config));
    assert!(!config.exists());
}

#[test]
fn test_lockfile_is_reusable() {
    let temp = TempDir::new().unwrap();
    let a = temp.path().join("a");
    let b = temp.path().join("b");

    let mut lock = LockFile::new();
    write!(lock.acquire(&a, LockFlags::NONE, 0).unwrap(), "1").unwrap();
    lock.commit().unwrap();
    write!(lock.acquire(&b, LockFlags::NONE, 0).unwrap(), "2").unwrap();
    lock.commit().unwrap();

    assert_eq!(fs::read_to_string(&a).unwrap(), "1");
    assert_eq!(fs::read_to_string(&b).unwrap(), "2");
}

#[test]
#[should_panic(expected = "BUG: commit of unlocked lockfile")]
fn test_commit_unlocked_panics() {
    let temp = TempDir::new().unwrap();
    let mut lock = LockFile::new();
    let _ = lock.commit_to(temp.path().join("config"));
}

#[test]
#[should_panic(expected = "BUG: locked_path() called for unlocked object")]
fn test_locked_path_unlocked_panics() {
    let lock = LockFile::new();
    let _ = lock.locked_path();
}

#[test]
fn test_locked_path_and_lock_path() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");

    let mut lock = LockFile::new();
    assert!(lock.lock_path().is_none());
    lock.acquire(&config, LockFlags::NONE, 0).unwrap();

    assert_eq!(lock.locked_path(), config);
    assert_eq!(lock.lock_path(), Some(temp.path().join("config.lock").as_path()));
}

#[test]
fn test_symlinked_destination_is_resolved() {
    let temp = TempDir::new().unwrap();
    let real = temp.path().join("real");
    let link = temp.path().join("link");
    fs::write(&real, "before").unwrap();
    symlink("real", &link).unwrap();

    let mut lock = LockFile::new();
    lock.acquire(&link, LockFlags::NONE, 0).unwrap();
    assert_eq!(lock.locked_path(), real);
    lock.write_all(b"after").unwrap();
    lock.commit().unwrap();

    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_to_string(&real).unwrap(), "after");
}

#[test]
fn test_no_deref_replaces_the_link_itself() {
    let temp = TempDir::new().unwrap();
    let real = temp.path().join("real");
    let link = temp.path().join("link");
    fs::write(&real, "before").unwrap();
    symlink("real", &link).unwrap();

    let mut lock = LockFile::new();
    lock.acquire(&link, LockFlags::NO_DEREF, 0).unwrap();
    assert_eq!(lock.locked_path(), link);
    lock.write_all(b"after").unwrap();
    lock.commit().unwrap();

    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_file());
    assert_eq!(fs::read_to_string(&link).unwrap(), "after");
    assert_eq!(fs::read_to_string(&real).unwrap(), "before");
}

#[test]
fn test_sync_flag_commits() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");

    let mut lock = LockFile::new();
    write!(lock.acquire(&config, LockFlags::SYNC, 0).unwrap(), "durable").unwrap();
    lock.commit().unwrap();

    assert_eq!(fs::read_to_string(&config).unwrap(), "durable");
}

#[test]
fn test_close_and_reopen_through_staging() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");

    let mut lock = LockFile::new();
    lock.acquire(&config, LockFlags::NONE, 0)
        .unwrap()
        .write_all(b"part one\n")
        .unwrap();
    lock.staging().close().unwrap();
    assert_eq!(lock.state(), StagingState::Closed);
    assert!(lock.is_locked());

    let file = lock.staging().reopen().unwrap();
    file.seek(SeekFrom::End(0)).unwrap();
    file.write_all(b"part two\n").unwrap();
    lock.commit().unwrap();

    assert_eq!(fs::read_to_string(&config).unwrap(), "part one\npart two\n");
}

#[test]
fn test_inspect_reports_lock_state() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");

    let info = inspect(&config, LockFlags::NONE).unwrap();
    assert!(!info.locked);
    assert!(info.size.is_none());
    assert_eq!(info.age_string(), "-");
    assert_eq!(info.to_string(), format!("{}: unlocked", config.display()));

    let mut lock = LockFile::new();
    lock.acquire(&config, LockFlags::NONE, 0)
        .unwrap()
        .write_all(b"12345")
        .unwrap();

    let info = inspect(&config, LockFlags::NONE).unwrap();
    assert!(info.locked);
    assert_eq!(info.size, Some(5));
    assert_eq!(info.lock_path, temp.path().join("config.lock"));
    assert!(info.to_string().contains("locked (5 bytes staged"));
    assert!(!info.is_stale(1));
}

#[test]
fn test_lock_info_serialization() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");

    let info = inspect(&config, LockFlags::NONE).unwrap();
    let json = serde_json::to_string(&info).unwrap();

    assert!(json.contains("\"locked\":false"));
    assert!(!json.contains("modified_at"));

    let parsed: LockInfo = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.destination, config);
}

#[test]
fn test_lock_info_age_string() {
    let mut info = LockInfo {
        destination: "/repo/config".into(),
        lock_path: "/repo/config.lock".into(),
        locked: true,
        size: Some(0),
        modified_at: Some(Utc::now()),
    };

    assert!(info.age_string().ends_with('s'));

    info.modified_at = Some(Utc::now() - Duration::minutes(5));
    assert_eq!(info.age_string(), "5m");

    info.modified_at = Some(Utc::now() - Duration::hours(2));
    assert!(info.age_string().contains('h'));

    info.modified_at = Some(Utc::now() - Duration::days(3));
    assert!(info.age_string().contains('d'));
}

#[test]
fn test_lock_info_is_stale() {
    let mut info = LockInfo {
        destination: "/repo/config".into(),
        lock_path: "/repo/config.lock".into(),
        locked: true,
        size: Some(0),
        modified_at: Some(Utc::now()),
    };

    assert!(!info.is_stale(120));

    info.modified_at = Some(Utc::now() - Duration::minutes(150));
    assert!(info.is_stale(120));

    info.modified_at = None;
    assert!(!info.is_stale(0));
}

#[test]
fn test_timeout_from_millis() {
    assert_eq!(LockTimeout::from_millis(0), LockTimeout::Immediate);
    assert_eq!(LockTimeout::from_millis(-1), LockTimeout::Forever);
    assert_eq!(LockTimeout::from_millis(-500), LockTimeout::Forever);
    assert_eq!(
        LockTimeout::from_millis(250),
        LockTimeout::After(StdDuration::from_millis(250))
    );
    assert_eq!(LockTimeout::from(StdDuration::ZERO), LockTimeout::Immediate);
    assert_eq!(LockTimeout::Forever.to_string(), "forever");
}

#[test]
fn test_lock_flags() {
    let mut flags = LockFlags::NO_DEREF | LockFlags::SYNC;
    assert!(flags.contains(LockFlags::NO_DEREF));
    assert!(flags.contains(LockFlags::SYNC));
    assert!(!flags.contains(LockFlags::DIE_ON_ERROR));
    assert!(flags.contains(LockFlags::NONE));

    flags |= LockFlags::DIE_ON_ERROR;
    assert_eq!(flags.bits(), 7);
    assert_eq!(LockFlags::default(), LockFlags::NONE);
}
