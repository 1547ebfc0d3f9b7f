//! Lockfile path derivation.

use std::ffi::OsString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Appended to a destination path to name its lockfile.
pub const LOCK_SUFFIX: &str = ".lock";

/// Maximum number of symlinks followed by [`resolve_symlink`].
const MAX_SYMLINK_DEPTH: usize = 5;

/// Follow `path` through up to five levels of symbolic links.
///
/// Relative link targets are resolved against the directory containing the
/// link. Resolution stops at the first path that is not a symlink (or
/// cannot be read); if the chain is deeper than the limit, the last path
/// reached is returned.
pub fn resolve_symlink(path: &Path) -> PathBuf {
    let mut resolved = path.to_path_buf();
    for _ in 0..MAX_SYMLINK_DEPTH {
        let Ok(target) = fs::read_link(&resolved) else {
            break;
        };
        if target.as_os_str().is_empty() {
            break;
        }
        resolved = if target.is_absolute() {
            target
        } else {
            match resolved.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.join(target),
                _ => target,
            }
        };
    }
    resolved
}

/// `<path>.lock`
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// The destination a lockfile path stands for, or `None` if `lock_path`
/// does not end in [`LOCK_SUFFIX`].
pub fn strip_lock_suffix(lock_path: &Path) -> Option<PathBuf> {
    let bytes = lock_path.as_os_str().as_bytes();
    let stem = bytes.strip_suffix(LOCK_SUFFIX.as_bytes())?;
    Some(PathBuf::from(std::ffi::OsStr::from_bytes(stem)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    #[test]
    fn lock_path_appends_suffix() {
        assert_eq!(
            lock_path_for(Path::new("/repo/config")),
            PathBuf::from("/repo/config.lock")
        );
    }

    #[test]
    fn strip_lock_suffix_inverts_lock_path() {
        let dest = Path::new("/repo/refs/heads/main");
        assert_eq!(strip_lock_suffix(&lock_path_for(dest)).unwrap(), dest);
        assert!(strip_lock_suffix(Path::new("/repo/config")).is_none());
    }

    #[test]
    fn regular_file_resolves_to_itself() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("config");
        fs::write(&file, b"").unwrap();
        assert_eq!(resolve_symlink(&file), file);
    }

    #[test]
    fn missing_file_resolves_to_itself() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("missing");
        assert_eq!(resolve_symlink(&file), file);
    }

    #[test]
    fn relative_link_resolves_against_link_directory() {
        let temp = TempDir::new().unwrap();
        let sub = temp.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("real"), b"").unwrap();
        symlink("sub/real", temp.path().join("link")).unwrap();

        assert_eq!(resolve_symlink(&temp.path().join("link")), temp.path().join("sub/real"));
    }

    #[test]
    fn dangling_link_resolves_to_its_target() {
        let temp = TempDir::new().unwrap();
        symlink("nowhere", temp.path().join("link")).unwrap();

        assert_eq!(resolve_symlink(&temp.path().join("link")), temp.path().join("nowhere"));
    }

    #[test]
    fn chains_stop_after_depth_limit() {
        let temp = TempDir::new().unwrap();
        // l0 -> l1 -> ... -> l6 -> target
        fs::write(temp.path().join("target"), b"").unwrap();
        symlink("target", temp.path().join("l6")).unwrap();
        for i in (0..6).rev() {
            symlink(format!("l{}", i + 1), temp.path().join(format!("l{}", i))).unwrap();
        }

        assert_eq!(resolve_symlink(&temp.path().join("l0")), temp.path().join("l5"));
    }
}
