//! Filesystem helpers used by the staging and lock layers.
//!
//! - `resolve`: lockfile naming and symlink resolution of destinations
//! - `perms`: shared-repository permission bits for new files
//! - `template`: unique names from `XXXXXX` templates
//! - `atomic`: whole-file atomic writes on top of the lock layer

pub mod atomic;
mod perms;
mod resolve;
mod template;

pub use atomic::{atomic_write, atomic_write_file, atomic_write_with};
pub use perms::{SharedRepository, adjust_shared_perm, calc_shared_perm};
pub use resolve::{LOCK_SUFFIX, lock_path_for, resolve_symlink, strip_lock_suffix};
pub use template::fill_template;
