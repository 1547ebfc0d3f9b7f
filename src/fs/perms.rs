//! Permission normalization for files shared between users.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::str::FromStr;

/// Group read/write.
const PERM_GROUP: u32 = 0o660;
/// Group read/write, world readable.
const PERM_EVERYBODY: u32 = 0o664;

/// How permission bits of newly created files are adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SharedRepository {
    /// Leave whatever the umask produced.
    #[default]
    Umask,
    /// Make files group-writable.
    Group,
    /// Make files group-writable and world-readable.
    All,
    /// Force exactly these permission bits (e.g. `0640`).
    Mode(u32),
}

impl FromStr for SharedRepository {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "umask" | "false" | "" => Ok(SharedRepository::Umask),
            "group" | "true" => Ok(SharedRepository::Group),
            "all" | "world" | "everybody" => Ok(SharedRepository::All),
            other => {
                let mode = u32::from_str_radix(other.trim_start_matches("0o"), 8)
                    .map_err(|_| format!("invalid shared_repository value '{}'", other))?;
                if mode > 0o777 {
                    return Err(format!(
                        "invalid shared_repository mode '{}': must be at most 0777",
                        other
                    ));
                }
                Ok(SharedRepository::Mode(mode))
            }
        }
    }
}

impl TryFrom<String> for SharedRepository {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SharedRepository> for String {
    fn from(value: SharedRepository) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SharedRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SharedRepository::Umask => write!(f, "umask"),
            SharedRepository::Group => write!(f, "group"),
            SharedRepository::All => write!(f, "all"),
            SharedRepository::Mode(mode) => write!(f, "{:04o}", mode),
        }
    }
}

/// Compute the permission bits `mode` should have under `shared`.
///
/// Write bits are only granted if the owner can write, and execute bits
/// mirror read bits if the owner can execute.
pub fn calc_shared_perm(mode: u32, shared: SharedRepository) -> u32 {
    let (mut tweak, replace) = match shared {
        SharedRepository::Umask => return mode,
        SharedRepository::Group => (PERM_GROUP, false),
        SharedRepository::All => (PERM_EVERYBODY, false),
        SharedRepository::Mode(bits) => (bits, true),
    };

    if mode & 0o200 == 0 {
        tweak &= !0o222;
    }
    if mode & 0o100 != 0 {
        tweak |= (tweak & 0o444) >> 2;
    }

    if replace {
        (mode & !0o777) | tweak
    } else {
        mode | tweak
    }
}

/// Apply the `shared` permission policy to the file at `path`.
pub fn adjust_shared_perm(path: &Path, shared: SharedRepository) -> io::Result<()> {
    if shared == SharedRepository::Umask {
        return Ok(());
    }
    let metadata = fs::metadata(path)?;
    let old_mode = metadata.permissions().mode();
    let new_mode = calc_shared_perm(old_mode, shared);
    if new_mode != old_mode {
        fs::set_permissions(path, fs::Permissions::from_mode(new_mode & 0o7777))?;
    }
    Ok(())
}
