//! Unique file names from `XXXXXX` templates.

use rand::Rng;
use std::ffi::OsStr;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

const PLACEHOLDER: &[u8] = b"XXXXXX";
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Replace the `XXXXXX` that precedes the last `suffix_len` bytes of
/// `template` with random letters and digits.
pub fn fill_template<R: Rng + ?Sized>(
    template: &Path,
    suffix_len: usize,
    rng: &mut R,
) -> io::Result<PathBuf> {
    let bytes = template.as_os_str().as_bytes();
    let invalid = || {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "template '{}' must contain XXXXXX before a {}-byte suffix",
                template.display(),
                suffix_len
            ),
        )
    };

    let end = bytes.len().checked_sub(suffix_len).ok_or_else(invalid)?;
    let start = end.checked_sub(PLACEHOLDER.len()).ok_or_else(invalid)?;
    if &bytes[start..end] != PLACEHOLDER {
        return Err(invalid());
    }

    let mut filled = bytes.to_vec();
    for byte in &mut filled[start..end] {
        *byte = LETTERS[rng.random_range(0..LETTERS.len())];
    }
    Ok(PathBuf::from(OsStr::from_bytes(&filled)))
}
