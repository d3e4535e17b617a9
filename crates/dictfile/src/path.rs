//! Anonymous backing-file naming
//!
//! Temp-backed stores need a fresh file nobody else owns. `anonymous_path`
//! is a pure candidate generator; `create_anonymous` reserves a candidate
//! on disk with `create_new` and retries on collision.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use rand::RngCore;
use tracing::trace;

use crate::error::{Error, Result};

/// Extension given to anonymous backing files.
pub(crate) const TEMP_EXTENSION: &str = "tmp";

/// Collision retries before giving up on a directory.
const MAX_ATTEMPTS: u32 = 16;

/// Produce a random candidate path in `dir` with the given extension.
pub(crate) fn anonymous_path(dir: &Path, ext: &str) -> PathBuf {
    let mut raw = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut raw);
    dir.join(format!("dictfile-{}.{ext}", hex::encode(raw)))
}

/// Reserve a fresh anonymous file in `dir`, retrying while candidates
/// collide with existing files.
pub(crate) fn create_anonymous(dir: &Path, ext: &str) -> Result<PathBuf> {
    for _ in 0..MAX_ATTEMPTS {
        let candidate = anonymous_path(dir, ext);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(_) => {
                trace!("Reserved anonymous backing file: {:?}", candidate);
                return Ok(candidate);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("could not find a free anonymous file name in {}", dir.display()),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_carry_the_extension() {
        let path = anonymous_path(Path::new("/somewhere"), TEMP_EXTENSION);
        assert_eq!(path.extension().and_then(|s| s.to_str()), Some("tmp"));
        assert!(path.starts_with("/somewhere"));
    }

    #[test]
    fn candidates_differ_between_calls() {
        let dir = Path::new("/somewhere");
        assert_ne!(
            anonymous_path(dir, TEMP_EXTENSION),
            anonymous_path(dir, TEMP_EXTENSION)
        );
    }

    #[test]
    fn reserved_files_exist_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_anonymous(dir.path(), TEMP_EXTENSION).unwrap();
        assert!(path.exists());
        let other = create_anonymous(dir.path(), TEMP_EXTENSION).unwrap();
        assert_ne!(path, other);
    }
}
