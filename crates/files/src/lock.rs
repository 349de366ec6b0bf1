//! Advisory lock per version family.
//!
//! Version resolution reads the directory and picks the first free number,
//! so two writers resolving at once can pick the same one. Holding a
//! [`VersionLock`] across resolve, backup and write serializes writers that
//! cooperate by taking it too. Nothing stops a writer that doesn't.
//!
//! The lock is a file named `.<base><ext>.lock` in the family's directory,
//! created exclusively and removed on drop. A lock left behind by a crashed
//! process has to be removed by hand.

use crate::error::{ErrorKind, Result};
use crate::version::VersionedFile;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default time to wait for a contended lock.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Held lock on one version family. Released when dropped.
#[derive(Debug)]
pub struct VersionLock {
    path: PathBuf,
}
impl VersionLock {
    /// Lock file location for the family `path` belongs to.
    pub fn lock_path(path: impl AsRef<Path>) -> PathBuf {
        let family = VersionedFile::parse(path);
        family.directory.join(format!(".{}{}.lock", family.base_name, family.extension))
    }

    /// Take the lock for the family `path` belongs to, waiting up to `timeout`.
    ///
    /// # Errors
    /// [`Locked`](ErrorKind::Locked) if another holder keeps it past the
    /// timeout; I/O errors creating the lock file otherwise.
    pub fn acquire(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let lock_path = Self::lock_path(path);
        let deadline = Instant::now() + timeout;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
                Ok(mut file) => {
                    // Holder's pid, for whoever has to clean up a stale lock.
                    let _ = writeln!(file, "{}", std::process::id());
                    tracing::debug!(lock = %lock_path.display(), "Acquired version lock");
                    return Ok(Self { path: lock_path });
                },
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        tracing::warn!(lock = %lock_path.display(), "Version family still locked");
                        exn::bail!(ErrorKind::Locked(lock_path));
                    }
                    thread::sleep(POLL_INTERVAL);
                },
                Err(err) => exn::bail!(ErrorKind::io(err, lock_path)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
impl Drop for VersionLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %err, "Failed to release version lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_is_per_family() {
        let a = VersionLock::lock_path("/show/SH010_comp_v003.nk");
        let b = VersionLock::lock_path("/show/SH010_comp.nk");
        assert_eq!(a, Path::new("/show/.SH010_comp.nk.lock"));
        assert_eq!(a, b);
        assert_ne!(a, VersionLock::lock_path("/show/SH010_comp.hip"));
    }

    #[test]
    fn test_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.nk");
        let lock = VersionLock::acquire(&target, DEFAULT_TIMEOUT).unwrap();
        assert!(lock.path().exists());
        let path = lock.path().to_path_buf();
        drop(lock);
        assert!(!path.exists());
        VersionLock::acquire(&target, DEFAULT_TIMEOUT).unwrap();
    }

    #[test]
    fn test_contended_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a_v001.nk");
        let _held = VersionLock::acquire(&target, DEFAULT_TIMEOUT).unwrap();
        let err = VersionLock::acquire(dir.path().join("a_v002.nk"), Duration::from_millis(120)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Locked(_)));
        assert!(err.is_retryable());
    }
}
