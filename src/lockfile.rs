//! Single-instance lock file.
//!
//! The lock is an advisory exclusive lock held on the pid file for the
//! daemon's whole lifetime. The kernel drops it when the process exits,
//! so a stale pid file from a crashed run never blocks a restart.

use std::fs::{DirBuilder, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

use crate::config::RUNTIME_STATE_ROOT;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock file {path} is held by another instance")]
    AlreadyRunning { path: PathBuf },
    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An acquired single-instance lock. The exclusive lock on `file` is
/// released when this value is dropped.
#[derive(Debug)]
pub struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    /// Acquire the exclusive instance lock at `path` and record our pid
    /// in it. Fails with `AlreadyRunning` when another live process
    /// holds the lock.
    pub fn acquire(path: &Path) -> Result<LockFile, LockError> {
        ensure_runtime_dir(path)?;

        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .mode(0o644)
            .open(path)
            .map_err(io_err)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                return Err(LockError::AlreadyRunning {
                    path: path.to_path_buf(),
                });
            }
            return Err(io_err(e));
        }

        // The file may hold a stale pid from a previous run.
        file.set_len(0).map_err(io_err)?;
        writeln!(file, "{}", std::process::id()).map_err(io_err)?;
        file.flush().map_err(io_err)?;

        debug!(path = %path.display(), pid = std::process::id(), "acquired instance lock");
        Ok(LockFile {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Create the daemon's runtime-state directory when the lock file lives
/// under it. Paths elsewhere are the administrator's responsibility.
fn ensure_runtime_dir(path: &Path) -> Result<(), LockError> {
    let root = Path::new(RUNTIME_STATE_ROOT);
    if !path.starts_with(root) {
        return Ok(());
    }
    if root.is_dir() {
        return Ok(());
    }
    if root.exists() {
        return Err(LockError::Io {
            path: path.to_path_buf(),
            source: io::Error::other("runtime state root is not a directory"),
        });
    }
    DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(root)
        .map_err(|source| LockError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_writes_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cconfd.pid");
        let lock = LockFile::acquire(&path).unwrap();
        assert_eq!(lock.path(), path);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, format!("{}\n", std::process::id()));
    }

    #[test]
    fn test_second_acquire_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cconfd.pid");
        let _held = LockFile::acquire(&path).unwrap();

        match LockFile::acquire(&path) {
            Err(LockError::AlreadyRunning { path: p }) => assert_eq!(p, path),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_parent_reports_io() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("cconfd.pid");
        match LockFile::acquire(&path) {
            Err(LockError::Io { .. }) => {}
            other => panic!("expected Io error, got {other:?}"),
        }
    }
}
