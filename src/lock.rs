//! Exclusive writer lock
//!
//! Every mutating operation reads the whole directory, computes a new layout
//! and writes it back, so only one may run at a time. The lock is a mutex for
//! writers inside this process plus, for on-disk stores, an advisory file
//! lock for writers in other processes.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Writer lock shared by all mutating operations of one handler
#[derive(Debug)]
pub struct StoreLock {
    mutex: Mutex<()>,
    file: Option<(PathBuf, File)>,
}

/// Held for the duration of one mutating operation
#[derive(Debug)]
pub struct WriteGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    file: Option<&'a File>,
}

impl StoreLock {
    /// Lock that only excludes writers inside this process
    pub fn in_process() -> Self {
        Self {
            mutex: Mutex::new(()),
            file: None,
        }
    }

    /// Lock that also takes an advisory lock on `path`
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::lock(format!("Failed to open lock file {}: {}", path.display(), e)))?;

        Ok(Self {
            mutex: Mutex::new(()),
            file: Some((path, file)),
        })
    }

    /// Path of the lock file, if any
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|(path, _)| path.as_path())
    }

    /// Block until the lock is held
    pub fn acquire(&self) -> Result<WriteGuard<'_>> {
        let guard = self.mutex.lock();
        let file = match &self.file {
            Some((path, file)) => {
                FileExt::lock_exclusive(file).map_err(|e| {
                    Error::lock(format!("Failed to lock {}: {}", path.display(), e))
                })?;
                Some(file)
            }
            None => None,
        };

        Ok(WriteGuard {
            _guard: guard,
            file,
        })
    }

    /// Take the lock if nobody holds it, `None` otherwise
    pub fn try_acquire(&self) -> Result<Option<WriteGuard<'_>>> {
        let Some(guard) = self.mutex.try_lock() else {
            return Ok(None);
        };

        let file = match &self.file {
            Some((path, file)) => match FileExt::try_lock_exclusive(file) {
                Ok(()) => Some(file),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock
                    || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
                {
                    return Ok(None)
                }
                Err(e) => {
                    return Err(Error::lock(format!("Failed to lock {}: {}", path.display(), e)))
                }
            },
            None => None,
        };

        Ok(Some(WriteGuard {
            _guard: guard,
            file,
        }))
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if let Some(file) = self.file {
            if let Err(e) = FileExt::unlock(file) {
                tracing::warn!(error = %e, "failed to release store lock");
            }
        }
    }
}
