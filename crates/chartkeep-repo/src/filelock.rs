//! Advisory file lock guarding the repository file
//!
//! The lock lives in a sibling `.lock` file and is taken with `fs2`
//! (`flock` on unix, `LockFileEx` on windows). It only excludes writers that
//! go through [`FileLock`]; anything editing `repositories.yaml` directly is
//! not stopped.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{RepoError, Result};

/// Lock file path for a repository file: the extension is replaced by `.lock`
pub fn lock_path_for(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext == "lock" => {
            let mut raw = path.as_os_str().to_os_string();
            raw.push(".lock");
            PathBuf::from(raw)
        }
        _ => path.with_extension("lock"),
    }
}

/// A named, cross-process lock
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Lock guarding the given repository file
    pub fn for_file(path: &Path) -> Self {
        Self::new(lock_path_for(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to take the lock once
    ///
    /// Returns `Ok(None)` when another holder has it.
    pub fn try_lock(&self) -> Result<Option<LockGuard>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.lock_error(e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!("Acquired lock {}", self.path.display());
                Ok(Some(LockGuard {
                    file: Some(file),
                    path: self.path.clone(),
                }))
            }
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(self.lock_error(e)),
        }
    }

    /// Poll for the lock every `poll_interval` until `timeout` elapses
    ///
    /// Waiting happens on the tokio timer, so dropping the returned future
    /// abandons the attempt.
    pub async fn lock_with_timeout(
        &self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<LockGuard> {
        let deadline = Instant::now()
            .checked_add(timeout)
            .ok_or_else(|| RepoError::InvalidConfig {
                message: format!("lock timeout {:?} is out of range", timeout),
            })?;

        loop {
            if let Some(guard) = self.try_lock()? {
                return Ok(guard);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RepoError::LockTimeout {
                    path: self.path.clone(),
                    seconds: timeout.as_secs(),
                });
            }

            tracing::debug!("Waiting for lock {}", self.path.display());
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }

    fn lock_error(&self, source: std::io::Error) -> RepoError {
        RepoError::Lock {
            path: self.path.clone(),
            source,
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Exclusive hold on a [`FileLock`]
///
/// Unlocked by [`LockGuard::release`], or on drop for every other exit path.
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlock now and report failure to the caller
    pub fn release(mut self) -> std::io::Result<()> {
        match self.file.take() {
            Some(file) => {
                FileExt::unlock(&file)?;
                tracing::debug!("Released lock {}", self.path.display());
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                tracing::warn!("Failed to unlock {}: {}", self.path.display(), e);
            }
        }
    }
}
