//! Single-writer advisory lock on a `<snapshot>.lock` sidecar file.
//!
//! Readers never lock: they only ever see fully committed snapshot files.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{CanonError, Result};

const DEFAULT_LOCK_TIMEOUT_MS: u64 = 250;
const DEFAULT_RETRY_MS: u64 = 10;

#[derive(Debug, Clone)]
pub struct LockSettings {
    /// How long to wait for a competing writer before giving up.
    pub timeout_ms: u64,
    pub retry_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            retry_ms: DEFAULT_RETRY_MS,
        }
    }
}

/// Exclusive writer lock. Released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Sidecar lock path for a snapshot file.
    #[must_use]
    pub fn lock_path(snapshot: &Path) -> PathBuf {
        let mut name = snapshot.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Acquire the writer lock for `snapshot`, retrying until
    /// `settings.timeout_ms` has elapsed.
    pub fn acquire(snapshot: &Path, settings: &LockSettings) -> Result<Self> {
        let deadline = Instant::now() + Duration::from_millis(settings.timeout_ms);
        loop {
            if let Some(lock) = Self::try_acquire(snapshot)? {
                return Ok(lock);
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    target: "canon::lock",
                    path = %snapshot.display(),
                    timeout_ms = settings.timeout_ms,
                    "writer lock unavailable"
                );
                return Err(CanonError::Lock(format!(
                    "another writer holds {} (waited {} ms)",
                    Self::lock_path(snapshot).display(),
                    settings.timeout_ms
                )));
            }
            thread::sleep(Duration::from_millis(settings.retry_ms.max(1)));
        }
    }

    /// Single non-blocking attempt. `Ok(None)` means the lock is held
    /// elsewhere.
    pub fn try_acquire(snapshot: &Path) -> Result<Option<Self>> {
        let path = Self::lock_path(snapshot);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!(target: "canon::lock", path = %path.display(), "writer lock acquired");
                Ok(Some(Self { file, path }))
            }
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(target: "canon::lock", path = %self.path.display(), %err, "unlock failed");
        }
    }
}
