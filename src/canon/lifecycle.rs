//! Creating and opening snapshot files.

use std::io;
use std::path::Path;
use std::sync::Arc;

use super::{Canon, SnapshotCell};
use crate::error::{CanonError, Result};
use crate::io::snapshot::{Snapshot, SnapshotCodec};
use crate::lock::{FileLock, LockSettings};
use crate::types::ResolverOptions;

impl Canon {
    /// Create a new, empty snapshot at `path` and hold its writer lock.
    pub fn create<P: AsRef<Path>>(path: P, options: ResolverOptions) -> Result<Self> {
        Self::create_with(path, options, LockSettings::default())
    }

    pub fn create_with<P: AsRef<Path>>(
        path: P,
        options: ResolverOptions,
        lock_settings: LockSettings,
    ) -> Result<Self> {
        let path = path.as_ref();
        options.validate()?;
        let lock = FileLock::acquire(path, &lock_settings)?;
        if path.exists() {
            return Err(CanonError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            )));
        }
        let snapshot = Snapshot::empty(options);
        SnapshotCodec::write(path, &snapshot)?;
        tracing::info!(target: "canon::snapshot", path = %path.display(), "snapshot created");
        Ok(Self {
            path: path.to_path_buf(),
            lock: Some(lock),
            lock_settings,
            cell: SnapshotCell::new(snapshot),
        })
    }

    /// Open an existing snapshot for writing.
    ///
    /// Fails with [`CanonError::Lock`] when another writer holds the file,
    /// and with [`CanonError::ChecksumMismatch`] or
    /// [`CanonError::InvalidSnapshot`] when the file is damaged.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, LockSettings::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, lock_settings: LockSettings) -> Result<Self> {
        let path = path.as_ref();
        let lock = FileLock::acquire(path, &lock_settings)?;
        let snapshot = SnapshotCodec::read(path)?;
        tracing::info!(
            target: "canon::snapshot",
            path = %path.display(),
            generation = snapshot.generation,
            entities = snapshot.store.len(),
            "snapshot opened"
        );
        Ok(Self {
            path: path.to_path_buf(),
            lock: Some(lock),
            lock_settings,
            cell: SnapshotCell::new(snapshot),
        })
    }

    /// Open without taking the writer lock. Batches are refused.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let snapshot = SnapshotCodec::read(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            lock: None,
            lock_settings: LockSettings::default(),
            cell: SnapshotCell::new(snapshot),
        })
    }

    /// Re-read the file and publish it if a newer generation was committed
    /// since this handle loaded. Returns whether anything changed.
    pub fn reload(&self) -> Result<bool> {
        let current = self.cell.load().generation;
        let snapshot = SnapshotCodec::read(&self.path)?;
        if snapshot.generation <= current {
            return Ok(false);
        }
        tracing::debug!(
            target: "canon::snapshot",
            from = current,
            to = snapshot.generation,
            "reloaded newer snapshot"
        );
        self.cell.publish(Arc::new(snapshot));
        Ok(true)
    }
}
