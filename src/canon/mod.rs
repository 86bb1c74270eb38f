//! `Canon` handle orchestrating the snapshot lifecycle and write batches.

mod batch;
mod lifecycle;

pub use batch::Batch;

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::Result;
use crate::export;
use crate::io::snapshot::Snapshot;
use crate::lock::{FileLock, LockSettings};
use crate::query::QueryService;
use crate::types::ResolverOptions;

/// Shared slot holding the last committed snapshot.
///
/// Cloning is cheap and every clone observes later publishes, so readers on
/// other threads can hold one and always query the latest completed commit.
#[derive(Debug, Clone)]
pub struct SnapshotCell {
    inner: Arc<RwLock<Arc<Snapshot>>>,
}

impl SnapshotCell {
    #[must_use]
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    /// Current snapshot. The returned `Arc` stays valid across later
    /// publishes.
    #[must_use]
    pub fn load(&self) -> Arc<Snapshot> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    #[must_use]
    pub fn query(&self) -> QueryService {
        QueryService::new(self.load())
    }

    pub(crate) fn publish(&self, snapshot: Arc<Snapshot>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = snapshot;
    }
}

/// Primary handle over one snapshot file.
///
/// A writable handle holds the exclusive writer lock for its whole lifetime;
/// mutations go through [`Canon::begin_batch`]. A read-only handle takes no
/// lock and can [`Canon::reload`] to pick up commits made elsewhere.
pub struct Canon {
    pub(crate) path: PathBuf,
    pub(crate) lock: Option<FileLock>,
    pub(crate) lock_settings: LockSettings,
    pub(crate) cell: SnapshotCell,
}

impl Canon {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.lock.is_none()
    }

    #[must_use]
    pub fn lock_settings(&self) -> &LockSettings {
        &self.lock_settings
    }

    /// Resolver options persisted with the snapshot.
    #[must_use]
    pub fn options(&self) -> ResolverOptions {
        self.cell.load().options.clone()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.cell.load().generation
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.cell.load()
    }

    /// A reader-side handle that follows future commits.
    #[must_use]
    pub fn cell(&self) -> SnapshotCell {
        self.cell.clone()
    }

    /// Query service over the current snapshot. It keeps serving that
    /// snapshot even if a later batch commits.
    #[must_use]
    pub fn query(&self) -> QueryService {
        self.cell.query()
    }

    /// Write `entities.json`, `aliases.json`, `graph.json` and `review.json`
    /// for the current snapshot into `dir`.
    pub fn export_artifacts(&self, dir: &Path) -> Result<()> {
        export::write_artifacts(&self.cell.load(), dir)
    }
}
