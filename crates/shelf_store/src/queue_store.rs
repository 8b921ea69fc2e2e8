//! Durable persistence for the pending-update list.

use crate::error::StoreResult;
use parking_lot::Mutex;
use shelf_protocol::PendingUpdate;
use std::fs;
use std::path::{Path, PathBuf};

/// Durable key-value persistence for the pending-update list.
///
/// The update queue persists its entire list on every change; `load` is
/// called once at startup before any mutation may be queued or sent.
pub trait QueueStore: Send + Sync {
    /// Loads the persisted list, empty if nothing was ever saved.
    fn load(&self) -> StoreResult<Vec<PendingUpdate>>;

    /// Replaces the persisted list.
    fn save(&self, updates: &[PendingUpdate]) -> StoreResult<()>;
}

/// An in-memory queue store for tests.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    updates: Mutex<Vec<PendingUpdate>>,
}

impl MemoryQueueStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the persisted list, for assertions.
    pub fn snapshot(&self) -> Vec<PendingUpdate> {
        self.updates.lock().clone()
    }
}

impl QueueStore for MemoryQueueStore {
    fn load(&self) -> StoreResult<Vec<PendingUpdate>> {
        Ok(self.updates.lock().clone())
    }

    fn save(&self, updates: &[PendingUpdate]) -> StoreResult<()> {
        *self.updates.lock() = updates.to_vec();
        Ok(())
    }
}

/// A file-backed queue store.
///
/// The list is stored as one JSON array, rewritten atomically (write to
/// a temporary sibling, then rename) on every save.
#[derive(Debug)]
pub struct FileQueueStore {
    path: PathBuf,
}

impl FileQueueStore {
    /// Opens a queue store at the given path, creating parent
    /// directories if needed.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Returns the path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl QueueStore for FileQueueStore {
    fn load(&self) -> StoreResult<Vec<PendingUpdate>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn save(&self, updates: &[PendingUpdate]) -> StoreResult<()> {
        let bytes = serde_json::to_vec(updates)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
