//! Record store trait and implementations.

use crate::error::StoreResult;
use crate::record::LocalRecord;
use parking_lot::RwLock;
use shelf_protocol::RecordId;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Keyed storage for mirrored records.
///
/// Implementations must provide atomic get/put semantics: a `put` is
/// either fully visible to subsequent reads or not at all. The sync
/// engine relies on this as the only shared mutable state between its
/// components.
pub trait RecordStore: Send + Sync {
    /// Fetches one record by identifier.
    fn get(&self, id: &RecordId) -> StoreResult<Option<LocalRecord>>;

    /// Returns all records, ordered by identifier.
    fn get_all(&self) -> StoreResult<Vec<LocalRecord>>;

    /// Inserts or replaces a record.
    fn put(&self, record: LocalRecord) -> StoreResult<()>;

    /// Returns the number of stored records.
    fn count(&self) -> StoreResult<usize>;
}

/// An in-memory record store for tests and ephemeral use.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<RecordId, LocalRecord>>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, id: &RecordId) -> StoreResult<Option<LocalRecord>> {
        Ok(self.records.read().get(id).cloned())
    }

    fn get_all(&self) -> StoreResult<Vec<LocalRecord>> {
        Ok(self.records.read().values().cloned().collect())
    }

    fn put(&self, record: LocalRecord) -> StoreResult<()> {
        self.records.write().insert(record.id().clone(), record);
        Ok(())
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.records.read().len())
    }
}

/// A file-backed record store.
///
/// Holds the full record map in memory and rewrites the backing JSON
/// file atomically (write to a temporary sibling, then rename) on every
/// `put`. Suited to the collection sizes a single reading client
/// mirrors; not a general-purpose database.
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    records: RwLock<BTreeMap<RecordId, LocalRecord>>,
}

impl FileRecordStore {
    /// Opens or creates a record store at the given path, creating
    /// parent directories if needed.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let records = if path.exists() {
            let bytes = fs::read(path)?;
            let list: Vec<LocalRecord> = serde_json::from_slice(&bytes)?;
            list.into_iter().map(|r| (r.id().clone(), r)).collect()
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            records: RwLock::new(records),
        })
    }

    /// Returns the path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &BTreeMap<RecordId, LocalRecord>) -> StoreResult<()> {
        let list: Vec<&LocalRecord> = records.values().collect();
        let bytes = serde_json::to_vec(&list)?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl RecordStore for FileRecordStore {
    fn get(&self, id: &RecordId) -> StoreResult<Option<LocalRecord>> {
        Ok(self.records.read().get(id).cloned())
    }

    fn get_all(&self) -> StoreResult<Vec<LocalRecord>> {
        Ok(self.records.read().values().cloned().collect())
    }

    fn put(&self, record: LocalRecord) -> StoreResult<()> {
        let mut records = self.records.write();
        records.insert(record.id().clone(), record);
        self.persist(&records)
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.records.read().len())
    }
}
