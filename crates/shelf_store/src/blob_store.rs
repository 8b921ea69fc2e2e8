//! Blob store trait and implementations.

use crate::error::StoreResult;
use parking_lot::RwLock;
use shelf_protocol::{ContentKind, RecordId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Content-addressed storage for downloaded document bytes.
///
/// Blobs are addressed by stream kind plus record identifier. `delete`
/// is idempotent: removing a missing blob succeeds.
pub trait BlobStore: Send + Sync {
    /// Returns true if a blob is stored for the given stream.
    fn exists(&self, kind: ContentKind, id: &RecordId) -> StoreResult<bool>;

    /// Stores a blob, replacing any existing one.
    fn write(&self, kind: ContentKind, id: &RecordId, bytes: &[u8]) -> StoreResult<()>;

    /// Reads a blob, if stored.
    fn read(&self, kind: ContentKind, id: &RecordId) -> StoreResult<Option<Vec<u8>>>;

    /// Removes a blob if present.
    fn delete(&self, kind: ContentKind, id: &RecordId) -> StoreResult<()>;
}

/// An in-memory blob store for tests.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<(ContentKind, RecordId), Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns true if no blobs are stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn exists(&self, kind: ContentKind, id: &RecordId) -> StoreResult<bool> {
        Ok(self.blobs.read().contains_key(&(kind, id.clone())))
    }

    fn write(&self, kind: ContentKind, id: &RecordId, bytes: &[u8]) -> StoreResult<()> {
        self.blobs.write().insert((kind, id.clone()), bytes.to_vec());
        Ok(())
    }

    fn read(&self, kind: ContentKind, id: &RecordId) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(&(kind, id.clone())).cloned())
    }

    fn delete(&self, kind: ContentKind, id: &RecordId) -> StoreResult<()> {
        self.blobs.write().remove(&(kind, id.clone()));
        Ok(())
    }
}

/// A file-backed blob store.
///
/// Blobs are laid out as `<root>/<kind>/<id>`; record identifiers are
/// used as file names verbatim. Writes go to a temporary sibling and are
/// renamed into place, so a crashed write never leaves a partial blob.
#[derive(Debug)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Opens a blob store rooted at the given directory, creating it if
    /// needed.
    pub fn open(root: &Path) -> StoreResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, kind: ContentKind, id: &RecordId) -> PathBuf {
        self.root.join(kind.as_str()).join(id.as_str())
    }
}

impl BlobStore for FileBlobStore {
    fn exists(&self, kind: ContentKind, id: &RecordId) -> StoreResult<bool> {
        Ok(self.blob_path(kind, id).exists())
    }

    fn write(&self, kind: ContentKind, id: &RecordId, bytes: &[u8]) -> StoreResult<()> {
        let path = self.blob_path(kind, id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn read(&self, kind: ContentKind, id: &RecordId) -> StoreResult<Option<Vec<u8>>> {
        let path = self.blob_path(kind, id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(&path)?))
    }

    fn delete(&self, kind: ContentKind, id: &RecordId) -> StoreResult<()> {
        let path = self.blob_path(kind, id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_lifecycle() {
        let store = MemoryBlobStore::new();
        let id = RecordId::from("r1");

        assert!(!store.exists(ContentKind::Primary, &id).unwrap());

        store.write(ContentKind::Primary, &id, b"payload").unwrap();
        assert!(store.exists(ContentKind::Primary, &id).unwrap());
        assert_eq!(
            store.read(ContentKind::Primary, &id).unwrap(),
            Some(b"payload".to_vec())
        );

        // Streams are independent addresses.
        assert!(!store.exists(ContentKind::Source, &id).unwrap());

        store.delete(ContentKind::Primary, &id).unwrap();
        assert!(!store.exists(ContentKind::Primary, &id).unwrap());

        // Deleting a missing blob is fine.
        store.delete(ContentKind::Primary, &id).unwrap();
    }

    #[test]
    fn file_store_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        let id = RecordId::from("r1");

        store.write(ContentKind::Source, &id, b"epub bytes").unwrap();
        assert!(store.exists(ContentKind::Source, &id).unwrap());
        assert_eq!(
            store.read(ContentKind::Source, &id).unwrap(),
            Some(b"epub bytes".to_vec())
        );

        // Overwrite replaces.
        store.write(ContentKind::Source, &id, b"v2").unwrap();
        assert_eq!(
            store.read(ContentKind::Source, &id).unwrap(),
            Some(b"v2".to_vec())
        );

        store.delete(ContentKind::Source, &id).unwrap();
        assert!(!store.exists(ContentKind::Source, &id).unwrap());
        store.delete(ContentKind::Source, &id).unwrap();
    }

    #[test]
    fn file_store_missing_read_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        assert_eq!(
            store
                .read(ContentKind::Primary, &RecordId::from("nope"))
                .unwrap(),
            None
        );
    }
}
