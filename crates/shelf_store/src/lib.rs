//! # Shelf Store
//!
//! Record, blob, and queue storage for the Shelf sync client.
//!
//! The sync engine consumes storage through three traits so that hosts
//! can substitute their own persistence:
//!
//! - [`RecordStore`] - keyed get/put/list over mirrored records
//! - [`BlobStore`] - content bytes addressed by stream kind + record id
//! - [`QueueStore`] - durable persistence for the pending-update list
//!
//! ## Available Implementations
//!
//! - `Memory*` - for unit and integration tests
//! - `File*` - file-backed, atomic write-then-rename, used by the CLI
//!
//! The mirrored entity itself, [`LocalRecord`], lives here too: it pairs
//! the server-owned record with the client-owned fields and enforces the
//! merge invariant (remote fields overwritten, local fields carried
//! forward).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod blob_store;
mod error;
mod queue_store;
mod record;
mod record_store;

pub use blob_store::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use error::{StoreError, StoreResult};
pub use queue_store::{FileQueueStore, MemoryQueueStore, QueueStore};
pub use record::{LocalRecord, StreamState};
pub use record_store::{FileRecordStore, MemoryRecordStore, RecordStore};
