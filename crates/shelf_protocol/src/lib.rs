//! # Shelf Protocol
//!
//! Wire protocol types for the Shelf sync client.
//!
//! This crate provides:
//! - `RemoteRecord` for the server-owned view of a document
//! - `PullPage` / `PageMeta` for paginated pull responses
//! - `SyncCursor` for incremental pull positioning
//! - `PendingUpdate` for client-originated mutations and their wire mapping
//! - `ContentKind` for the two per-record content streams
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod kind;
mod record;
mod update;

pub use cursor::SyncCursor;
pub use kind::{ContentKind, SOURCE_CONTENT_TYPE};
pub use record::{PageMeta, PullPage, RecordId, RemoteRecord, MAX_PAGE_SIZE};
pub use update::{PendingUpdate, UpdateMethod, UpdateRequest};
