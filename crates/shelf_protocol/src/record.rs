//! Remote record and pull page types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of records the server returns per pull page.
///
/// A page of exactly this size signals that further results may be
/// pending; a shorter page terminates the drain.
pub const MAX_PAGE_SIZE: usize = 50;

/// A globally unique, immutable record identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a record ID from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The server-owned view of a document record.
///
/// Every field here is fully overwritten on merge; the client-owned
/// fields (download versions, last-accessed times, progress token) live
/// on the local record type and are carried forward across merges.
///
/// All timestamps are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Globally unique identifier.
    pub id: RecordId,
    /// Document title.
    pub title: String,
    /// Document author, if known.
    #[serde(default)]
    pub author: Option<String>,
    /// MIME type of the document content.
    pub content_type: String,
    /// Whether the record has been read.
    pub is_read: bool,
    /// Whether the record has been deleted on the server.
    pub is_deleted: bool,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last-update timestamp; drives cursor derivation.
    pub updated_at: i64,
    /// Content-version timestamp; changes whenever the content payload does.
    pub content_updated_at: i64,
}

/// Pagination metadata echoed back by the server.
///
/// The server echoes the cursor parameters it received. A mismatch with
/// what the client sent indicates protocol drift and is reported as a
/// warning, never a failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    /// Echoed `after_timestamp` query parameter.
    #[serde(default)]
    pub after_timestamp: Option<i64>,
    /// Echoed `after_id` query parameter.
    #[serde(default)]
    pub after_id: Option<RecordId>,
}

/// One page of a pull response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullPage {
    /// Echoed pagination metadata.
    #[serde(default)]
    pub meta: PageMeta,
    /// Records updated after the requested cursor, oldest first.
    pub result: Vec<RemoteRecord>,
}

impl PullPage {
    /// Returns true if this page signals that more results are pending.
    pub fn is_full(&self) -> bool {
        self.result.len() >= MAX_PAGE_SIZE
    }
}
