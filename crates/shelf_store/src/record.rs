//! The mirrored record entity.

use serde::{Deserialize, Serialize};
use shelf_protocol::{ContentKind, RecordId, RemoteRecord};

/// Client-owned state for one content stream of a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamState {
    /// Content-version timestamp of the locally stored copy, if any.
    #[serde(default)]
    pub version: Option<i64>,
    /// When the locally stored copy was last accessed.
    #[serde(default)]
    pub last_accessed: Option<i64>,
}

impl StreamState {
    /// Returns true if no local copy is recorded for this stream.
    pub fn is_empty(&self) -> bool {
        self.version.is_none() && self.last_accessed.is_none()
    }

    /// Clears the recorded local copy.
    pub fn clear(&mut self) {
        self.version = None;
        self.last_accessed = None;
    }
}

/// A mirrored document record.
///
/// Pairs the server-owned [`RemoteRecord`] with the client-owned fields:
/// per-stream download state and the reading-progress token.
///
/// # Merge Invariant
///
/// On every pull merge the server-owned subset is fully overwritten and
/// the client-owned subset is carried forward unchanged. Use
/// [`LocalRecord::absorb_remote`] for existing records and
/// [`LocalRecord::from_remote`] for newly seen ones; nothing else may
/// touch the server-owned fields during a merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Server-owned fields, overwritten wholesale on merge.
    #[serde(flatten)]
    pub remote: RemoteRecord,
    /// Free-text reading-progress token.
    #[serde(default)]
    pub progress: Option<String>,
    /// Download state of the primary content stream.
    #[serde(default)]
    pub primary: StreamState,
    /// Download state of the source content stream.
    #[serde(default)]
    pub source: StreamState,
}

impl LocalRecord {
    /// Creates a local record for a remotely received record with no
    /// client-owned state yet.
    pub fn from_remote(remote: RemoteRecord) -> Self {
        Self {
            remote,
            progress: None,
            primary: StreamState::default(),
            source: StreamState::default(),
        }
    }

    /// Overwrites the server-owned fields, preserving client-owned state.
    pub fn absorb_remote(&mut self, remote: RemoteRecord) {
        self.remote = remote;
    }

    /// The record identifier.
    pub fn id(&self) -> &RecordId {
        &self.remote.id
    }

    /// Download state for the given stream.
    pub fn stream(&self, kind: ContentKind) -> &StreamState {
        match kind {
            ContentKind::Primary => &self.primary,
            ContentKind::Source => &self.source,
        }
    }

    /// Mutable download state for the given stream.
    pub fn stream_mut(&mut self, kind: ContentKind) -> &mut StreamState {
        match kind {
            ContentKind::Primary => &mut self.primary,
            ContentKind::Source => &mut self.source,
        }
    }

    /// Returns true if the stored copy of the given stream is missing or
    /// does not match the server's content version.
    pub fn stream_stale(&self, kind: ContentKind) -> bool {
        self.stream(kind).version != Some(self.remote.content_updated_at)
    }
}
