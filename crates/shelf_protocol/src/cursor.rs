//! Incremental pull cursor.

use crate::record::{RecordId, RemoteRecord};
use serde::{Deserialize, Serialize};

/// Position marker for incremental pulls.
///
/// A cursor is the `(update-timestamp, identifier)` pair of the
/// most-recently-updated record known locally. It is always rederived
/// from the local store and never persisted independently.
///
/// # Ordering
///
/// Cursors order by update timestamp first, then by identifier, so the
/// maximum cursor over a set of records is the record with the greatest
/// timestamp, ties broken by the greatest identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Update timestamp of the most-recently-known record.
    pub updated_at: i64,
    /// Identifier of that record.
    pub id: RecordId,
}

impl SyncCursor {
    /// Creates a cursor.
    pub fn new(updated_at: i64, id: impl Into<RecordId>) -> Self {
        Self {
            updated_at,
            id: id.into(),
        }
    }

    /// The cursor position of a single record.
    pub fn of(record: &RemoteRecord) -> Self {
        Self {
            updated_at: record.updated_at,
            id: record.id.clone(),
        }
    }

    /// Derives the cursor from a set of `(updated_at, id)` pairs.
    ///
    /// Returns `None` for an empty set (bootstrap: the first pull is
    /// issued without cursor parameters).
    pub fn derive<I>(positions: I) -> Option<Self>
    where
        I: IntoIterator<Item = (i64, RecordId)>,
    {
        positions
            .into_iter()
            .map(|(updated_at, id)| Self { updated_at, id })
            .max()
    }
}
