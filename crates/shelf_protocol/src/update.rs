//! Client-originated mutations and their wire mapping.

use crate::record::RecordId;
use serde::{Deserialize, Serialize};

/// An undelivered client-originated mutation.
///
/// Pending updates are persisted as an ordered list and delivered FIFO.
/// Multiple entries for the same record and type may coexist when
/// created while offline; delivery is idempotent on the server side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingUpdate {
    /// Mark the record read.
    Read {
        /// Target record.
        id: RecordId,
    },
    /// Mark the record unread.
    Unread {
        /// Target record.
        id: RecordId,
    },
    /// Mark the record deleted.
    Delete {
        /// Target record.
        id: RecordId,
    },
    /// Replace the reading-progress token.
    Progress {
        /// Target record.
        id: RecordId,
        /// Opaque progress token.
        token: String,
    },
}

impl PendingUpdate {
    /// The record this mutation targets.
    pub fn record_id(&self) -> &RecordId {
        match self {
            PendingUpdate::Read { id }
            | PendingUpdate::Unread { id }
            | PendingUpdate::Delete { id }
            | PendingUpdate::Progress { id, .. } => id,
        }
    }

    /// Short human-readable name, used in notifications and logs.
    pub fn describe(&self) -> &'static str {
        match self {
            PendingUpdate::Read { .. } => "mark read",
            PendingUpdate::Unread { .. } => "mark unread",
            PendingUpdate::Delete { .. } => "mark deleted",
            PendingUpdate::Progress { .. } => "update progress",
        }
    }

    /// Materializes the delivery request for this mutation.
    pub fn request(&self) -> UpdateRequest {
        match self {
            PendingUpdate::Read { id } => UpdateRequest {
                method: UpdateMethod::Put,
                path: format!("/records/{id}/read"),
                form: None,
            },
            PendingUpdate::Unread { id } => UpdateRequest {
                method: UpdateMethod::Put,
                path: format!("/records/{id}/unread"),
                form: None,
            },
            PendingUpdate::Delete { id } => UpdateRequest {
                method: UpdateMethod::Delete,
                path: format!("/records/{id}"),
                form: None,
            },
            PendingUpdate::Progress { id, token } => UpdateRequest {
                method: UpdateMethod::Put,
                path: format!("/records/{id}/progress"),
                form: Some(vec![("progress", token.clone())]),
            },
        }
    }
}

/// HTTP method used to deliver a pending update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMethod {
    /// `PUT` on a per-record sub-path.
    Put,
    /// `DELETE` on the record path.
    Delete,
}

/// A materialized delivery request.
///
/// Paths are relative to the server base URL. Every delivery carries the
/// bearer credential; form fields, when present, are sent URL-encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    /// HTTP method.
    pub method: UpdateMethod,
    /// Relative request path.
    pub path: String,
    /// Form-encoded body fields, if any.
    pub form: Option<Vec<(&'static str, String)>>,
}
