//! Statistics about sync operations.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the three managers.
#[derive(Debug, Default)]
pub struct EngineStats {
    pages_pulled: AtomicU64,
    records_merged: AtomicU64,
    downloads_completed: AtomicU64,
    downloads_failed: AtomicU64,
    updates_delivered: AtomicU64,
    updates_dropped: AtomicU64,
}

impl EngineStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_page(&self) {
        self.pages_pulled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_records_merged(&self, count: u64) {
        self.records_merged.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_download(&self) {
        self.downloads_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_download_failed(&self) {
        self.downloads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_update_delivered(&self) {
        self.updates_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_update_dropped(&self) {
        self.updates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pages_pulled: self.pages_pulled.load(Ordering::Relaxed),
            records_merged: self.records_merged.load(Ordering::Relaxed),
            downloads_completed: self.downloads_completed.load(Ordering::Relaxed),
            downloads_failed: self.downloads_failed.load(Ordering::Relaxed),
            updates_delivered: self.updates_delivered.load(Ordering::Relaxed),
            updates_dropped: self.updates_dropped.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Pull pages fetched and merged.
    pub pages_pulled: u64,
    /// Records inserted or overwritten by pull merges.
    pub records_merged: u64,
    /// Content downloads committed.
    pub downloads_completed: u64,
    /// Content downloads that failed.
    pub downloads_failed: u64,
    /// Pending updates confirmed by the server.
    pub updates_delivered: u64,
    /// Pending updates dropped on a "resource gone" response.
    pub updates_dropped: u64,
}
