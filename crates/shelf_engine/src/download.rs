//! Content download orchestration and eviction.

use crate::config::SyncConfig;
use crate::error::{EngineError, EngineResult};
use crate::event::{DownloadState, EngineEvent, EventBus};
use crate::session::SessionHandle;
use crate::state::RunState;
use crate::stats::EngineStats;
use crate::transport::RemoteTransport;
use parking_lot::{Mutex, RwLock};
use shelf_protocol::{ContentKind, RecordId, SOURCE_CONTENT_TYPE};
use shelf_store::{BlobStore, RecordStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Runtime state of the two pre-fetch feature toggles.
#[derive(Debug, Clone, Copy)]
struct Toggles {
    prefetch: bool,
    source_prefetch: bool,
}

/// Maintains local copies of per-record content and reclaims space for
/// content no longer needed.
///
/// Candidates are selected after every successful pull, on toggle
/// changes, and on credential set; they are processed oldest-created
/// first, one at a time under a transfer lock, so never more than one
/// network download is in flight. Eviction removes content of deleted
/// records unconditionally and of read records whose content has not
/// been accessed within the retention window.
pub struct DownloadOrchestrator {
    config: Arc<SyncConfig>,
    store: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    transport: Arc<dyn RemoteTransport>,
    events: Arc<EventBus>,
    session: Arc<SessionHandle>,
    stats: Arc<EngineStats>,
    toggles: RwLock<Toggles>,
    state: Mutex<RunState>,
    transfer_lock: tokio::sync::Mutex<()>,
}

impl DownloadOrchestrator {
    /// Creates an orchestrator over the given collaborators; the
    /// toggles start from the configuration.
    pub fn new(
        config: Arc<SyncConfig>,
        store: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        transport: Arc<dyn RemoteTransport>,
        events: Arc<EventBus>,
        session: Arc<SessionHandle>,
        stats: Arc<EngineStats>,
    ) -> Arc<Self> {
        let toggles = Toggles {
            prefetch: config.prefetch_enabled,
            source_prefetch: config.source_prefetch_enabled,
        };
        Arc::new(Self {
            config,
            store,
            blobs,
            transport,
            events,
            session,
            stats,
            toggles: RwLock::new(toggles),
            state: Mutex::new(RunState::Idle),
            transfer_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Enables or disables bulk pre-fetch.
    pub fn set_prefetch(&self, enabled: bool) {
        self.toggles.write().prefetch = enabled;
    }

    /// Enables or disables source-content pre-fetch.
    pub fn set_source_prefetch(&self, enabled: bool) {
        self.toggles.write().source_prefetch = enabled;
    }

    /// Runs one evaluation pass: evict stale content, then download
    /// every qualifying candidate.
    ///
    /// Re-entrant-guarded: a call while a pass is running is a no-op.
    /// The next candidate is recomputed after every completed item, so
    /// records merged mid-pass are picked up; candidates that fail are
    /// skipped for the remainder of the pass and retried on the next
    /// one.
    pub async fn reevaluate(&self) {
        {
            let mut state = self.state.lock();
            if !state.can_start() {
                debug!("evaluation pass already running");
                return;
            }
            *state = RunState::Running;
        }

        if let Err(error) = self.sweep() {
            self.events
                .error(format!("content eviction failed: {error}"));
        }

        let mut attempted: HashSet<(RecordId, ContentKind)> = HashSet::new();
        loop {
            if self
                .session
                .current()
                .is_none_or(|session| session.cancel.is_cancelled())
            {
                break;
            }

            let candidate = match self.next_candidate(&attempted) {
                Ok(candidate) => candidate,
                Err(error) => {
                    self.events
                        .error(format!("candidate selection failed: {error}"));
                    break;
                }
            };
            let Some((id, kind)) = candidate else { break };

            attempted.insert((id.clone(), kind));
            match self.fetch_and_commit(&id, kind).await {
                Ok(()) => {}
                Err(error) if error.is_cancelled() => break,
                Err(error) => {
                    debug!(%id, %kind, "pre-fetch failed: {error}");
                }
            }
        }

        *self.state.lock() = RunState::Idle;
    }

    /// Fetches content on demand (the user opened a document).
    ///
    /// If a fresh local copy exists the network is skipped: the copy's
    /// last-accessed time is touched and "content fetched" is emitted
    /// immediately. Otherwise this runs the same fetch protocol as bulk
    /// pre-fetch for the single item.
    pub async fn request_content(&self, id: &RecordId, kind: ContentKind) -> EngineResult<()> {
        let record = self
            .store
            .get(id)?
            .ok_or_else(|| EngineError::UnknownRecord(id.clone()))?;

        if !record.stream_stale(kind) && self.blobs.exists(kind, id)? {
            let mut record = record;
            record.stream_mut(kind).last_accessed = Some(now_ms());
            self.store.put(record)?;
            self.events.emit(EngineEvent::ContentFetched {
                id: id.clone(),
                kind,
            });
            return Ok(());
        }

        self.fetch_and_commit(id, kind).await
    }

    /// Evicts content no longer needed and clears its per-stream state.
    ///
    /// Runs whenever the local store changes. Content of deleted
    /// records is removed unconditionally; content of read records is
    /// removed once its last access falls outside the retention window.
    pub fn sweep(&self) -> EngineResult<()> {
        let now = now_ms();
        let window = self.config.retention_window.as_millis() as i64;

        for mut record in self.store.get_all()? {
            let mut touched = false;
            for kind in ContentKind::ALL {
                let expired = record.remote.is_deleted
                    || (record.remote.is_read
                        && record
                            .stream(kind)
                            .last_accessed
                            .is_some_and(|at| now - at > window));
                if !expired {
                    continue;
                }

                self.blobs.delete(kind, record.id())?;
                if !record.stream(kind).is_empty() {
                    record.stream_mut(kind).clear();
                    touched = true;
                }
            }
            if touched {
                debug!(id = %record.id(), "evicted stale content");
                self.store.put(record)?;
            }
        }
        Ok(())
    }

    /// Selects the next pre-fetch candidate, oldest created first.
    fn next_candidate(
        &self,
        attempted: &HashSet<(RecordId, ContentKind)>,
    ) -> EngineResult<Option<(RecordId, ContentKind)>> {
        let toggles = *self.toggles.read();
        if !toggles.prefetch {
            return Ok(None);
        }

        let mut records = self.store.get_all()?;
        records.sort_by_key(|record| record.remote.created_at);

        for record in &records {
            if record.remote.is_read || record.remote.is_deleted {
                continue;
            }
            for kind in ContentKind::ALL {
                if kind == ContentKind::Source
                    && !(toggles.source_prefetch
                        && record.remote.content_type == SOURCE_CONTENT_TYPE)
                {
                    continue;
                }
                if !record.stream_stale(kind) {
                    continue;
                }
                let key = (record.id().clone(), kind);
                if attempted.contains(&key) {
                    continue;
                }
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    /// The per-item fetch protocol: status reporting, serialized
    /// transfer, blob write, then the store commit of version and
    /// last-accessed. A failure leaves the recorded version unchanged;
    /// an abort commits nothing.
    async fn fetch_and_commit(&self, id: &RecordId, kind: ContentKind) -> EngineResult<()> {
        self.emit_status(id, kind, DownloadState::Queued, 0, 0);
        let _transfer = self.transfer_lock.lock().await;

        let Some(session) = self.session.current() else {
            self.emit_status(id, kind, DownloadState::Canceled, 0, 0);
            return Err(EngineError::NotAuthenticated);
        };
        if session.cancel.is_cancelled() {
            self.emit_status(id, kind, DownloadState::Canceled, 0, 0);
            return Err(EngineError::Cancelled);
        }

        self.emit_status(id, kind, DownloadState::InProgress, 0, 0);

        let fetched = tokio::select! {
            _ = session.cancel.cancelled() => {
                self.emit_status(id, kind, DownloadState::Canceled, 0, 0);
                return Err(EngineError::Cancelled);
            }
            fetched = self.transport.fetch_content(&session.bearer, id, kind) => fetched,
        };

        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(error) => {
                self.emit_status(id, kind, DownloadState::Error, 0, 0);
                self.stats.record_download_failed();
                return Err(error);
            }
        };

        // An abort landing between response and write commits nothing.
        if session.cancel.is_cancelled() {
            self.emit_status(id, kind, DownloadState::Canceled, 0, 0);
            return Err(EngineError::Cancelled);
        }

        if let Err(error) = self.blobs.write(kind, id, &bytes) {
            self.emit_status(id, kind, DownloadState::Error, 0, 0);
            self.stats.record_download_failed();
            return Err(error.into());
        }

        let total = bytes.len() as u64;
        self.emit_status(id, kind, DownloadState::Done, total, total);
        self.events.emit(EngineEvent::ContentFetched {
            id: id.clone(),
            kind,
        });

        let mut record = self
            .store
            .get(id)?
            .ok_or_else(|| EngineError::UnknownRecord(id.clone()))?;
        let version = record.remote.content_updated_at;
        {
            let stream = record.stream_mut(kind);
            stream.version = Some(version);
            stream.last_accessed = Some(now_ms());
        }
        self.store.put(record)?;
        self.stats.record_download();

        debug!(%id, %kind, total, "content committed");
        Ok(())
    }

    fn emit_status(
        &self,
        id: &RecordId,
        kind: ContentKind,
        state: DownloadState,
        received: u64,
        total: u64,
    ) {
        self.events.emit(EngineEvent::ContentStatus {
            id: id.clone(),
            kind,
            state,
            received,
            total,
        });
    }
}
