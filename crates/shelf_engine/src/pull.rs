//! Incremental pull synchronization.

use crate::config::SyncConfig;
use crate::error::{EngineError, EngineResult};
use crate::event::{EngineEvent, EventBus};
use crate::scheduler::Scheduler;
use crate::session::{Session, SessionHandle};
use crate::state::RunState;
use crate::stats::EngineStats;
use crate::transport::RemoteTransport;
use parking_lot::Mutex;
use shelf_protocol::{PageMeta, RemoteRecord, SyncCursor};
use shelf_store::{LocalRecord, RecordStore};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Brings the local store up to date with the remote authority,
/// incrementally and resumably.
///
/// A synchronization pass drains cursor-ordered pages until the server
/// returns a short page. The cursor is always rederived from the local
/// store, so an aborted drain resumes exactly past the last merged
/// page. Passes reschedule themselves on a fixed interval; clearing
/// the credential aborts the in-flight pass silently and stops the
/// timer.
pub struct PullEngine {
    config: Arc<SyncConfig>,
    store: Arc<dyn RecordStore>,
    transport: Arc<dyn RemoteTransport>,
    events: Arc<EventBus>,
    session: Arc<SessionHandle>,
    stats: Arc<EngineStats>,
    state: Mutex<RunState>,
    timer: Scheduler,
    after_sync: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    this: Weak<PullEngine>,
}

impl PullEngine {
    /// Creates a pull engine over the given collaborators.
    pub fn new(
        config: Arc<SyncConfig>,
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn RemoteTransport>,
        events: Arc<EventBus>,
        session: Arc<SessionHandle>,
        stats: Arc<EngineStats>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            store,
            transport,
            events,
            session,
            stats,
            state: Mutex::new(RunState::Idle),
            timer: Scheduler::new("resync"),
            after_sync: Mutex::new(None),
            this: this.clone(),
        })
    }

    /// Installs the hook invoked after every pass that changed at least
    /// one record (the download orchestrator's re-evaluation trigger).
    pub fn set_after_sync(&self, hook: Box<dyn Fn() + Send + Sync>) {
        *self.after_sync.lock() = Some(hook);
    }

    /// Runs one synchronization pass.
    ///
    /// Re-entrant-guarded: a call while a pass is in flight is a no-op.
    /// Without a credential the call does nothing. Success and failure
    /// both reschedule the next automatic pass; cancellation does not.
    pub async fn synchronize(&self) {
        let Some(session) = self.session.current() else {
            debug!("synchronize skipped: no credential");
            return;
        };

        {
            let mut state = self.state.lock();
            if !state.can_start() {
                debug!("synchronize skipped: pass already in flight");
                return;
            }
            *state = RunState::Running;
        }

        let outcome = self.drain(&session).await;
        *self.state.lock() = RunState::Idle;

        match outcome {
            Ok(changed) => {
                debug!(changed, "synchronization pass complete");
                if changed > 0 {
                    self.events.emit(EngineEvent::RecordsUpdated);
                    if let Some(hook) = &*self.after_sync.lock() {
                        hook();
                    }
                }
                self.reschedule();
            }
            Err(error) if error.is_cancelled() => {
                // Abort is not a failure: nothing reported, nothing rescheduled.
                debug!("synchronization pass cancelled");
            }
            Err(error) => {
                self.events.error(format!("synchronization failed: {error}"));
                self.reschedule();
            }
        }
    }

    /// Stops the automatic resync timer and flags an in-flight pass as
    /// canceling. Called when the credential is cleared.
    pub fn halt(&self) {
        self.timer.cancel();
        let mut state = self.state.lock();
        if *state == RunState::Running {
            *state = RunState::Canceling;
        }
    }

    /// Returns true if an automatic pass is scheduled.
    pub fn is_resync_scheduled(&self) -> bool {
        self.timer.is_scheduled()
    }

    async fn drain(&self, session: &Session) -> EngineResult<u64> {
        let mut changed = 0u64;

        loop {
            if session.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let cursor = self.current_cursor()?;
            debug!(?cursor, "requesting pull page");

            let page = tokio::select! {
                _ = session.cancel.cancelled() => return Err(EngineError::Cancelled),
                page = self.transport.fetch_page(&session.bearer, cursor.as_ref()) => page?,
            };

            // An abort landing between response and merge still merges nothing.
            if session.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            Self::verify_echo(cursor.as_ref(), &page.meta);

            let full = page.is_full();
            changed += self.merge_page(page.result)?;
            self.stats.record_page();

            if !full {
                return Ok(changed);
            }
        }
    }

    /// Derives the pull cursor from the local store, `None` when empty
    /// (bootstrap).
    fn current_cursor(&self) -> EngineResult<Option<SyncCursor>> {
        if self.store.count()? == 0 {
            return Ok(None);
        }
        let positions = self
            .store
            .get_all()?
            .into_iter()
            .map(|record| (record.remote.updated_at, record.remote.id));
        Ok(SyncCursor::derive(positions))
    }

    /// Merges one page into the store, preserving client-owned fields
    /// of records already present.
    fn merge_page(&self, records: Vec<RemoteRecord>) -> EngineResult<u64> {
        let mut merged = 0u64;
        for remote in records {
            let record = match self.store.get(&remote.id)? {
                Some(mut existing) => {
                    existing.absorb_remote(remote);
                    existing
                }
                None => LocalRecord::from_remote(remote),
            };
            self.store.put(record)?;
            merged += 1;
        }
        self.stats.add_records_merged(merged);
        Ok(merged)
    }

    /// Protocol-drift check: the server echoes the cursor parameters it
    /// received; a mismatch is a warning, never a failure.
    fn verify_echo(sent: Option<&SyncCursor>, meta: &PageMeta) {
        let sent_timestamp = sent.map(|c| c.updated_at);
        let sent_id = sent.map(|c| &c.id);
        if meta.after_timestamp != sent_timestamp || meta.after_id.as_ref() != sent_id {
            warn!(
                ?sent,
                echoed = ?meta,
                "server echoed mismatched cursor parameters; merging anyway"
            );
        }
    }

    fn reschedule(&self) {
        let Some(engine) = self.this.upgrade() else {
            return;
        };
        self.timer.schedule(self.config.sync_interval, async move {
            engine.synchronize().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use shelf_protocol::{PullPage, RecordId, MAX_PAGE_SIZE};
    use shelf_store::MemoryRecordStore;
    use std::time::Duration;

    fn remote(id: &str, updated_at: i64) -> RemoteRecord {
        RemoteRecord {
            id: RecordId::from(id),
            title: format!("Title {id}"),
            author: None,
            content_type: "text/html".into(),
            is_read: false,
            is_deleted: false,
            created_at: updated_at,
            updated_at,
            content_updated_at: updated_at,
        }
    }

    fn page(after: Option<&SyncCursor>, records: Vec<RemoteRecord>) -> PullPage {
        PullPage {
            meta: PageMeta {
                after_timestamp: after.map(|c| c.updated_at),
                after_id: after.map(|c| c.id.clone()),
            },
            result: records,
        }
    }

    struct Fixture {
        engine: Arc<PullEngine>,
        store: Arc<MemoryRecordStore>,
        transport: Arc<MockTransport>,
        events: tokio::sync::mpsc::UnboundedReceiver<EngineEvent>,
        session: Arc<SessionHandle>,
    }

    fn fixture() -> Fixture {
        let config = Arc::new(SyncConfig::new("https://shelf.example.com"));
        let store = Arc::new(MemoryRecordStore::new());
        let transport = Arc::new(MockTransport::new());
        let events = Arc::new(EventBus::new());
        let session = Arc::new(SessionHandle::new());
        session.set("token");

        let rx = events.subscribe();
        let engine = PullEngine::new(
            config,
            Arc::clone(&store) as Arc<dyn RecordStore>,
            Arc::clone(&transport) as Arc<dyn RemoteTransport>,
            events,
            Arc::clone(&session),
            Arc::new(EngineStats::new()),
        );

        Fixture {
            engine,
            store,
            transport,
            events: rx,
            session,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_issues_one_unparameterized_request() {
        let mut fx = fixture();
        fx.engine.synchronize().await;

        assert_eq!(fx.transport.page_requests(), vec![None]);
        // Empty drain: no records-updated notification.
        assert!(fx.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_is_derived_from_most_recent_record() {
        let fx = fixture();
        fx.store
            .put(LocalRecord::from_remote(remote("a", 10)))
            .unwrap();
        fx.store
            .put(LocalRecord::from_remote(remote("c", 30)))
            .unwrap();
        fx.store
            .put(LocalRecord::from_remote(remote("b", 30)))
            .unwrap();

        fx.engine.synchronize().await;

        // Max timestamp, ties broken by greatest identifier.
        assert_eq!(
            fx.transport.page_requests(),
            vec![Some(SyncCursor::new(30, "c"))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_page_triggers_another_request_short_page_stops() {
        let mut fx = fixture();

        let first: Vec<RemoteRecord> = (0..MAX_PAGE_SIZE)
            .map(|i| remote(&format!("r{i:03}"), i as i64 + 1))
            .collect();
        fx.transport.queue_page(page(None, first));

        let follow_cursor = SyncCursor::new(MAX_PAGE_SIZE as i64, "r049");
        fx.transport
            .queue_page(page(Some(&follow_cursor), vec![remote("r100", 200)]));

        fx.engine.synchronize().await;

        let requests = fx.transport.page_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], None);
        assert_eq!(requests[1], Some(follow_cursor));

        assert_eq!(fx.store.count().unwrap(), MAX_PAGE_SIZE + 1);
        assert_eq!(fx.events.try_recv().unwrap(), EngineEvent::RecordsUpdated);
    }

    #[tokio::test(start_paused = true)]
    async fn merge_preserves_client_owned_fields() {
        let mut fx = fixture();

        let mut existing = LocalRecord::from_remote(remote("a", 10));
        existing.progress = Some("chapter-2".into());
        existing.primary.version = Some(10);
        existing.primary.last_accessed = Some(99);
        fx.store.put(existing).unwrap();

        let cursor = SyncCursor::new(10, "a");
        let mut updated = remote("a", 20);
        updated.title = "Renamed".into();
        updated.is_read = true;
        fx.transport.queue_page(page(Some(&cursor), vec![updated]));

        fx.engine.synchronize().await;

        let merged = fx.store.get(&RecordId::from("a")).unwrap().unwrap();
        assert_eq!(merged.remote.title, "Renamed");
        assert!(merged.remote.is_read);
        assert_eq!(merged.progress.as_deref(), Some("chapter-2"));
        assert_eq!(merged.primary.version, Some(10));
        assert_eq!(merged.primary.last_accessed, Some(99));
        assert_eq!(fx.events.try_recv().unwrap(), EngineEvent::RecordsUpdated);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_emits_error_and_reschedules() {
        let mut fx = fixture();
        fx.transport
            .queue_page_error(EngineError::transport_retryable("connection reset"));

        fx.engine.synchronize().await;

        match fx.events.try_recv().unwrap() {
            EngineEvent::Error { reason } => {
                assert!(reason.contains("synchronization failed"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(fx.engine.is_resync_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn success_reschedules_the_next_pass() {
        let fx = fixture();
        fx.engine.synchronize().await;
        assert!(fx.engine.is_resync_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_synchronize_is_a_no_op() {
        let fx = fixture();
        fx.transport.hold_pages();

        let engine = Arc::clone(&fx.engine);
        let first = tokio::spawn(async move { engine.synchronize().await });
        tokio::time::sleep(Duration::from_millis(1)).await;

        // Second call returns immediately without issuing a request.
        fx.engine.synchronize().await;
        assert_eq!(fx.transport.page_requests().len(), 1);

        fx.transport.release_pages();
        first.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn credential_clear_aborts_silently() {
        let mut fx = fixture();
        fx.transport.hold_pages();
        fx.transport
            .queue_page(page(None, vec![remote("a", 10)]));

        let engine = Arc::clone(&fx.engine);
        let pass = tokio::spawn(async move { engine.synchronize().await });
        tokio::time::sleep(Duration::from_millis(1)).await;

        fx.session.clear();
        fx.engine.halt();
        pass.await.unwrap();

        // Nothing merged, no error notification, no rescheduled timer.
        assert_eq!(fx.store.count().unwrap(), 0);
        assert!(fx.events.try_recv().is_err());
        assert!(!fx.engine.is_resync_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn after_sync_hook_fires_only_on_changed_drains() {
        let fx = fixture();
        let fired = Arc::new(std::sync::atomic::AtomicU32::new(0));
        {
            let fired = Arc::clone(&fired);
            fx.engine.set_after_sync(Box::new(move || {
                fired.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }));
        }

        // Empty drain: hook not invoked.
        fx.engine.synchronize().await;
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 0);

        fx.transport.queue_page(page(None, vec![remote("a", 10)]));
        fx.engine.synchronize().await;
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
