//! Durable queue for user-originated mutations.

use crate::config::SyncConfig;
use crate::error::{EngineError, EngineResult};
use crate::event::{EngineEvent, EventBus};
use crate::scheduler::Scheduler;
use crate::session::SessionHandle;
use crate::state::RunState;
use crate::stats::EngineStats;
use crate::transport::RemoteTransport;
use parking_lot::Mutex;
use shelf_protocol::PendingUpdate;
use shelf_store::{QueueStore, RecordStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Never loses a user-originated mutation: applies it optimistically to
/// the local store, delivers it to the remote authority, and retries
/// across process restarts.
///
/// The pending list is durably persisted on every change and loaded
/// once at startup before any mutation may be queued or sent. Delivery
/// is FIFO; a stuck entry never blocks the entries after it. A
/// definitive "resource gone" response counts as delivered. Clearing
/// the credential discards the entire list: mutations from an abandoned
/// session are not retried under a different identity.
pub struct UpdateQueue {
    config: Arc<SyncConfig>,
    store: Arc<dyn RecordStore>,
    persistence: Arc<dyn QueueStore>,
    transport: Arc<dyn RemoteTransport>,
    events: Arc<EventBus>,
    session: Arc<SessionHandle>,
    stats: Arc<EngineStats>,
    pending: Mutex<Vec<PendingUpdate>>,
    loaded: AtomicBool,
    store_ready: AtomicBool,
    state: Mutex<RunState>,
    timer: Scheduler,
    this: Weak<UpdateQueue>,
}

impl UpdateQueue {
    /// Creates an update queue over the given collaborators.
    pub fn new(
        config: Arc<SyncConfig>,
        store: Arc<dyn RecordStore>,
        persistence: Arc<dyn QueueStore>,
        transport: Arc<dyn RemoteTransport>,
        events: Arc<EventBus>,
        session: Arc<SessionHandle>,
        stats: Arc<EngineStats>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            store,
            persistence,
            transport,
            events,
            session,
            stats,
            pending: Mutex::new(Vec::new()),
            loaded: AtomicBool::new(false),
            store_ready: AtomicBool::new(false),
            state: Mutex::new(RunState::Idle),
            timer: Scheduler::new("update-retry"),
            this: this.clone(),
        })
    }

    /// Loads the persisted pending list. Must complete before any
    /// mutation is applied or replayed.
    pub fn load(&self) -> EngineResult<()> {
        let list = self.persistence.load()?;
        debug!(pending = list.len(), "loaded pending updates");
        *self.pending.lock() = list;
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Marks the external record store as initialized.
    pub fn mark_store_ready(&self) {
        self.store_ready.store(true, Ordering::SeqCst);
    }

    /// Number of undelivered mutations.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Snapshot of the undelivered mutations, in delivery order.
    pub fn pending_snapshot(&self) -> Vec<PendingUpdate> {
        self.pending.lock().clone()
    }

    /// Returns true if a retry is scheduled.
    pub fn is_retry_scheduled(&self) -> bool {
        self.timer.is_scheduled()
    }

    /// Applies one user mutation.
    ///
    /// The optimistic local result is written to the store and
    /// "records updated" emitted regardless of network state. Delivery
    /// is attempted immediately when authenticated and no bulk replay
    /// is running; otherwise (or on failure) the mutation is appended
    /// to the durable pending list.
    pub async fn apply(&self, update: PendingUpdate) -> EngineResult<()> {
        if !self.store_ready.load(Ordering::SeqCst) || !self.loaded.load(Ordering::SeqCst) {
            let reason = format!("cannot {}: store not ready", update.describe());
            self.events.error(reason);
            return Err(EngineError::StoreNotReady);
        }

        self.apply_local(&update)?;
        self.events.emit(EngineEvent::RecordsUpdated);

        let replaying = self.state.lock().is_active();
        match self.session.current() {
            Some(session) if !replaying => {
                let outcome = tokio::select! {
                    _ = session.cancel.cancelled() => Err(EngineError::Cancelled),
                    outcome = self.transport.deliver(&session.bearer, &update) => outcome,
                };
                match outcome {
                    Ok(()) => self.stats.record_update_delivered(),
                    Err(error) if error.is_gone() => self.stats.record_update_dropped(),
                    Err(error) if error.is_cancelled() => {
                        // The session is being abandoned; its list is discarded.
                        debug!("delivery cancelled mid-apply");
                    }
                    Err(error) => {
                        debug!("immediate delivery failed, queueing: {error}");
                        self.enqueue(update)?;
                    }
                }
            }
            _ => self.enqueue(update)?,
        }

        self.ensure_retry_scheduled();
        Ok(())
    }

    /// Replays the pending list in order.
    ///
    /// Guarded against concurrent replays. Each delivered (or moot)
    /// entry is spliced out and the shortened list persisted
    /// immediately; a failed entry stays in place while later entries
    /// are still attempted. If entries remain afterwards the retry
    /// timer is rescheduled.
    pub async fn replay(&self) {
        if !self.loaded.load(Ordering::SeqCst) {
            debug!("replay skipped: pending list not loaded");
            return;
        }
        {
            let mut state = self.state.lock();
            if !state.can_start() {
                debug!("replay already running");
                return;
            }
            *state = RunState::Running;
        }

        self.replay_pass().await;
        *self.state.lock() = RunState::Idle;

        self.ensure_retry_scheduled();
    }

    /// Discards the entire pending list and persists the empty list.
    ///
    /// Called when the credential is cleared: mutations made for a
    /// now-abandoned session are not retried under a different
    /// identity.
    pub fn discard_pending(&self) {
        self.timer.cancel();
        let mut pending = self.pending.lock();
        debug!(discarded = pending.len(), "discarding pending updates");
        pending.clear();
        if let Err(error) = self.persistence.save(&pending) {
            self.events
                .error(format!("failed to persist pending updates: {error}"));
        }
    }

    async fn replay_pass(&self) {
        let Some(session) = self.session.current() else {
            return;
        };

        let mut index = 0usize;
        loop {
            let Some(update) = self.pending.lock().get(index).cloned() else {
                break;
            };

            let outcome = tokio::select! {
                _ = session.cancel.cancelled() => Err(EngineError::Cancelled),
                outcome = self.transport.deliver(&session.bearer, &update) => outcome,
            };

            let delivered = match outcome {
                Ok(()) => {
                    self.stats.record_update_delivered();
                    true
                }
                Err(error) if error.is_gone() => {
                    debug!(id = %update.record_id(), "resource gone; dropping entry");
                    self.stats.record_update_dropped();
                    true
                }
                Err(error) if error.is_cancelled() => break,
                Err(error) => {
                    debug!("delivery failed, keeping entry: {error}");
                    index += 1;
                    false
                }
            };

            if delivered {
                let snapshot = {
                    let mut pending = self.pending.lock();
                    if pending.get(index) != Some(&update) {
                        // The list was discarded underneath us.
                        break;
                    }
                    pending.remove(index);
                    pending.clone()
                };
                if let Err(error) = self.persistence.save(&snapshot) {
                    self.events
                        .error(format!("failed to persist pending updates: {error}"));
                }
            }
        }
    }

    /// Computes and writes the optimistic local result of a mutation.
    fn apply_local(&self, update: &PendingUpdate) -> EngineResult<()> {
        let Some(mut record) = self.store.get(update.record_id())? else {
            debug!(id = %update.record_id(), "optimistic apply skipped: record not mirrored");
            return Ok(());
        };

        match update {
            PendingUpdate::Read { .. } => record.remote.is_read = true,
            PendingUpdate::Unread { .. } => record.remote.is_read = false,
            PendingUpdate::Delete { .. } => record.remote.is_deleted = true,
            PendingUpdate::Progress { token, .. } => record.progress = Some(token.clone()),
        }
        self.store.put(record)?;
        Ok(())
    }

    fn enqueue(&self, update: PendingUpdate) -> EngineResult<()> {
        let mut pending = self.pending.lock();
        pending.push(update);
        self.persistence.save(&pending)?;
        Ok(())
    }

    /// Schedules a retry when entries remain and a credential is
    /// present; never doubles an already-pending timer.
    fn ensure_retry_scheduled(&self) {
        if self.pending.lock().is_empty() || !self.session.is_authenticated() {
            return;
        }
        if self.timer.is_scheduled() {
            return;
        }
        let Some(queue) = self.this.upgrade() else {
            return;
        };
        self.timer.schedule(self.config.retry_interval, async move {
            queue.replay().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use shelf_protocol::{RecordId, RemoteRecord};
    use shelf_store::{LocalRecord, MemoryQueueStore, MemoryRecordStore};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn remote(id: &str) -> RemoteRecord {
        RemoteRecord {
            id: RecordId::from(id),
            title: format!("Title {id}"),
            author: None,
            content_type: "text/html".into(),
            is_read: false,
            is_deleted: false,
            created_at: 1,
            updated_at: 2,
            content_updated_at: 3,
        }
    }

    fn read(id: &str) -> PendingUpdate {
        PendingUpdate::Read {
            id: RecordId::from(id),
        }
    }

    struct Fixture {
        queue: Arc<UpdateQueue>,
        store: Arc<MemoryRecordStore>,
        persistence: Arc<MemoryQueueStore>,
        transport: Arc<MockTransport>,
        events: UnboundedReceiver<EngineEvent>,
        session: Arc<SessionHandle>,
    }

    fn fixture(authenticated: bool) -> Fixture {
        let config = Arc::new(SyncConfig::default());
        let store = Arc::new(MemoryRecordStore::new());
        let persistence = Arc::new(MemoryQueueStore::new());
        let transport = Arc::new(MockTransport::new());
        let events = Arc::new(EventBus::new());
        let session = Arc::new(SessionHandle::new());
        if authenticated {
            session.set("token");
        }

        let rx = events.subscribe();
        let queue = UpdateQueue::new(
            config,
            Arc::clone(&store) as Arc<dyn RecordStore>,
            Arc::clone(&persistence) as Arc<dyn QueueStore>,
            Arc::clone(&transport) as Arc<dyn RemoteTransport>,
            events,
            Arc::clone(&session),
            Arc::new(EngineStats::new()),
        );
        queue.load().unwrap();
        queue.mark_store_ready();

        Fixture {
            queue,
            store,
            persistence,
            transport,
            events: rx,
            session,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn store_not_ready_surfaces_error_and_mutates_nothing() {
        let store = Arc::new(MemoryRecordStore::new());
        let persistence = Arc::new(MemoryQueueStore::new());
        let transport = Arc::new(MockTransport::new());
        let events = Arc::new(EventBus::new());
        let mut rx = events.subscribe();
        let session = Arc::new(SessionHandle::new());
        session.set("token");
        store.put(LocalRecord::from_remote(remote("a"))).unwrap();

        // Neither load() nor mark_store_ready() has run.
        let queue = UpdateQueue::new(
            Arc::new(SyncConfig::default()),
            Arc::clone(&store) as Arc<dyn RecordStore>,
            Arc::clone(&persistence) as Arc<dyn QueueStore>,
            Arc::clone(&transport) as Arc<dyn RemoteTransport>,
            events,
            session,
            Arc::new(EngineStats::new()),
        );

        let outcome = queue.apply(read("a")).await;
        assert!(matches!(outcome, Err(EngineError::StoreNotReady)));

        match rx.try_recv().unwrap() {
            EngineEvent::Error { reason } => {
                assert_eq!(reason, "cannot mark read: store not ready");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // No optimistic write, nothing queued, nothing sent.
        let record = store.get(&RecordId::from("a")).unwrap().unwrap();
        assert!(!record.remote.is_read);
        assert!(persistence.snapshot().is_empty());
        assert!(transport.delivered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn online_apply_delivers_without_enqueueing() {
        let mut fx = fixture(true);
        fx.store.put(LocalRecord::from_remote(remote("a"))).unwrap();

        fx.queue.apply(read("a")).await.unwrap();

        // Optimistic flag flip plus notification.
        let record = fx.store.get(&RecordId::from("a")).unwrap().unwrap();
        assert!(record.remote.is_read);
        assert_eq!(fx.events.try_recv().unwrap(), EngineEvent::RecordsUpdated);

        assert_eq!(fx.transport.delivered(), vec![read("a")]);
        assert_eq!(fx.queue.pending_count(), 0);
        assert!(fx.persistence.snapshot().is_empty());
        assert!(!fx.queue.is_retry_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn offline_apply_enqueues_and_persists() {
        let mut fx = fixture(false);
        fx.store.put(LocalRecord::from_remote(remote("a"))).unwrap();

        fx.queue.apply(read("a")).await.unwrap();

        // Optimistic result and notification happen regardless of network.
        let record = fx.store.get(&RecordId::from("a")).unwrap().unwrap();
        assert!(record.remote.is_read);
        assert_eq!(fx.events.try_recv().unwrap(), EngineEvent::RecordsUpdated);

        assert!(fx.transport.delivered().is_empty());
        assert_eq!(fx.persistence.snapshot(), vec![read("a")]);
        // No credential: no retry timer either.
        assert!(!fx.queue.is_retry_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delivery_enqueues_and_schedules_retry() {
        let fx = fixture(true);
        fx.store.put(LocalRecord::from_remote(remote("a"))).unwrap();
        fx.transport
            .queue_delivery(Err(EngineError::transport_retryable("connection reset")));

        fx.queue.apply(read("a")).await.unwrap();

        assert_eq!(fx.persistence.snapshot(), vec![read("a")]);
        assert!(fx.queue.is_retry_scheduled());

        // The retry fires after the fixed delay and drains the entry.
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(fx.queue.pending_count(), 0);
        assert!(fx.persistence.snapshot().is_empty());
        assert!(!fx.queue.is_retry_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn gone_on_immediate_delivery_is_success() {
        let mut fx = fixture(true);
        fx.store.put(LocalRecord::from_remote(remote("a"))).unwrap();
        fx.transport.queue_delivery(Err(EngineError::Gone));

        fx.queue.apply(read("a")).await.unwrap();

        assert_eq!(fx.queue.pending_count(), 0);
        assert_eq!(fx.events.try_recv().unwrap(), EngineEvent::RecordsUpdated);
        assert!(fx.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn replay_splices_delivered_entries_in_place() {
        let fx = fixture(true);
        fx.persistence
            .save(&[read("u1"), read("u2"), read("u3")])
            .unwrap();
        fx.queue.load().unwrap();

        fx.transport.queue_delivery(Ok(()));
        fx.transport
            .queue_delivery(Err(EngineError::transport_retryable("connection reset")));
        fx.transport.queue_delivery(Ok(()));

        fx.queue.replay().await;

        // Items 1 and 3 delivered; item 2 left in its original position.
        assert_eq!(
            fx.transport.delivered(),
            vec![read("u1"), read("u2"), read("u3")]
        );
        assert_eq!(fx.persistence.snapshot(), vec![read("u2")]);
        assert_eq!(fx.queue.pending_snapshot(), vec![read("u2")]);
        // Entries remain: the retry timer is rescheduled.
        assert!(fx.queue.is_retry_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn gone_during_replay_drops_entry_without_error() {
        let mut fx = fixture(true);
        fx.persistence.save(&[read("u1")]).unwrap();
        fx.queue.load().unwrap();
        fx.transport.queue_delivery(Err(EngineError::Gone));

        fx.queue.replay().await;

        assert_eq!(fx.queue.pending_count(), 0);
        assert!(fx.persistence.snapshot().is_empty());
        assert!(fx.events.try_recv().is_err());
        assert!(!fx.queue.is_retry_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn credential_clear_discards_pending_list() {
        let fx = fixture(true);
        fx.persistence.save(&[read("u1"), read("u2")]).unwrap();
        fx.queue.load().unwrap();
        fx.queue.ensure_retry_scheduled();
        assert!(fx.queue.is_retry_scheduled());

        fx.session.clear();
        fx.queue.discard_pending();

        assert_eq!(fx.queue.pending_count(), 0);
        assert!(fx.persistence.snapshot().is_empty());
        assert!(!fx.queue.is_retry_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_timer_is_not_doubled() {
        let fx = fixture(true);
        fx.persistence.save(&[read("u1")]).unwrap();
        fx.queue.load().unwrap();

        fx.queue.ensure_retry_scheduled();
        fx.queue.ensure_retry_scheduled();
        assert!(fx.queue.is_retry_scheduled());

        // A single timer fire drains the single entry.
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(fx.transport.delivered().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_apply_writes_token() {
        let fx = fixture(true);
        fx.store.put(LocalRecord::from_remote(remote("a"))).unwrap();

        fx.queue
            .apply(PendingUpdate::Progress {
                id: RecordId::from("a"),
                token: "loc-42".into(),
            })
            .await
            .unwrap();

        let record = fx.store.get(&RecordId::from("a")).unwrap().unwrap();
        assert_eq!(record.progress.as_deref(), Some("loc-42"));
    }
}
