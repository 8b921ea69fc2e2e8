//! Engine facade and host-facing message protocol.

use crate::config::SyncConfig;
use crate::download::DownloadOrchestrator;
use crate::event::{EngineEvent, EventBus};
use crate::pull::PullEngine;
use crate::queue::UpdateQueue;
use crate::session::SessionHandle;
use crate::stats::{EngineStats, StatsSnapshot};
use crate::transport::RemoteTransport;
use crate::EngineResult;
use shelf_protocol::{ContentKind, PendingUpdate, RecordId};
use shelf_store::{BlobStore, QueueStore, RecordStore};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// A tagged message from the host to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Install a bearer credential and kick off synchronization.
    SetCredential {
        /// Bearer credential.
        bearer: String,
    },
    /// Clear the credential, aborting in-flight work and discarding
    /// the pending-update list.
    ClearCredential,
    /// Run one synchronization pass now.
    Synchronize,
    /// Fetch content for one record stream on demand.
    RequestContent {
        /// Record identifier.
        id: RecordId,
        /// Content stream.
        kind: ContentKind,
    },
    /// Mark a record read.
    MarkRead {
        /// Record identifier.
        id: RecordId,
    },
    /// Mark a record unread.
    MarkUnread {
        /// Record identifier.
        id: RecordId,
    },
    /// Mark a record deleted.
    MarkDeleted {
        /// Record identifier.
        id: RecordId,
    },
    /// Replace a record's reading-progress token.
    UpdateProgress {
        /// Record identifier.
        id: RecordId,
        /// Opaque progress token.
        token: String,
    },
    /// Flip the bulk pre-fetch toggle.
    SetPrefetch {
        /// New toggle state.
        enabled: bool,
    },
    /// Flip the source-content pre-fetch toggle.
    SetSourcePrefetch {
        /// New toggle state.
        enabled: bool,
    },
    /// The host's record store finished initializing.
    StoreReady,
}

/// The assembled sync engine.
///
/// Wires the three managers over injected collaborators and exposes
/// the tagged message protocol: [`Command`] in via
/// [`SyncClient::handle`], [`EngineEvent`] out via
/// [`SyncClient::subscribe`].
pub struct SyncClient {
    session: Arc<SessionHandle>,
    events: Arc<EventBus>,
    stats: Arc<EngineStats>,
    pull: Arc<PullEngine>,
    downloads: Arc<DownloadOrchestrator>,
    queue: Arc<UpdateQueue>,
}

impl SyncClient {
    /// Assembles the engine over the given collaborators.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        queue_store: Arc<dyn QueueStore>,
        transport: Arc<dyn RemoteTransport>,
    ) -> Arc<Self> {
        let config = Arc::new(config);
        let session = Arc::new(SessionHandle::new());
        let events = Arc::new(EventBus::new());
        let stats = Arc::new(EngineStats::new());

        let downloads = DownloadOrchestrator::new(
            Arc::clone(&config),
            Arc::clone(&store),
            blobs,
            Arc::clone(&transport),
            Arc::clone(&events),
            Arc::clone(&session),
            Arc::clone(&stats),
        );
        let pull = PullEngine::new(
            Arc::clone(&config),
            Arc::clone(&store),
            Arc::clone(&transport),
            Arc::clone(&events),
            Arc::clone(&session),
            Arc::clone(&stats),
        );
        let queue = UpdateQueue::new(
            config,
            store,
            queue_store,
            transport,
            Arc::clone(&events),
            Arc::clone(&session),
            Arc::clone(&stats),
        );

        // Every pull pass that changed records re-evaluates download
        // candidates.
        {
            let downloads = Arc::clone(&downloads);
            pull.set_after_sync(Box::new(move || {
                let downloads = Arc::clone(&downloads);
                tokio::spawn(async move {
                    downloads.reevaluate().await;
                });
            }));
        }

        Arc::new(Self {
            session,
            events,
            stats,
            pull,
            downloads,
            queue,
        })
    }

    /// Loads the persisted pending-update list. Call once at startup
    /// before dispatching any command.
    pub fn load(&self) -> EngineResult<()> {
        self.queue.load()
    }

    /// Subscribes to engine events.
    pub fn subscribe(&self) -> UnboundedReceiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Current engine counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Snapshot of the undelivered mutations.
    pub fn pending_updates(&self) -> Vec<PendingUpdate> {
        self.queue.pending_snapshot()
    }

    /// Dispatches one host command.
    pub async fn handle(&self, command: Command) {
        match command {
            Command::SetCredential { bearer } => self.set_credential(bearer).await,
            Command::ClearCredential => self.clear_credential(),
            Command::Synchronize => self.synchronize().await,
            Command::RequestContent { id, kind } => self.request_content(id, kind).await,
            Command::MarkRead { id } => self.mark_read(id).await,
            Command::MarkUnread { id } => self.mark_unread(id).await,
            Command::MarkDeleted { id } => self.mark_deleted(id).await,
            Command::UpdateProgress { id, token } => self.update_progress(id, token).await,
            Command::SetPrefetch { enabled } => {
                self.downloads.set_prefetch(enabled);
                self.downloads.reevaluate().await;
            }
            Command::SetSourcePrefetch { enabled } => {
                self.downloads.set_source_prefetch(enabled);
                self.downloads.reevaluate().await;
            }
            Command::StoreReady => self.store_ready().await,
        }
    }

    /// Installs a credential: synchronizes, re-evaluates download
    /// candidates, and replays the pending-update list.
    pub async fn set_credential(&self, bearer: impl Into<String>) {
        self.session.set(bearer);
        self.pull.synchronize().await;
        self.downloads.reevaluate().await;
        self.queue.replay().await;
    }

    /// Clears the credential: aborts in-flight work, stops the timers,
    /// and discards the pending-update list.
    pub fn clear_credential(&self) {
        self.session.clear();
        self.pull.halt();
        self.queue.discard_pending();
    }

    /// Runs one synchronization pass (no-op while one is in flight).
    pub async fn synchronize(&self) {
        self.pull.synchronize().await;
    }

    /// Marks the record store initialized and replays any persisted
    /// pending updates.
    pub async fn store_ready(&self) {
        self.queue.mark_store_ready();
        self.queue.replay().await;
    }

    /// Fetches content for one record stream on demand.
    pub async fn request_content(&self, id: RecordId, kind: ContentKind) {
        match self.downloads.request_content(&id, kind).await {
            Ok(()) => {}
            Err(error) if error.is_cancelled() => {}
            Err(error) => {
                self.events
                    .error(format!("content fetch for {id} failed: {error}"));
            }
        }
    }

    /// Marks a record read.
    pub async fn mark_read(&self, id: RecordId) {
        self.apply(PendingUpdate::Read { id }).await;
    }

    /// Marks a record unread.
    pub async fn mark_unread(&self, id: RecordId) {
        self.apply(PendingUpdate::Unread { id }).await;
    }

    /// Marks a record deleted.
    pub async fn mark_deleted(&self, id: RecordId) {
        self.apply(PendingUpdate::Delete { id }).await;
    }

    /// Replaces a record's reading-progress token.
    pub async fn update_progress(&self, id: RecordId, token: String) {
        self.apply(PendingUpdate::Progress { id, token }).await;
    }

    async fn apply(&self, update: PendingUpdate) {
        if self.queue.apply(update).await.is_ok() {
            // The store changed; evict content that is no longer needed.
            if let Err(error) = self.downloads.sweep() {
                self.events
                    .error(format!("content eviction failed: {error}"));
            }
        }
    }
}
