//! Transport layer abstraction for the remote authority.

use crate::error::EngineResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use shelf_protocol::{ContentKind, PageMeta, PendingUpdate, PullPage, RecordId, SyncCursor};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Network access to the remote authority.
///
/// This trait abstracts the wire so the engine can run against HTTP in
/// production and a scripted mock in tests. Implementations do not
/// handle cancellation; the engine races every call against the
/// session's cancel flag.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Fetches one pull page after the given cursor; `None` requests
    /// the unparameterized bootstrap page.
    async fn fetch_page(&self, bearer: &str, after: Option<&SyncCursor>)
        -> EngineResult<PullPage>;

    /// Fetches the content bytes of one record stream.
    async fn fetch_content(
        &self,
        bearer: &str,
        id: &RecordId,
        kind: ContentKind,
    ) -> EngineResult<Vec<u8>>;

    /// Delivers one pending update.
    async fn deliver(&self, bearer: &str, update: &PendingUpdate) -> EngineResult<()>;
}

/// A scripted transport for tests.
///
/// Responses are consumed front-to-back from per-operation queues. When
/// a queue is empty the mock answers with a benign default: an empty
/// (short) page echoing the request cursor, a small content payload, or
/// a successful delivery. Every request is recorded for assertions, and
/// content transfers are gauged so tests can assert that never more
/// than one is in flight.
#[derive(Debug, Default)]
pub struct MockTransport {
    pages: Mutex<VecDeque<EngineResult<PullPage>>>,
    content: Mutex<VecDeque<EngineResult<Vec<u8>>>>,
    deliveries: Mutex<VecDeque<EngineResult<()>>>,
    page_requests: Mutex<Vec<Option<SyncCursor>>>,
    content_requests: Mutex<Vec<(RecordId, ContentKind)>>,
    delivered: Mutex<Vec<PendingUpdate>>,
    transfers_in_flight: AtomicUsize,
    max_transfers_in_flight: AtomicUsize,
    content_gate: Mutex<Option<Arc<Notify>>>,
    page_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockTransport {
    /// Creates a mock with empty scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next pull page.
    pub fn queue_page(&self, page: PullPage) {
        self.pages.lock().push_back(Ok(page));
    }

    /// Scripts a pull failure.
    pub fn queue_page_error(&self, error: crate::EngineError) {
        self.pages.lock().push_back(Err(error));
    }

    /// Scripts the next content payload.
    pub fn queue_content(&self, bytes: impl Into<Vec<u8>>) {
        self.content.lock().push_back(Ok(bytes.into()));
    }

    /// Scripts a content fetch failure.
    pub fn queue_content_error(&self, error: crate::EngineError) {
        self.content.lock().push_back(Err(error));
    }

    /// Scripts the next delivery outcome.
    pub fn queue_delivery(&self, result: EngineResult<()>) {
        self.deliveries.lock().push_back(result);
    }

    /// Holds all subsequent content fetches open until
    /// [`MockTransport::release_content`] is called.
    pub fn hold_content(&self) {
        *self.content_gate.lock() = Some(Arc::new(Notify::new()));
    }

    /// Releases fetches held by [`MockTransport::hold_content`].
    pub fn release_content(&self) {
        if let Some(gate) = self.content_gate.lock().take() {
            gate.notify_waiters();
        }
    }

    /// Holds all subsequent page fetches open until
    /// [`MockTransport::release_pages`] is called.
    pub fn hold_pages(&self) {
        *self.page_gate.lock() = Some(Arc::new(Notify::new()));
    }

    /// Releases fetches held by [`MockTransport::hold_pages`].
    pub fn release_pages(&self) {
        if let Some(gate) = self.page_gate.lock().take() {
            gate.notify_waiters();
        }
    }

    /// Cursors of every page request made, in order.
    pub fn page_requests(&self) -> Vec<Option<SyncCursor>> {
        self.page_requests.lock().clone()
    }

    /// Every content request made, in order.
    pub fn content_requests(&self) -> Vec<(RecordId, ContentKind)> {
        self.content_requests.lock().clone()
    }

    /// Every delivery attempted, in order, regardless of outcome.
    pub fn delivered(&self) -> Vec<PendingUpdate> {
        self.delivered.lock().clone()
    }

    /// Highest number of content transfers observed in flight at once.
    pub fn max_transfers_in_flight(&self) -> usize {
        self.max_transfers_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight gauge even when the fetch future is
/// dropped mid-transfer by a cancellation.
struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn fetch_page(
        &self,
        _bearer: &str,
        after: Option<&SyncCursor>,
    ) -> EngineResult<PullPage> {
        self.page_requests.lock().push(after.cloned());

        let gate = self.page_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        match self.pages.lock().pop_front() {
            Some(result) => result,
            None => Ok(PullPage {
                meta: PageMeta {
                    after_timestamp: after.map(|c| c.updated_at),
                    after_id: after.map(|c| c.id.clone()),
                },
                result: Vec::new(),
            }),
        }
    }

    async fn fetch_content(
        &self,
        _bearer: &str,
        id: &RecordId,
        kind: ContentKind,
    ) -> EngineResult<Vec<u8>> {
        self.content_requests.lock().push((id.clone(), kind));
        let _guard = InFlightGuard::enter(&self.transfers_in_flight, &self.max_transfers_in_flight);

        let gate = self.content_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        match self.content.lock().pop_front() {
            Some(result) => result,
            None => Ok(b"content".to_vec()),
        }
    }

    async fn deliver(&self, _bearer: &str, update: &PendingUpdate) -> EngineResult<()> {
        self.delivered.lock().push(update.clone());
        match self.deliveries.lock().pop_front() {
            Some(result) => result,
            None => Ok(()),
        }
    }
}
