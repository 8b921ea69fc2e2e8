//! Engine-to-host event protocol.

use parking_lot::RwLock;
use shelf_protocol::{ContentKind, RecordId};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::error;

/// Status of one content download attempt.
///
/// Download descriptors are ephemeral: they exist only for the duration
/// of a fetch and are discarded after reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    /// Waiting for the transfer slot.
    Queued,
    /// Transfer in progress.
    InProgress,
    /// Transfer completed and committed.
    Done,
    /// Transfer failed; the candidate will be retried on the next pass.
    Error,
    /// Transfer aborted by clearing the credential.
    Canceled,
}

/// A tagged message from the engine to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// An unrecoverable failure, as one human-readable string.
    Error {
        /// Failure description.
        reason: String,
    },
    /// The local record store changed (pull merge or optimistic apply).
    RecordsUpdated,
    /// Content for a record stream is available locally.
    ContentFetched {
        /// Record identifier.
        id: RecordId,
        /// Content stream.
        kind: ContentKind,
    },
    /// Progress report for one download attempt.
    ContentStatus {
        /// Record identifier.
        id: RecordId,
        /// Content stream.
        kind: ContentKind,
        /// Attempt status.
        state: DownloadState,
        /// Bytes received so far.
        received: u64,
        /// Total bytes, when known.
        total: u64,
    },
}

/// Distributes engine events to host subscribers.
///
/// Subscribers receive events in emit order over unbounded channels;
/// closed subscribers are pruned on the next emit.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<UnboundedSender<EngineEvent>>>,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to all subsequent events.
    pub fn subscribe(&self) -> UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event to every live subscriber.
    pub fn emit(&self, event: EngineEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Emits an error notification, logging it as well.
    pub fn error(&self, reason: impl Into<String>) {
        let reason = reason.into();
        error!("{reason}");
        self.emit(EngineEvent::Error { reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(EngineEvent::RecordsUpdated);
        bus.error("boom");

        assert_eq!(rx.try_recv().unwrap(), EngineEvent::RecordsUpdated);
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::Error {
                reason: "boom".into()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let mut live = bus.subscribe();
        drop(rx);

        bus.emit(EngineEvent::RecordsUpdated);
        assert_eq!(live.try_recv().unwrap(), EngineEvent::RecordsUpdated);
        assert_eq!(bus.subscribers.read().len(), 1);
    }
}
