//! Credential session and cooperative cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// Cooperative cancellation signal for one session's in-flight work.
///
/// The flag is consulted around every network await and re-checked
/// before any store mutation, so aborted work never commits partial
/// results. Cloning shares the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    /// Creates an uncancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag and wakes every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns true once the flag has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves when the flag is raised. Cancel-safe.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// The active credential plus its cancellation signal.
#[derive(Debug, Clone)]
pub struct Session {
    /// Bearer credential sent with every request.
    pub bearer: String,
    /// Cancellation signal tied to this credential's lifetime.
    pub cancel: CancelFlag,
}

/// Holder for the current session.
///
/// The credential is the sole cancellation trigger: clearing it (or
/// replacing it) raises the outgoing session's cancel flag, aborting
/// all of its in-flight work.
#[derive(Debug, Default)]
pub struct SessionHandle {
    current: RwLock<Option<Session>>,
}

impl SessionHandle {
    /// Creates a handle with no credential.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a credential, cancelling any previous session.
    pub fn set(&self, bearer: impl Into<String>) {
        let mut current = self.current.write();
        if let Some(previous) = current.take() {
            debug!("replacing credential; cancelling previous session");
            previous.cancel.cancel();
        }
        *current = Some(Session {
            bearer: bearer.into(),
            cancel: CancelFlag::new(),
        });
    }

    /// Clears the credential, cancelling the session's in-flight work.
    pub fn clear(&self) {
        if let Some(previous) = self.current.write().take() {
            debug!("credential cleared; cancelling session");
            previous.cancel.cancel();
        }
    }

    /// Returns the active session, if any.
    pub fn current(&self) -> Option<Session> {
        self.current.read().clone()
    }

    /// Returns true if a credential is set.
    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn set_and_clear() {
        let handle = SessionHandle::new();
        assert!(!handle.is_authenticated());

        handle.set("token-1");
        assert!(handle.is_authenticated());
        assert_eq!(handle.current().unwrap().bearer, "token-1");

        handle.clear();
        assert!(!handle.is_authenticated());
        assert!(handle.current().is_none());
    }

    #[test]
    fn clear_cancels_outstanding_work() {
        let handle = SessionHandle::new();
        handle.set("token-1");

        let session = handle.current().unwrap();
        assert!(!session.cancel.is_cancelled());

        handle.clear();
        assert!(session.cancel.is_cancelled());
    }

    #[test]
    fn replacing_credential_cancels_previous_session() {
        let handle = SessionHandle::new();
        handle.set("token-1");
        let first = handle.current().unwrap();

        handle.set("token-2");
        assert!(first.cancel.is_cancelled());
        assert!(!handle.current().unwrap().cancel.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves() {
        let flag = CancelFlag::new();
        let waiter = flag.clone();

        let task = tokio::spawn(async move {
            waiter.cancelled().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        flag.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_when_already_raised() {
        let flag = CancelFlag::new();
        flag.cancel();
        flag.cancelled().await;
    }
}
