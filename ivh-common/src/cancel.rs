//! Cooperative cancellation signal shared by every scenario task.
//!
//! A single [`CancelHandle`] lives in the runner; clones of the paired
//! [`CancelToken`] ride along into retry loops and lifecycle phases.
//! Raising the signal makes in-flight retry sleeps return immediately so
//! provisioned environments can move straight to teardown.

use tokio::sync::watch;

/// Sender half. Raising the signal is sticky; it cannot be un-raised.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Raise the stop signal for every token cloned from this handle.
    pub fn cancel(&self) {
        // Receivers may all be gone already; that is fine.
        let _ = self.tx.send(true);
    }
}

/// Receiver half, cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// A token that never fires. Useful for one-shot callers and tests.
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Whether the signal has been raised.
    pub fn is_cancelled(&self) -> bool {
        match &self.rx {
            Some(rx) => *rx.borrow(),
            None => false,
        }
    }

    /// Resolve once the signal is raised. Pends forever on a `never` token
    /// or when the handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Handle dropped without ever cancelling.
                return std::future::pending().await;
            }
        }
    }
}

/// Create a linked handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx: Some(rx) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_token_observes_cancel() {
        let (handle, token) = cancel_pair();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
        // Must resolve promptly once raised.
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("cancelled() should resolve after cancel()");
    }

    #[tokio::test]
    async fn test_never_token_pends() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
        let waited = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(waited.is_err(), "never token must not resolve");
    }

    #[tokio::test]
    async fn test_clones_share_signal() {
        let (handle, token) = cancel_pair();
        let cloned = token.clone();
        handle.cancel();
        assert!(cloned.is_cancelled());
    }
}
