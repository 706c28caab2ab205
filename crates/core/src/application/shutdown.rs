// Shutdown Token
//
// One sender owned by the process entry point; cloned tokens observed by the
// queue drain, the scheduler loop and batch workers.

use std::sync::Arc;
use tokio::sync::watch;

/// Shutdown signal for graceful termination
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
    // Only set by `never()`, which has no external sender
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested (immediately if it already was)
    pub async fn cancelled(&mut self) {
        // Sender dropped without signalling also counts as shutdown
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Token that never fires (tests, one-off runs)
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every token
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Hand out another token observing this sender
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
            _keepalive: None,
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (
        ShutdownSender { tx },
        ShutdownToken {
            rx,
            _keepalive: None,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancelled_returns_when_already_signalled() {
        let (tx, mut token) = shutdown_channel();
        tx.shutdown();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
        assert!(token.is_shutdown());
    }

    #[tokio::test]
    async fn test_late_subscribers_see_shutdown() {
        let (tx, _token) = shutdown_channel();
        tx.shutdown();
        assert!(tx.token().is_shutdown());
    }

    #[tokio::test]
    async fn test_never_token_stays_quiet() {
        let mut token = ShutdownToken::never();
        let waited = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
        tokio_test::assert_err!(waited);
    }
}
