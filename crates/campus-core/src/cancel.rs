use std::sync::Arc;

use tokio::sync::watch;

/// Creates a linked cancellation handle/token pair for one request.
///
/// The handle is held by whoever owns the request's lifetime; tokens are
/// cloned into every suspension point (queue dequeue, invoker attempts) so
/// cancellation aborts in-flight work promptly instead of leaking it.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (
        CancelHandle { tx },
        CancelToken {
            rx,
            _keepalive: None,
        },
    )
}

/// Cancels the associated tokens when triggered or dropped.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signals cancellation to all tokens.
    pub fn cancel(&self) {
        // Receivers observe the close even if the value send fails.
        let _ = self.tx.send(true);
    }
}

/// Observer side of a cancellation signal.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    // A never-token owns its sender so the channel stays open; freed with
    // the last clone.
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    /// A token that never fires; for callers without a cancellable scope.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is signalled (or the handle is dropped).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Handle dropped: treat as cancelled so waiters unblock.
                return;
            }
        }
    }
}
