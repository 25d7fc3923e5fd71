//! External cancellation for in-flight checks.

use tokio::sync::watch;

/// Caller-held cancellation signal for in-flight checks.
///
/// Clone the handle freely; all clones share one flag. Cancellation is
/// one-way and idempotent: the first [`cancel`](CancelHandle::cancel)
/// wins and later calls are no-ops. Dropping every handle without
/// cancelling leaves watchers pending forever, so only the per-call
/// deadline applies.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// New handle in the not-cancelled state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Request cancellation of every check watching this handle.
    pub fn cancel(&self) {
        // send only fails with no receivers, which is fine: the flag is
        // still set for watchers subscribed later.
        let _ = self.tx.send(true);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn watch(&self) -> CancelWatch {
        CancelWatch {
            rx: Some(self.tx.subscribe()),
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Executor-side view of an optional [`CancelHandle`].
#[derive(Debug)]
pub(crate) struct CancelWatch {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelWatch {
    /// A watch that never fires (no handle supplied).
    pub(crate) fn never() -> Self {
        Self { rx: None }
    }

    /// Resolve once cancellation is requested; pend forever otherwise.
    pub(crate) async fn cancelled(mut self) {
        let fired = match self.rx.as_mut() {
            Some(rx) => rx.wait_for(|cancelled| *cancelled).await.is_ok(),
            None => false,
        };

        if !fired {
            // No handle, or every handle dropped without cancelling.
            std::future::pending::<()>().await;
        }
    }
}
