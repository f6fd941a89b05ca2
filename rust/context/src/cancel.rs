use std::sync::Arc;

use tokio::sync::watch;

/// The single cancellation signal threaded through the context.
///
/// Cloning shares the signal. Steps poll [`is_cancelled`](Self::is_cancelled)
/// or await [`cancelled`](Self::cancelled) at every suspension point;
/// once flipped the signal never resets.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    /// Create an unsignalled cancellation handle.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has been raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal is raised.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_unsignalled_and_flips_once() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };

        signal.cancel();
        waiter.await.expect("waiter returns");
        assert!(signal.is_cancelled());

        // Raising again is a no-op.
        signal.cancel();
        assert!(signal.is_cancelled());
    }
}
