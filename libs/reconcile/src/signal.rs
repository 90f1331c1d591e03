//! View change notification.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// "View changed" signal shared by the integrations and their consumer.
///
/// Carries no payload; receivers re-query the tree. Bursts of notifications
/// between two polls of a receiver collapse into one.
#[derive(Clone)]
pub struct ViewSignal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    tx: watch::Sender<()>,
    emitted: AtomicU64,
}

impl ViewSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(());
        Self {
            inner: Arc::new(SignalInner {
                tx,
                emitted: AtomicU64::new(0),
            }),
        }
    }

    /// Fire the signal.
    pub fn notify(&self) {
        self.inner.emitted.fetch_add(1, Ordering::SeqCst);
        self.inner.tx.send_replace(());
    }

    /// Receiver that resolves `changed()` after each notification.
    pub fn subscribe(&self) -> watch::Receiver<()> {
        self.inner.tx.subscribe()
    }

    /// Total notifications fired so far.
    pub fn emitted(&self) -> u64 {
        self.inner.emitted.load(Ordering::SeqCst)
    }
}

impl Default for ViewSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_wakes_subscriber() {
        let signal = ViewSignal::new();
        let mut rx = signal.subscribe();
        assert!(!rx.has_changed().unwrap());

        signal.notify();
        signal.notify();
        rx.changed().await.unwrap();
        assert!(!rx.has_changed().unwrap());
        assert_eq!(signal.emitted(), 2);
    }

    #[test]
    fn test_notify_without_subscribers() {
        let signal = ViewSignal::new();
        signal.notify();
        assert_eq!(signal.clone().emitted(), 1);
    }
}
