//! Process-wide shutdown flag.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Why the process is going down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A termination signal was received
    Signal,
    /// The store connection failed at the transport level
    StoreLost,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => f.write_str("signal"),
            Self::StoreLost => f.write_str("store lost"),
        }
    }
}

/// A cloneable shutdown flag; the first trigger wins and sets the reason.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Raises the flag; returns `false` if it was already raised.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let triggered = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });

        if triggered {
            info!(%reason, "shutdown triggered");
        }
        triggered
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.tx.borrow()
    }

    /// Waits until the flag is raised and returns the reason.
    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            // the sender lives in self, so the channel cannot close while we wait
            if rx.changed().await.is_err() {
                return ShutdownReason::Signal;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_trigger_wins() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        assert!(shutdown.trigger(ShutdownReason::StoreLost));
        assert!(!shutdown.clone().trigger(ShutdownReason::Signal));
        assert_eq!(shutdown.reason(), Some(ShutdownReason::StoreLost));
    }

    #[tokio::test]
    async fn wait_returns_reason() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };

        tokio::task::yield_now().await;
        shutdown.trigger(ShutdownReason::Signal);
        assert_eq!(waiter.await.unwrap(), ShutdownReason::Signal);

        // an already raised flag resolves immediately
        assert_eq!(shutdown.wait().await, ShutdownReason::Signal);
    }
}
