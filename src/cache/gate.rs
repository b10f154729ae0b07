//! One-shot readiness signal.

use tokio::sync::watch;

/// Two-state gate that opens exactly once and never closes again.
///
/// Waiters block until the gate is open; once open, waiting returns
/// immediately.
#[derive(Debug)]
pub struct ReadinessGate {
    tx: watch::Sender<bool>,
}

impl ReadinessGate {
    /// Create a closed gate.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Open the gate. Returns `true` only for the call that opened it.
    pub fn open(&self) -> bool {
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    /// Whether the gate has been opened.
    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the gate is open.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_open_is_one_shot() {
        let gate = ReadinessGate::new();
        assert!(!gate.is_ready());
        assert!(gate.open());
        assert!(!gate.open());
        assert!(gate.is_ready());
    }

    #[tokio::test]
    async fn test_wait_blocks_until_open() {
        let gate = Arc::new(ReadinessGate::new());
        let mut waiter = task::spawn(gate.wait());

        assert_pending!(waiter.poll());
        gate.open();
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_wait_after_open_is_immediate() {
        let gate = ReadinessGate::new();
        gate.open();
        let mut waiter = task::spawn(gate.wait());
        assert_ready!(waiter.poll());
    }
}
