//! In-flight operation tracking with a bounded wait.

use std::time::Duration;
use tokio::sync::watch;

/// Counts operations in progress and lets a closer wait for them to finish.
#[derive(Debug)]
pub struct Wait {
    count: watch::Sender<usize>,
}

/// Marks one operation as in flight until dropped.
#[derive(Debug)]
pub struct WaitGuard<'a> {
    wait: &'a Wait,
}

impl Wait {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { count }
    }

    /// Registers an operation. The returned guard finishes it on drop, so an
    /// error or a cancelled future still decrements the counter.
    pub fn add(&self) -> WaitGuard<'_> {
        self.count.send_modify(|n| *n += 1);
        WaitGuard { wait: self }
    }

    /// Number of operations currently in flight.
    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolves once no operation is in flight.
    pub async fn wait(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Waits for in-flight operations, giving up after `timeout`.
    ///
    /// Returns `true` if the timeout elapsed first.
    pub async fn wait_with_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_err()
    }
}

impl Default for Wait {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.wait.count.send_modify(|n| *n -= 1);
    }
}
