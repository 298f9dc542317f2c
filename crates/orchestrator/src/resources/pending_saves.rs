//! Counter of in-flight run document saves.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Tracks fire-and-forget saves so a run can wait for them to settle.
#[derive(Debug, Clone)]
pub struct PendingSaves {
    count: Arc<watch::Sender<usize>>,
}

impl PendingSaves {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            count: Arc::new(count),
        }
    }

    /// Register a save. The returned token ends it when dropped.
    pub fn begin(&self) -> PendingSave {
        self.count.send_modify(|count| *count += 1);
        PendingSave {
            count: self.count.clone(),
        }
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Wait until no save is pending.
    ///
    /// Resolves as soon as the counter reaches zero. Returns `false` if
    /// `timeout` elapses first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.count.subscribe();
        let idle = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|count| *count == 0)).await,
            Ok(Ok(_))
        );
        idle
    }
}

impl Default for PendingSaves {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII token for one pending save.
#[derive(Debug)]
pub struct PendingSave {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for PendingSave {
    fn drop(&mut self) {
        self.count
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_idle_when_nothing_pending() {
        let pending = PendingSaves::new();
        assert_eq!(pending.count(), 0);
        assert!(pending.wait_idle(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_token_drop_decrements() {
        let pending = PendingSaves::new();
        let first = pending.begin();
        let second = pending.begin();
        assert_eq!(pending.count(), 2);

        drop(first);
        assert_eq!(pending.count(), 1);
        drop(second);
        assert_eq!(pending.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_idle_times_out() {
        let pending = PendingSaves::new();
        let _token = pending.begin();

        assert!(!pending.wait_idle(Duration::from_secs(600)).await);
    }

    #[tokio::test]
    async fn test_wait_idle_resolves_when_save_completes() {
        let pending = PendingSaves::new();
        let token = pending.begin();

        let waiter = {
            let pending = pending.clone();
            tokio::spawn(async move { pending.wait_idle(Duration::from_secs(5)).await })
        };

        tokio::task::yield_now().await;
        drop(token);

        assert!(waiter.await.unwrap());
    }
}
