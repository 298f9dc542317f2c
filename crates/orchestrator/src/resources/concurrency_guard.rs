//! Process-wide single-flight admission for pipe runs.

use std::sync::{Mutex, PoisonError};

use tracing::debug;
use uuid::Uuid;

/// Holds at most one run at a time, across all pipes.
///
/// Acquisition never waits: a caller that finds the guard occupied is told so
/// immediately. The guard is local to this process.
#[derive(Debug, Default)]
pub struct ConcurrencyGuard {
    holder: Mutex<Option<Uuid>>,
}

impl ConcurrencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to make `holder` the current holder.
    ///
    /// Returns `true` when granted, including when `holder` already holds the guard.
    pub fn try_acquire(&self, holder: Uuid) -> bool {
        let mut current = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
        match *current {
            Some(existing) if existing == holder => true,
            Some(existing) => {
                debug!(holder = %holder, current = %existing, "Concurrency guard occupied");
                false
            }
            None => {
                *current = Some(holder);
                debug!(holder = %holder, "Concurrency guard acquired");
                true
            }
        }
    }

    /// Free the guard. Releasing a free guard is a no-op.
    pub fn release(&self) {
        let mut current = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(holder) = current.take() {
            debug!(holder = %holder, "Concurrency guard released");
        }
    }

    /// Free the guard only if `holder` holds it.
    pub fn release_if_held_by(&self, holder: Uuid) -> bool {
        let mut current = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == Some(holder) {
            *current = None;
            debug!(holder = %holder, "Concurrency guard released");
            true
        } else {
            false
        }
    }

    pub fn holder(&self) -> Option<Uuid> {
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_held(&self) -> bool {
        self.holder().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_acquire_free_guard() {
        let guard = ConcurrencyGuard::new();
        let run = Uuid::new_v4();

        assert!(guard.try_acquire(run));
        assert_eq!(guard.holder(), Some(run));
    }

    #[test]
    fn test_acquire_occupied_guard() {
        let guard = ConcurrencyGuard::new();
        let first = Uuid::new_v4();

        assert!(guard.try_acquire(first));
        assert!(!guard.try_acquire(Uuid::new_v4()));
        assert_eq!(guard.holder(), Some(first));
    }

    #[test]
    fn test_reacquire_by_holder() {
        let guard = ConcurrencyGuard::new();
        let run = Uuid::new_v4();

        assert!(guard.try_acquire(run));
        assert!(guard.try_acquire(run));
    }

    #[test]
    fn test_release_is_idempotent() {
        let guard = ConcurrencyGuard::new();
        guard.try_acquire(Uuid::new_v4());

        guard.release();
        guard.release();
        assert!(!guard.is_held());
        assert!(guard.try_acquire(Uuid::new_v4()));
    }

    #[test]
    fn test_release_if_held_by_other() {
        let guard = ConcurrencyGuard::new();
        let holder = Uuid::new_v4();
        guard.try_acquire(holder);

        assert!(!guard.release_if_held_by(Uuid::new_v4()));
        assert!(guard.is_held());
        assert!(guard.release_if_held_by(holder));
        assert!(!guard.is_held());
    }

    #[test]
    fn test_single_winner_across_threads() {
        let guard = Arc::new(ConcurrencyGuard::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || guard.try_acquire(Uuid::new_v4()))
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|granted| *granted)
            .count();
        assert_eq!(granted, 1);
    }
}
