use std::sync::{Mutex, MutexGuard, PoisonError};

/// Mutual exclusion around a reorder buffer's state.
///
/// Buffer operations never panic while the guard is held, so a poisoned lock
/// still guards consistent state and is recovered rather than propagated.
#[derive(Debug, Default)]
pub struct SequenceLock<T> {
    inner: Mutex<T>,
}

impl<T> SequenceLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
