use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),
}

/// Returned by a `put` whose [`Interrupt`](crate::interrupt::Interrupt) was
/// raised before the item could be enqueued. The item is handed back.
#[derive(Error, Clone, Copy, PartialEq, Eq)]
#[error("interrupted while waiting for space in the queue")]
pub struct Interrupted<T>(pub T);

impl<T> Interrupted<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Interrupted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupted").finish_non_exhaustive()
    }
}
