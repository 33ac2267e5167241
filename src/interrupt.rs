use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation flag for a producer parked in
/// [`BlockingQueue::put`](crate::blocking_queue::BlockingQueue::put).
///
/// Clones share the same flag. Raising it only sets the flag; use
/// [`BlockingQueue::interrupt`](crate::blocking_queue::BlockingQueue::interrupt)
/// to also wake a producer that is already parked.
#[derive(Clone, Debug, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clears the flag, returning whether it was raised.
    pub fn consume(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }
}
