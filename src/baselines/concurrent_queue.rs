use concurrent_queue::{PopError, PushError};
use crossbeam_utils::Backoff;

use crate::{BoundedQueue, ConcurrentQueue, Handle, Interrupted, QueueError};

struct ConcurrentQueueHandle<'q, T> {
    queue: &'q concurrent_queue::ConcurrentQueue<T>,
}

impl<T> Handle<T> for ConcurrentQueueHandle<'_, T> {
    fn enqueue(&mut self, item: T) -> Result<(), Interrupted<T>> {
        let backoff = Backoff::new();
        let mut item = item;
        loop {
            match self.queue.push(item) {
                Ok(()) => return Ok(()),
                Err(PushError::Full(rejected)) => {
                    item = rejected;
                    backoff.snooze();
                }
                // Closing stands in for interruption here.
                Err(PushError::Closed(rejected)) => return Err(Interrupted(rejected)),
            }
        }
    }

    fn dequeue(&mut self) -> T {
        let backoff = Backoff::new();
        loop {
            match self.queue.pop() {
                Ok(item) => return item,
                Err(PopError::Empty) | Err(PopError::Closed) => backoff.snooze(),
            }
        }
    }
}

impl<T> ConcurrentQueue<T> for concurrent_queue::ConcurrentQueue<T> {
    fn register(&self) -> impl Handle<T> {
        ConcurrentQueueHandle { queue: self }
    }
}

impl<T> BoundedQueue for concurrent_queue::ConcurrentQueue<T> {
    fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity(capacity));
        }
        Ok(concurrent_queue::ConcurrentQueue::bounded(capacity))
    }
}
