use crossbeam_queue::ArrayQueue;
use crossbeam_utils::Backoff;

use crate::{BoundedQueue, ConcurrentQueue, Handle, Interrupted, QueueError};

pub struct ArrayQueueHandle<'a, T> {
    queue: &'a ArrayQueue<T>,
}

impl<T> Handle<T> for ArrayQueueHandle<'_, T> {
    fn enqueue(&mut self, item: T) -> Result<(), Interrupted<T>> {
        let backoff = Backoff::new();
        let mut item = item;
        while let Err(rejected) = self.queue.push(item) {
            item = rejected;
            backoff.snooze();
        }
        Ok(())
    }

    fn dequeue(&mut self) -> T {
        let backoff = Backoff::new();
        loop {
            if let Some(item) = self.queue.pop() {
                return item;
            }
            backoff.snooze();
        }
    }
}

impl<T> ConcurrentQueue<T> for ArrayQueue<T> {
    fn register(&self) -> impl Handle<T> {
        ArrayQueueHandle { queue: self }
    }
}

impl<T> BoundedQueue for ArrayQueue<T> {
    fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity(capacity));
        }
        Ok(ArrayQueue::new(capacity))
    }
}
