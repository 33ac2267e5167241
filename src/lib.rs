pub mod baselines;
pub mod blocking_queue;
pub mod error;
pub mod interrupt;

pub use blocking_queue::BlockingQueue;
pub use error::{Interrupted, QueueError};
pub use interrupt::Interrupt;

pub trait BoundedQueue: Sized {
    /// Creates an empty queue holding at most `capacity` items.
    fn with_capacity(capacity: usize) -> Result<Self, QueueError>;
}

pub trait ConcurrentQueue<T> {
    /// Returns a thread handle to the queue, which can be used for enqueues and dequeues
    fn register(&self) -> impl Handle<T>;
}

pub trait Handle<T> {
    /// Blocks while the queue is full.
    fn enqueue(&mut self, item: T) -> Result<(), Interrupted<T>>;

    /// Blocks while the queue is empty.
    fn dequeue(&mut self) -> T;
}
