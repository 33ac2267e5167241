//! Bounded non-blocking queues from the ecosystem, made to block by backing
//! off while full or empty. Used as comparison points for [`BlockingQueue`].
//!
//! [`BlockingQueue`]: crate::blocking_queue::BlockingQueue

pub mod array_queue;
pub mod concurrent_queue;
