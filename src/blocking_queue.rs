//! Two-lock bounded blocking queue.
//!
//! Producers append behind `tail` holding only the tail lock, consumers
//! advance `head` holding only the head lock. The atomic `count` is the only
//! state both sides touch. A side takes the other side's lock only to signal
//! across, and only after releasing its own. `clear` is the single operation
//! holding both, taken tail then head.

use std::{
    fmt,
    marker::PhantomData,
    mem::MaybeUninit,
    ptr,
    sync::{
        atomic::{AtomicPtr, AtomicUsize, Ordering},
        Condvar, Mutex, MutexGuard, PoisonError,
    },
};

use tracing::{debug, info, trace};

use crate::{
    error::{Interrupted, QueueError},
    interrupt::Interrupt,
    BoundedQueue, ConcurrentQueue, Handle,
};

struct Node<T> {
    next: AtomicPtr<Node<T>>,
    // Uninit in the sentinel, which is always the node `head` points at.
    data: MaybeUninit<T>,
}

impl<T> Node<T> {
    fn sentinel() -> *mut Self {
        Box::into_raw(Box::new(Self {
            next: AtomicPtr::new(ptr::null_mut()),
            data: MaybeUninit::uninit(),
        }))
    }

    fn new(data: T) -> *mut Self {
        Box::into_raw(Box::new(Self {
            next: AtomicPtr::new(ptr::null_mut()),
            data: MaybeUninit::new(data),
        }))
    }
}

struct NodePtr<T>(*mut Node<T>);

// The pointer is only dereferenced by the thread holding the mutex around it.
unsafe impl<T: Send> Send for NodePtr<T> {}

pub struct BlockingQueue<T> {
    capacity: usize,
    count: AtomicUsize,
    head: Mutex<NodePtr<T>>,
    tail: Mutex<NodePtr<T>>,
    /// Waited on by producers under the tail lock.
    not_full: Condvar,
    /// Waited on by consumers under the head lock.
    not_empty: Condvar,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for BlockingQueue<T> {}
unsafe impl<T: Send> Sync for BlockingQueue<T> {}

fn lock<P>(mutex: &Mutex<P>) -> MutexGuard<'_, P> {
    // Guarded state is a single pointer, never left half-updated by a panic.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn wait<'a, P>(cond: &Condvar, guard: MutexGuard<'a, P>) -> MutexGuard<'a, P> {
    cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
}

impl<T> BlockingQueue<T> {
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity(capacity));
        }
        let sentinel = Node::sentinel();
        debug!(capacity, "created blocking queue");
        Ok(Self {
            capacity,
            count: AtomicUsize::new(0),
            head: Mutex::new(NodePtr(sentinel)),
            tail: Mutex::new(NodePtr(sentinel)),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            _marker: PhantomData,
        })
    }

    /// Appends `item`, blocking while the queue is full.
    ///
    /// Fails with the item handed back if `interrupt` is raised on entry or
    /// while parked for space; the queue is left untouched and the flag is
    /// consumed. Use [`BlockingQueue::interrupt`] to raise it so that an
    /// already parked producer is woken.
    pub fn put(&self, item: T, interrupt: &Interrupt) -> Result<(), Interrupted<T>> {
        if interrupt.consume() {
            return Err(Interrupted(item));
        }

        let mut tail = lock(&self.tail);
        while self.count.load(Ordering::Acquire) == self.capacity {
            if interrupt.consume() {
                trace!("producer interrupted while waiting for space");
                return Err(Interrupted(item));
            }
            trace!("queue full, producer parking");
            tail = wait(&self.not_full, tail);
        }

        let node = Node::new(item);
        unsafe { (*tail.0).next.store(node, Ordering::Release) };
        tail.0 = node;
        if self.count.fetch_add(1, Ordering::AcqRel) + 1 < self.capacity {
            self.not_full.notify_one();
        }
        drop(tail);

        if !self.is_empty() {
            let _head = lock(&self.head);
            self.not_empty.notify_one();
        }
        Ok(())
    }

    /// Removes the oldest item, blocking while the queue is empty.
    ///
    /// Not interruptible: this waits until some producer delivers an item.
    pub fn take(&self) -> T {
        let mut head = lock(&self.head);
        while self.count.load(Ordering::Acquire) == 0 {
            trace!("queue empty, consumer parking");
            head = wait(&self.not_empty, head);
        }

        // count > 0 guarantees the link was published before the increment.
        let next = unsafe { (*head.0).next.load(Ordering::Acquire) };
        let old = std::mem::replace(&mut head.0, next);
        // `next` becomes the sentinel; its data is moved out exactly once.
        let item = unsafe { (*next).data.assume_init_read() };
        drop(unsafe { Box::from_raw(old) });
        if self.count.fetch_sub(1, Ordering::AcqRel) - 1 > 0 {
            self.not_empty.notify_one();
        }
        drop(head);

        if !self.is_full() {
            let _tail = lock(&self.tail);
            self.not_full.notify_one();
        }
        item
    }

    /// Drops every stored item and wakes one parked producer.
    pub fn clear(&self) {
        let mut tail = lock(&self.tail);
        let head = lock(&self.head);
        let detached = unsafe { (*head.0).next.swap(ptr::null_mut(), Ordering::AcqRel) };
        tail.0 = head.0;
        let cleared = self.count.swap(0, Ordering::AcqRel);
        self.not_full.notify_one();
        drop(head);
        drop(tail);

        // Item destructors run without either lock held.
        unsafe { free_chain(detached) };
        debug!(cleared, "cleared queue");
    }

    /// Raises `interrupt` and wakes parked producers so the one waiting with
    /// it can give up. Others go back to waiting.
    pub fn interrupt(&self, interrupt: &Interrupt) {
        interrupt.raise();
        let _tail = lock(&self.tail);
        self.not_full.notify_all();
        debug!("interrupt raised");
    }

    pub fn register(&self) -> QueueHandle<'_, T> {
        QueueHandle {
            queue: self,
            interrupt: Interrupt::new(),
        }
    }

    /// Snapshot of the number of stored items. May be stale on return.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: fmt::Debug> BlockingQueue<T> {
    /// Logs the node chain from head to tail.
    pub fn dump(&self) {
        let tail = lock(&self.tail);
        let head = lock(&self.head);
        info!(
            len = self.len(),
            capacity = self.capacity,
            head_is_tail = ptr::eq(head.0, tail.0),
            "queue dump"
        );
        info!(index = 0, role = "head", "(sentinel)");
        let mut index = 1;
        let mut node = unsafe { (*head.0).next.load(Ordering::Acquire) };
        while !node.is_null() {
            let role = if ptr::eq(node, tail.0) { "tail" } else { "node" };
            let data = unsafe { (*node).data.assume_init_ref() };
            info!(index, role, item = ?data);
            node = unsafe { (*node).next.load(Ordering::Acquire) };
            index += 1;
        }
    }
}

/// Frees `node` and every node after it, dropping their data.
///
/// # Safety
/// The chain must be unreachable from the queue and every node in it must
/// hold initialized data.
unsafe fn free_chain<T>(mut node: *mut Node<T>) {
    while !node.is_null() {
        let mut boxed = Box::from_raw(node);
        node = boxed.next.load(Ordering::Relaxed);
        boxed.data.assume_init_drop();
    }
}

impl<T> Drop for BlockingQueue<T> {
    fn drop(&mut self) {
        let sentinel = self.head.get_mut().unwrap_or_else(PoisonError::into_inner).0;
        unsafe {
            let first = (*sentinel).next.load(Ordering::Relaxed);
            drop(Box::from_raw(sentinel));
            free_chain(first);
        }
    }
}

impl<T> fmt::Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl<T: Send> BoundedQueue for BlockingQueue<T> {
    fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        Self::new(capacity)
    }
}

impl<T: Send> ConcurrentQueue<T> for BlockingQueue<T> {
    fn register(&self) -> impl Handle<T> {
        BlockingQueue::register(self)
    }
}

/// A thread's view of a [`BlockingQueue`], owning the [`Interrupt`] used by
/// its `put`s.
pub struct QueueHandle<'q, T> {
    queue: &'q BlockingQueue<T>,
    interrupt: Interrupt,
}

impl<'q, T> QueueHandle<'q, T> {
    pub fn put(&mut self, item: T) -> Result<(), Interrupted<T>> {
        self.queue.put(item, &self.interrupt)
    }

    pub fn take(&mut self) -> T {
        self.queue.take()
    }

    /// Returns a handle other threads can use to cancel this handle's `put`.
    pub fn interrupter(&self) -> Interrupter<'q, T> {
        Interrupter {
            queue: self.queue,
            interrupt: self.interrupt.clone(),
        }
    }
}

impl<T: Send> Handle<T> for QueueHandle<'_, T> {
    fn enqueue(&mut self, item: T) -> Result<(), Interrupted<T>> {
        QueueHandle::put(self, item)
    }

    fn dequeue(&mut self) -> T {
        QueueHandle::take(self)
    }
}

pub struct Interrupter<'q, T> {
    queue: &'q BlockingQueue<T>,
    interrupt: Interrupt,
}

impl<T> Interrupter<'_, T> {
    pub fn interrupt(&self) {
        self.queue.interrupt(&self.interrupt);
    }
}

impl<T> Clone for Interrupter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue,
            interrupt: self.interrupt.clone(),
        }
    }
}
