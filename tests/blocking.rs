use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use bounded_queues::{BlockingQueue, Handle, Interrupt};
use rand::Rng;

#[test]
fn put_blocks_until_take_on_full_queue() {
    let block_delay = Duration::from_millis(200);
    let queue = BlockingQueue::new(1).unwrap();
    let mut qh = queue.register();
    qh.put(1).unwrap();

    let start = Instant::now();
    thread::scope(|s| {
        let queue = &queue;
        let unblocker = thread::Builder::new()
            .name("unblocker".into())
            .spawn_scoped(s, move || {
                thread::sleep(block_delay);
                queue.take()
            })
            .unwrap();

        qh.put(2).unwrap();
        assert!(start.elapsed() >= block_delay);
        assert_eq!(unblocker.join().unwrap(), 1);
    });

    assert_eq!(qh.take(), 2);
    assert_eq!(queue.len(), 0);
}

#[test]
fn fifo_order_single_thread() {
    let queue = BlockingQueue::new(64).unwrap();
    let mut qh = queue.register();
    let values: Vec<u32> = (0..64).map(|i| i * 7 % 13).collect();
    for &v in &values {
        qh.put(v).unwrap();
    }
    let taken: Vec<u32> = (0..64).map(|_| qh.take()).collect();
    assert_eq!(taken, values);
}

#[test]
fn size_never_exceeds_capacity() {
    const CAPACITY: usize = 3;
    let queue = BlockingQueue::new(CAPACITY).unwrap();
    let done = AtomicBool::new(false);
    let max_seen = AtomicUsize::new(0);

    thread::scope(|s| {
        let (queue, done, max_seen) = (&queue, &done, &max_seen);
        s.spawn(move || {
            while !done.load(Ordering::Relaxed) {
                max_seen.fetch_max(queue.len(), Ordering::Relaxed);
            }
        });
        let producers: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(move || {
                    let mut qh = queue.register();
                    for i in 0..2_000 {
                        qh.put(i).unwrap();
                    }
                })
            })
            .collect();
        let consumers: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(move || {
                    for _ in 0..4_000 {
                        queue.take();
                    }
                })
            })
            .collect();
        for t in producers.into_iter().chain(consumers) {
            t.join().unwrap();
        }
        done.store(true, Ordering::Relaxed);
    });

    assert!(max_seen.into_inner() <= CAPACITY);
    assert!(queue.is_empty());
}

#[test]
fn many_producers_and_consumers_all_complete() {
    const THREADS: usize = 8;
    const ITEMS: usize = 500;
    let queue = BlockingQueue::new(4).unwrap();
    let collected = Mutex::new(Vec::with_capacity(THREADS * ITEMS));

    thread::scope(|s| {
        for p in 0..THREADS {
            let queue = &queue;
            s.spawn(move || {
                let mut rng = rand::thread_rng();
                let mut qh = queue.register();
                for i in (p * ITEMS)..((p + 1) * ITEMS) {
                    qh.enqueue(i).unwrap();
                    if rng.gen_ratio(1, 50) {
                        thread::yield_now();
                    }
                }
            });
        }
        for _ in 0..THREADS {
            s.spawn(|| {
                let mut qh = queue.register();
                let local: Vec<_> = (0..ITEMS).map(|_| qh.dequeue()).collect();
                collected.lock().unwrap().extend(local);
            });
        }
    });

    let mut collected = collected.into_inner().unwrap();
    collected.sort_unstable();
    assert_eq!(collected, (0..THREADS * ITEMS).collect::<Vec<_>>());
    assert!(queue.is_empty());
}

#[test]
fn clear_unblocks_a_waiting_producer() {
    let queue = BlockingQueue::new(2).unwrap();
    let mut qh = queue.register();
    qh.put('a').unwrap();
    qh.put('b').unwrap();

    thread::scope(|s| {
        let producer = s.spawn(|| queue.register().put('c'));
        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());
        queue.clear();
        producer.join().unwrap().unwrap();
    });

    assert_eq!(queue.len(), 1);
    assert_eq!(qh.take(), 'c');
    qh.put('d').unwrap();
    qh.put('e').unwrap();
    assert!(queue.is_full());
}

#[test]
fn interrupted_put_leaves_queue_unchanged() {
    let queue = BlockingQueue::new(2).unwrap();
    let interrupt = Interrupt::new();
    queue.put(1, &interrupt).unwrap();
    queue.put(2, &interrupt).unwrap();

    thread::scope(|s| {
        let producer = s.spawn(|| queue.put(3, &interrupt));
        thread::sleep(Duration::from_millis(50));
        queue.interrupt(&interrupt);
        let rejected = producer.join().unwrap().unwrap_err();
        assert_eq!(rejected.into_inner(), 3);
    });

    assert!(!interrupt.is_raised());
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.take(), 1);
    assert_eq!(queue.take(), 2);
}

#[test]
fn take_is_not_interruptible() {
    let queue = BlockingQueue::new(1).unwrap();
    let (tx, rx) = mpsc::channel();

    thread::scope(|s| {
        let consumer = s.spawn(|| {
            let value = queue.take();
            tx.send(()).unwrap();
            value
        });

        // Raising a producer interrupt wakes nothing on the consumer side.
        let interrupt = Interrupt::new();
        queue.interrupt(&interrupt);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(!consumer.is_finished());

        queue.put(42, &Interrupt::new()).unwrap();
        assert_eq!(consumer.join().unwrap(), 42);
    });
}
