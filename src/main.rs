use clap::{Parser, ValueEnum};
use rand::Rng;
use std::{
    hint,
    process::ExitCode,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    thread,
    time::Instant,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bounded_queues::{BlockingQueue, BoundedQueue, ConcurrentQueue, Handle};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

fn main() -> ExitCode {
    init_tracing();
    let config = BenchConfig::parse();
    let outcome = match config.queue {
        QueueKind::Blocking => run::<BlockingQueue<u64>>(&config),
        QueueKind::ConcurrentQueue => run::<concurrent_queue::ConcurrentQueue<u64>>(&config),
        QueueKind::ArrayQueue => run::<crossbeam_queue::ArrayQueue<u64>>(&config),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(%e, "benchmark failed");
            ExitCode::from(2)
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bounded_queues=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_thread_ids(true).with_target(true))
        .with(filter)
        .init();
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum QueueKind {
    /// Two-lock linked queue with condition variables.
    Blocking,
    /// `concurrent_queue::ConcurrentQueue::bounded` with back-off.
    ConcurrentQueue,
    /// `crossbeam_queue::ArrayQueue` with back-off.
    ArrayQueue,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct BenchConfig {
    /// queue implementation to measure.
    #[arg(long, value_enum, default_value_t = QueueKind::Blocking)]
    queue: QueueKind,
    /// maximum number of items the queue holds.
    #[arg(long, default_value_t = 1024)]
    capacity: usize,
    /// number of elements to add to the queue before starting the main
    /// threaded test. Must not exceed the capacity.
    #[arg(long, default_value_t = 0)]
    prefill: usize,
    /// number of threads pushing elements onto the queue.
    #[arg(long, default_value_t = 4)]
    producer_threads: usize,
    /// number of threads popping elements off the queue.
    #[arg(long, default_value_t = 4)]
    consumer_threads: usize,
    /// number of elements each producer pushes.
    #[arg(long, default_value_t = 1_000_000)]
    items: usize,
    /// pin every thread to its own core, round robin.
    #[arg(long)]
    pin: bool,
    /// upper bound of random busy-wait iterations between operations.
    #[arg(long, default_value_t = 0)]
    jitter: u32,
}

fn run<C>(config: &BenchConfig) -> Result<(), String>
where
    C: BoundedQueue + ConcurrentQueue<u64> + Sync,
{
    if config.prefill > config.capacity {
        return Err(format!(
            "prefill {} exceeds capacity {}",
            config.prefill, config.capacity
        ));
    }
    if config.producer_threads == 0 || config.consumer_threads == 0 {
        return Err("need at least one producer and one consumer".into());
    }
    let queue = C::with_capacity(config.capacity).map_err(|e| e.to_string())?;
    info!(?config, "starting benchmark");

    let mut handle = queue.register();
    for i in 0..config.prefill {
        if handle.enqueue(i as u64).is_err() {
            return Err("prefill interrupted".into());
        }
    }

    let cores = if config.pin {
        core_affinity::get_core_ids().unwrap_or_default()
    } else {
        Vec::new()
    };
    if config.pin && cores.is_empty() {
        warn!("could not list cores, running unpinned");
    }
    let next_core = AtomicUsize::new(0);
    let pin = || {
        if !cores.is_empty() {
            let core = cores[next_core.fetch_add(1, Ordering::Relaxed) % cores.len()];
            if !core_affinity::set_for_current(core) {
                warn!(?core, "failed to pin thread");
            }
        }
    };

    let total = config.producer_threads * config.items + config.prefill;
    let per_consumer = total / config.consumer_threads;
    let remainder = total % config.consumer_threads;

    let enqueues = AtomicUsize::new(config.prefill);
    let retries = AtomicUsize::new(0);
    let dequeues = AtomicUsize::new(0);
    let sent = AtomicU64::new((0..config.prefill as u64).sum());
    let received = AtomicU64::new(0);

    let start = Instant::now();
    thread::scope(|s| {
        for p in 0..config.producer_threads {
            let (queue, pin, enqueues, retries, sent) =
                (&queue, &pin, &enqueues, &retries, &sent);
            s.spawn(move || {
                pin();
                let mut rng = rand::thread_rng();
                let mut handle = queue.register();
                let mut local_retries = 0;
                let mut local_sum = 0;
                for i in 0..config.items {
                    let mut value = (p * config.items + i) as u64;
                    // Consumer shares are fixed up front, so every item must
                    // land. An interrupted put hands the item back; retry it.
                    while let Err(rejected) = handle.enqueue(value) {
                        value = rejected.into_inner();
                        local_retries += 1;
                    }
                    local_sum += value;
                    busy_wait(&mut rng, config.jitter);
                }
                enqueues.fetch_add(config.items, Ordering::Relaxed);
                retries.fetch_add(local_retries, Ordering::Relaxed);
                sent.fetch_add(local_sum, Ordering::Relaxed);
            });
        }
        for c in 0..config.consumer_threads {
            let share = per_consumer + usize::from(c < remainder);
            let (queue, pin, dequeues, received) = (&queue, &pin, &dequeues, &received);
            s.spawn(move || {
                pin();
                let mut rng = rand::thread_rng();
                let mut handle = queue.register();
                let mut local_sum = 0;
                for _ in 0..share {
                    local_sum += handle.dequeue();
                    busy_wait(&mut rng, config.jitter);
                }
                dequeues.fetch_add(share, Ordering::Relaxed);
                received.fetch_add(local_sum, Ordering::Relaxed);
            });
        }
    });
    let elapsed = start.elapsed();

    let enqueues = enqueues.into_inner();
    let dequeues = dequeues.into_inner();
    let retries = retries.into_inner();
    if retries > 0 {
        warn!(retries, "producers were interrupted and retried");
    }
    check_checksum(sent.into_inner(), received.into_inner())?;
    println!(
        "throughput: {}",
        (enqueues + dequeues) as f64 / elapsed.as_secs_f64()
    );
    println!("elapsed: {:?}", elapsed);
    println!("number of enqueues: {}", enqueues);
    println!("number of dequeues: {}", dequeues);
    Ok(())
}

fn check_checksum(sent: u64, received: u64) -> Result<(), String> {
    if sent != received {
        return Err(format!(
            "sum of dequeued values {received} differs from sum of enqueued values {sent}"
        ));
    }
    Ok(())
}

fn busy_wait(rng: &mut impl Rng, jitter: u32) {
    if jitter == 0 {
        return;
    }
    for _ in 0..rng.gen_range(0..=jitter) {
        hint::spin_loop();
    }
}
