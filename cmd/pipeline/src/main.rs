//! Producer/consumer pipeline
//!
//! Producers push numbered jobs into one bounded `MultiNotificationQueue`;
//! consumers take them one at a time and keep per-thread tallies in a
//! `ThreadLocal`. Once every job is accounted for the consumers are
//! released with `wake_up_all`.
//!
//! # Usage
//!
//! ```text
//! pipeline [producers] [consumers] [jobs-per-producer]
//! ```
//!
//! # Environment Variables
//!
//! - `ECORE_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `ECORE_QUEUE_CAPACITY=64` - Queue capacity
//! - `ECORE_THREAD_NAME_PREFIX=worker-` - Prefix for unnamed threads

use ecore::{
    kdebug, kinfo, AtomicCounter, MultiNotificationQueue, Priority, RuntimeConfig, Thread,
    ThreadLocal,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

// ECORE_LOG_LEVEL=debug cargo run -p ecore-pipeline -- 4 4 10000
fn main() -> ecore::CoreResult<()> {
    println!("=== ecore Pipeline ===\n");

    let mut args = std::env::args().skip(1).map(|s| s.parse::<usize>().ok());
    let producers = args.next().flatten().unwrap_or(2);
    let consumers = args.next().flatten().unwrap_or(4);
    let jobs_per_producer = args.next().flatten().unwrap_or(10_000);
    let total_jobs = producers * jobs_per_producer;

    let config = RuntimeConfig::from_env();
    ecore::init_with(&config)?;
    config.print();

    let queue = Arc::new(MultiNotificationQueue::<u64>::from_config(&config)?);
    let consumed = Arc::new(AtomicCounter::new(0));
    let checksum = Arc::new(AtomicU64::new(0));

    println!(
        "{} producers, {} consumers, {} jobs, queue capacity {}",
        producers,
        consumers,
        total_jobs,
        queue.max_size()
    );
    let start = Instant::now();

    let mut consumer_threads = Vec::with_capacity(consumers);
    for _ in 0..consumers {
        let mut t = Thread::from_config(&config)?;
        t.set_priority(Priority::High)?;
        let q = Arc::clone(&queue);
        let consumed = Arc::clone(&consumed);
        let checksum = Arc::clone(&checksum);
        t.start_fn(move || consume(&q, &consumed, &checksum))?;
        consumer_threads.push(t);
    }

    let mut producer_threads = Vec::with_capacity(producers);
    for p in 0..producers {
        let mut t = Thread::with_name(format!("producer-{}", p))?;
        let q = Arc::clone(&queue);
        t.start_fn(move || {
            for i in 0..jobs_per_producer {
                let job = (p * jobs_per_producer + i) as u64;
                // full queue: back off and retry
                while !q.enqueue(job).unwrap_or(false) {
                    let _ = Thread::yield_now();
                }
            }
            kdebug!("done producing");
        })?;
        producer_threads.push(t);
    }

    for t in producer_threads.iter_mut() {
        t.join()?;
    }
    let produce_time = start.elapsed();

    while (consumed.value() as usize) < total_jobs {
        Thread::sleep(1);
    }

    // consumers not yet parked miss a wake-up, so repeat until all exit
    for t in consumer_threads.iter_mut() {
        loop {
            queue.wake_up_all()?;
            if t.try_join(10)? {
                break;
            }
        }
    }
    let total_time = start.elapsed();

    let n = total_jobs as u64;
    let expected = if n == 0 { 0 } else { n * (n - 1) / 2 };
    let checksum = checksum.load(Ordering::Relaxed);

    println!("\n=== Results ===");
    println!("Jobs consumed:   {}", consumed.value());
    println!("Checksum:        {} (expected {})", checksum, expected);
    println!("Produce time:    {:?}", produce_time);
    println!("Total time:      {:?}", total_time);
    println!(
        "Throughput:      {:.0} jobs/sec",
        total_jobs as f64 / total_time.as_secs_f64()
    );

    if checksum != expected {
        println!("\nChecksum mismatch!");
        std::process::exit(1);
    }
    println!("\n=== Pipeline Complete ===");
    Ok(())
}

fn tally() -> &'static ThreadLocal<u64> {
    static TALLY: OnceLock<ThreadLocal<u64>> = OnceLock::new();
    TALLY.get_or_init(ThreadLocal::new)
}

fn consume(queue: &MultiNotificationQueue<u64>, consumed: &AtomicCounter, checksum: &AtomicU64) {
    // Ok(None): released by wake_up_all
    while let Ok(Some(job)) = queue.wait_dequeue() {
        tally().with(|n| *n += 1);
        checksum.fetch_add(job, Ordering::Relaxed);
        consumed.increment();
    }
    let name = Thread::current()
        .and_then(|me| me.name().ok())
        .unwrap_or_default();
    kinfo!("{} consumed {} jobs", name, tally().get());
}
