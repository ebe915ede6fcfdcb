//! Stress test - timeouts racing deliveries
//!
//! Consumers wait with short random timeouts while producers deliver at
//! random moments, so a good share of deliveries land exactly while a wait
//! is expiring. At the end every item must be accounted for: received by a
//! consumer or still buffered. The same race is run against `Condition`,
//! where every successful `signal` must match a successful wait.

use ecore::{
    kinfo, kwarn, AtomicCounter, Condition, CoreError, FastMutex, MultiNotificationQueue, Thread,
};
use rand::Rng;
use std::sync::Arc;
use std::time::Instant;

// ECORE_LOG_LEVEL=info cargo run --release -p ecore-stress -- 20000
fn main() -> ecore::CoreResult<()> {
    println!("=== ecore Stress Test ===\n");

    let rounds: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(5_000);
    let pairs: usize = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(4);

    ecore::init()?;

    let queue_ok = queue_race(rounds, pairs)?;
    let condition_ok = condition_race(rounds, pairs)?;

    if queue_ok && condition_ok {
        println!("\n=== Stress Test Complete ===");
        Ok(())
    } else {
        println!("\n=== Stress Test FAILED ===");
        std::process::exit(1);
    }
}

/// Producers and timed consumers on one queue; returns true if no item
/// was lost or duplicated
fn queue_race(rounds: usize, pairs: usize) -> ecore::CoreResult<bool> {
    println!("--- queue: {} rounds x {} pairs ---", rounds, pairs);

    let queue = Arc::new(MultiNotificationQueue::<usize>::new(rounds * pairs)?);
    let sent = Arc::new(AtomicCounter::new(0));
    let received = Arc::new(AtomicCounter::new(0));
    let timeouts = Arc::new(AtomicCounter::new(0));
    let start = Instant::now();

    let mut threads = Vec::with_capacity(pairs * 2);
    for p in 0..pairs {
        let mut producer = Thread::with_name(format!("producer-{}", p))?;
        let q = Arc::clone(&queue);
        let sent = Arc::clone(&sent);
        producer.start_fn(move || {
            let mut rng = rand::thread_rng();
            for i in 0..rounds {
                if rng.gen_bool(0.5) {
                    Thread::sleep(rng.gen_range(0..3));
                } else {
                    let _ = Thread::yield_now();
                }
                if q.enqueue(p * rounds + i).unwrap_or(false) {
                    sent.increment();
                }
            }
        })?;
        threads.push(producer);

        let mut consumer = Thread::with_name(format!("consumer-{}", p))?;
        let q = Arc::clone(&queue);
        let received = Arc::clone(&received);
        let timeouts = Arc::clone(&timeouts);
        consumer.start_fn(move || {
            let mut rng = rand::thread_rng();
            for _ in 0..rounds {
                match q.wait_dequeue_timeout(rng.gen_range(0..3)) {
                    Ok(Some(_)) => {
                        received.increment();
                    }
                    Ok(None) => {}
                    Err(CoreError::Timeout) => {
                        timeouts.increment();
                    }
                    Err(e) => {
                        kwarn!("dequeue failed: {}", e);
                        return;
                    }
                }
            }
        })?;
        threads.push(consumer);
    }

    for t in threads.iter_mut() {
        t.join()?;
    }

    let left = queue.size()?;
    let sent = sent.value() as usize;
    let received = received.value() as usize;

    println!("Sent:      {}", sent);
    println!("Received:  {}", received);
    println!("Buffered:  {}", left);
    println!("Timeouts:  {}", timeouts.value());
    println!("Elapsed:   {:?}", start.elapsed());

    let ok = received + left == sent;
    if !ok {
        kwarn!("lost or duplicated items: {} + {} != {}", received, left, sent);
    }
    Ok(ok)
}

/// Signalers against timed waiters on one condition; returns true if
/// every released waiter was observed waking
fn condition_race(rounds: usize, pairs: usize) -> ecore::CoreResult<bool> {
    println!("\n--- condition: {} rounds x {} pairs ---", rounds, pairs);

    let cond = Arc::new(Condition::new()?);
    let released = Arc::new(AtomicCounter::new(0));
    let woke = Arc::new(AtomicCounter::new(0));
    let waiters_done = Arc::new(AtomicCounter::new(0));
    let start = Instant::now();

    let mut waiters = Vec::with_capacity(pairs);
    for w in 0..pairs {
        let mut t = Thread::with_name(format!("waiter-{}", w))?;
        let cond = Arc::clone(&cond);
        let woke = Arc::clone(&woke);
        let done = Arc::clone(&waiters_done);
        let lock = FastMutex::new()?;
        t.start_fn(move || {
            let mut rng = rand::thread_rng();
            for _ in 0..rounds {
                // released by try_wait
                if let Err(e) = lock.lock() {
                    kwarn!("lock failed: {}", e);
                    break;
                }
                if cond.try_wait(&lock, rng.gen_range(0..3)).unwrap_or(false) {
                    woke.increment();
                }
            }
            done.increment();
        })?;
        waiters.push(t);
    }

    let mut signalers = Vec::with_capacity(pairs);
    for s in 0..pairs {
        let mut t = Thread::with_name(format!("signaler-{}", s))?;
        let cond = Arc::clone(&cond);
        let released = Arc::clone(&released);
        let done = Arc::clone(&waiters_done);
        t.start_fn(move || {
            let mut rng = rand::thread_rng();
            while (done.value() as usize) < pairs {
                Thread::sleep(rng.gen_range(0..2));
                if cond.signal().unwrap_or(false) {
                    released.increment();
                }
            }
        })?;
        signalers.push(t);
    }

    for t in waiters.iter_mut().chain(signalers.iter_mut()) {
        t.join()?;
    }

    let released = released.value();
    let woke = woke.value();
    println!("Released:  {}", released);
    println!("Woke:      {}", woke);
    println!("Elapsed:   {:?}", start.elapsed());

    let ok = released == woke;
    if !ok {
        kwarn!("signal/wake mismatch: {} released, {} woke", released, woke);
    } else {
        kinfo!("condition race consistent");
    }
    Ok(ok)
}
