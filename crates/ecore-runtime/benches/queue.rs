//! Notification queue throughput
//!
//! One producer against one consumer, and the uncontended lock paths the
//! queues are built on.

use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ecore_runtime::{FastMutex, MultiNotificationQueue, Mutex, SingleNotificationQueue};

const ITEMS: u64 = 10_000;

fn bench_locks(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock");

    let fast = FastMutex::new().unwrap();
    group.bench_function("fast_mutex_uncontended", |b| {
        b.iter(|| {
            fast.lock().unwrap();
            fast.unlock().unwrap();
        })
    });

    let recursive = Mutex::new().unwrap();
    group.bench_function("mutex_uncontended", |b| {
        b.iter(|| {
            recursive.lock().unwrap();
            recursive.unlock().unwrap();
        })
    });

    group.finish();
}

fn bench_multi_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_queue");
    group.throughput(Throughput::Elements(ITEMS));

    for capacity in [16usize, 1024] {
        group.bench_with_input(BenchmarkId::new("spsc", capacity), &capacity, |b, &cap| {
            b.iter(|| {
                let q = Arc::new(MultiNotificationQueue::new(cap).unwrap());
                let cq = Arc::clone(&q);
                let consumer = thread::spawn(move || {
                    let mut sum = 0u64;
                    for _ in 0..ITEMS {
                        sum += cq.wait_dequeue().unwrap().unwrap();
                    }
                    sum
                });
                for i in 0..ITEMS {
                    while !q.enqueue(i).unwrap() {
                        thread::yield_now();
                    }
                }
                black_box(consumer.join().unwrap())
            })
        });
    }

    group.finish();
}

fn bench_single_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_queue");
    group.throughput(Throughput::Elements(ITEMS));

    group.bench_function("spsc_batch", |b| {
        b.iter(|| {
            let q = Arc::new(SingleNotificationQueue::new(1024).unwrap());
            let cq = Arc::clone(&q);
            let consumer = thread::spawn(move || {
                let mut batch = Vec::new();
                let mut seen = 0u64;
                while seen < ITEMS {
                    batch.clear();
                    cq.wait_dequeue(&mut batch).unwrap();
                    seen += batch.len() as u64;
                }
                seen
            });
            for i in 0..ITEMS {
                while !q.enqueue(i).unwrap() {
                    thread::yield_now();
                }
            }
            black_box(consumer.join().unwrap())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_locks, bench_multi_queue, bench_single_queue);
criterion_main!(benches);
