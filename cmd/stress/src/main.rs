//! Work-stealing stress demo.
//!
//! Spawns a large number of short, CPU-only tasks and lets the
//! scheduler's local-queue overflow and stealing paths spread them
//! across every worker. Each task bumps a global counter exactly once
//! and records which worker ran it, so the summary at the end can show
//! every worker participated and no task ran twice.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ringrt::{Config, Runtime};

const TASK_COUNT: usize = 10_000;
const NUM_WORKERS: usize = 4;

fn spin(iterations: u32) -> u64 {
    let mut acc: u64 = 0;
    for i in 0..iterations {
        acc = acc.wrapping_add(u64::from(i).wrapping_mul(2654435761));
    }
    acc
}

fn main() {
    let config = Config::new().num_workers(NUM_WORKERS);
    let rt = Runtime::with_config(config).expect("failed to start runtime");

    let completed = Arc::new(AtomicUsize::new(0));
    let per_worker = Arc::new((0..NUM_WORKERS).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());

    let start = Instant::now();

    rt.block_on({
        let completed = completed.clone();
        let per_worker = per_worker.clone();
        async move {
            let mut handles = Vec::with_capacity(TASK_COUNT);
            for _ in 0..TASK_COUNT {
                let completed = completed.clone();
                let per_worker = per_worker.clone();
                let handle = ringrt::task::spawn(async move {
                    let _ = spin(2_000);
                    completed.fetch_add(1, Ordering::Relaxed);
                    if let Some(id) = ringrt_core::log::get_worker_id() {
                        per_worker[id as usize].fetch_add(1, Ordering::Relaxed);
                    }
                })
                .expect("spawn from inside block_on's task must succeed");
                handles.push(handle);
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    });

    let elapsed = start.elapsed();
    let total = completed.load(Ordering::Relaxed);
    println!("completed {total}/{TASK_COUNT} tasks in {elapsed:?}");
    for (id, count) in per_worker.iter().enumerate() {
        println!("  worker {id}: {} tasks", count.load(Ordering::Relaxed));
    }
    assert_eq!(total, TASK_COUNT, "every task must run exactly once");
}
