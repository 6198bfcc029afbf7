//! End-to-end scenarios for the work-stealing pool.

use std::sync::{Arc, Barrier};
use std::thread;

use workstealing_pool::workstealing::pool::Pool;

#[test]
fn ping_pong_between_two_workers_delivers_every_item_once() {
    let pool = Arc::new(Pool::<u64>::new(2));
    let a = pool.add().unwrap();
    let b = pool.add().unwrap();

    const TOTAL: u64 = 20_000;
    for i in 0..TOTAL {
        pool.push(a, i).unwrap();
    }

    let barrier = Arc::new(Barrier::new(2));
    let pool_b = pool.clone();
    let barrier_b = barrier.clone();
    let handle = thread::spawn(move || {
        barrier_b.wait();
        let mut got = Vec::new();
        let mut idle = 0;
        while idle < 2000 {
            match pool_b.pop(b) {
                Some(v) => {
                    got.push(v);
                    idle = 0;
                }
                None => {
                    idle += 1;
                    thread::yield_now();
                }
            }
        }
        got
    });

    barrier.wait();
    let mut got_a = Vec::new();
    let mut idle = 0;
    while idle < 2000 {
        match pool.pop(a) {
            Some(v) => {
                got_a.push(v);
                idle = 0;
            }
            None => {
                idle += 1;
                thread::yield_now();
            }
        }
    }

    let got_b = handle.join().unwrap();
    let mut all: Vec<u64> = got_a.into_iter().chain(got_b).collect();
    all.sort_unstable();
    assert_eq!(all, (0..TOTAL).collect::<Vec<_>>());
}

#[test]
fn worker_churn_does_not_disturb_an_unrelated_live_worker() {
    let pool = Arc::new(Pool::<u64>::new(16));
    let permanent = pool.add().unwrap();
    for i in 0..2_000 {
        pool.push(permanent, i).unwrap();
    }

    let barrier = Arc::new(Barrier::new(5));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let pool = pool.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            for round in 0..500u64 {
                let Ok(worker) = pool.add() else { continue };
                pool.push(worker, round).unwrap();
                let _ = pool.pop_self(worker);
                pool.remove(worker);
            }
        }));
    }

    barrier.wait();
    let mut drained = Vec::new();
    let mut idle = 0;
    while idle < 50_000 {
        match pool.pop(permanent) {
            Some(v) => {
                drained.push(v);
                idle = 0;
            }
            None => idle += 1,
        }
        if drained.len() == 2_000 {
            break;
        }
    }

    for handle in handles {
        handle.join().unwrap();
    }

    drained.sort_unstable();
    assert_eq!(drained, (0..2_000).collect::<Vec<_>>());
}

#[test]
fn pool_stats_reflect_pushes_and_steals_after_ping_pong() {
    let pool: Pool<u64> = Pool::new(2);
    let a = pool.add().unwrap();
    let b = pool.add().unwrap();

    for i in 0..100 {
        pool.push(a, i).unwrap();
    }
    for _ in 0..100 {
        assert!(pool.pop(b).is_some());
    }

    let stats = pool.stats();
    assert_eq!(stats.num_workers, 2);
    assert_eq!(stats.total_push, 100);
    assert_eq!(stats.total_steal, 100);
    assert_eq!(stats.total_len, 0);
    assert_eq!(stats.steal_success_rate, 1.0);
}

#[test]
fn pool_full_once_capacity_is_exhausted() {
    let pool: Pool<i32> = Pool::new(2);
    pool.add().unwrap();
    pool.add().unwrap();
    assert!(pool.add().is_err());
}
