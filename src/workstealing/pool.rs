//! Work-stealing pool: one [`Deque`] per participating worker, wired
//! together with a fast self-push/self-pop path and a two-round witnessed
//! scan for stealing from everyone else.
//!
//! Membership is dynamic: [`Pool::add`] hands out a worker index, reusing a
//! removed slot's deque (and its accumulated counters) before growing into a
//! fresh one, and [`Pool::remove`] just tombstones the slot — a worker that
//! is mid-steal against a just-removed slot still sees a perfectly valid,
//! merely abandoned, deque.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::backoff::Backoff;
use super::deque::{Deque, DequeStats, StrongSteal};

/// Error returned by [`Pool::add`] when every configured worker slot is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolFull;

/// Aggregate diagnostic counters across every registered worker, grounded on
/// the pack's `WorkStealingDeque::stats()`/`PoolStats` (an observability side
/// channel, not something the stealing algorithm itself consults).
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub num_workers: usize,
    pub total_push: u64,
    pub total_pop: u64,
    pub total_steal: u64,
    pub total_steal_attempt: u64,
    pub total_grow: u64,
    pub total_len: u64,
    pub steal_success_rate: f64,
}

struct PoolWorker<T> {
    deque: Deque<T>,
    /// Index to resume the steal scan from next time; owner-only.
    stealing_from: AtomicUsize,
    /// Set on push, cleared on a failed self-pop; owner-only fast-path hint.
    pushed: AtomicBool,
    removed: AtomicBool,
}

impl<T> PoolWorker<T> {
    fn new(index: usize) -> Self {
        Self {
            deque: Deque::new(),
            stealing_from: AtomicUsize::new(index),
            pushed: AtomicBool::new(false),
            removed: AtomicBool::new(false),
        }
    }
}

/// A fixed-capacity table of per-worker work-stealing deques.
pub struct Pool<T> {
    workers: Box<[PoolWorker<T>]>,
    capacity: usize,
    count: AtomicUsize,
}

unsafe impl<T: Send> Send for Pool<T> {}
unsafe impl<T: Send> Sync for Pool<T> {}

impl<T> Pool<T> {
    /// Creates a pool with room for up to `capacity` concurrently-registered
    /// workers. No worker is registered yet; call [`Pool::add`] to get one.
    pub fn new(capacity: usize) -> Self {
        let workers = (0..capacity).map(PoolWorker::new).collect::<Vec<_>>();
        Self {
            workers: workers.into_boxed_slice(),
            capacity,
            count: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of registered (live or tombstoned-but-not-yet-reused)
    /// worker slots. Monotonic except across reuse via [`Pool::add`].
    pub fn len(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Registers a new worker, reusing a removed slot's deque if one is
    /// available. Returns the worker index to pass to every other method.
    pub fn add(&self) -> Result<usize, PoolFull> {
        let count = self.count.load(Ordering::SeqCst);

        for i in 0..count {
            let worker = &self.workers[i];
            if worker
                .removed
                .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                // `pushed` and `stealing_from` are left exactly as the previous
                // occupant left them, matching the source this is grounded on
                // (see DESIGN.md's tombstone-reuse Open Question decision).
                return Ok(i);
            }
        }

        let mut count = count;
        loop {
            if count == self.capacity {
                return Err(PoolFull);
            }
            match self.count.compare_exchange_weak(
                count,
                count + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    let worker = &self.workers[count];
                    worker.stealing_from.store(count, Ordering::Relaxed);
                    return Ok(count);
                }
                Err(actual) => count = actual,
            }
        }
    }

    /// Tombstones `thread`'s slot. Has no effect on in-flight steals against
    /// it; its deque and counters stay exactly as they were until a future
    /// [`Pool::add`] reuses the slot.
    pub fn remove(&self, thread: usize) {
        self.workers[thread].removed.store(true, Ordering::SeqCst);
    }

    /// Owner-only. Pushes onto `thread`'s own deque.
    pub fn push(&self, thread: usize, value: T) -> Result<(), super::deque::Full> {
        let worker = &self.workers[thread];
        worker.pushed.store(true, Ordering::Relaxed);
        worker.deque.push(value)
    }

    /// Owner-only. Pops from `thread`'s own bottom (LIFO).
    pub fn pop_self(&self, thread: usize) -> Option<T> {
        self.workers[thread].deque.pop_back()
    }

    /// Owner-only. Runs the two-round witnessed scan over every other
    /// worker, resuming from wherever `thread` last successfully stole.
    pub fn pop_others(&self, thread: usize) -> Option<T> {
        let worker = &self.workers[thread];
        let steal_base = worker.stealing_from.load(Ordering::Relaxed);
        let (found_at, value) = self.scan(steal_base, Some(thread))?;
        worker.stealing_from.store(found_at, Ordering::Relaxed);
        Some(value)
    }

    /// Owner fast path: try `thread`'s own deque first (only if it has
    /// pushed since the last failed self-pop), then fall back to stealing.
    pub fn pop(&self, thread: usize) -> Option<T> {
        let worker = &self.workers[thread];
        if worker.pushed.load(Ordering::Relaxed) {
            if let Some(value) = self.pop_self(thread) {
                return Some(value);
            }
            worker.pushed.store(false, Ordering::Relaxed);
        }

        self.pop_others(thread)
    }

    /// Scans every worker starting just after `steal_base`, without
    /// excluding any particular thread. Useful for a dedicated stealer that
    /// owns no deque of its own.
    pub fn pop_others_from(&self, steal_base: usize) -> Option<T> {
        self.scan(steal_base, None).map(|(_, value)| value)
    }

    /// The witnessed two-round steal scan (spec §4.3).
    ///
    /// Round 0 records, for every victim observed empty, a witness ticket
    /// combining the `bot` value seen and that deque's `bot_ticket` counter.
    /// Round 1 re-checks the same victims: if any witness ticket changed, the
    /// owner popped (and possibly re-pushed) something between rounds, which
    /// could have raced a concurrent steal into appearing to have succeeded
    /// against stale state — so the whole scan restarts. A membership change
    /// (`count()` moving) between rounds restarts it too.
    fn scan(&self, steal_base: usize, filter_thread: Option<usize>) -> Option<(usize, T)> {
        let mut witnesses: Vec<u64> = Vec::new();
        let mut backoff = Backoff::new();

        'restart: loop {
            let count = self.count.load(Ordering::Relaxed);
            if count == 0 {
                return None;
            }

            witnesses.clear();
            witnesses.resize(count, 0);

            let base = match filter_thread {
                Some(_) => steal_base,
                None => steal_base % count,
            };

            for round in 0..2 {
                let mut steal = base;
                for _ in 0..count {
                    steal += 1;
                    if steal >= count {
                        steal = 0;
                    }

                    if filter_thread.is_some_and(|thread| steal == thread) {
                        continue;
                    }

                    let victim = &self.workers[steal];
                    match victim.deque.pop_strong() {
                        StrongSteal::Success(value) => return Some((steal, value)),
                        StrongSteal::Empty { observed_bot } => {
                            let ticket = observed_bot.wrapping_add(victim.deque.bot_ticket());
                            if round == 0 {
                                witnesses[steal] = ticket;
                            } else if witnesses[steal] != ticket {
                                backoff.spin();
                                continue 'restart;
                            }
                        }
                    }
                }

                let new_count = self.count.load(Ordering::Relaxed);
                if new_count != count {
                    backoff.spin();
                    continue 'restart;
                }
            }

            return None;
        }
    }

    /// Aggregates every live-or-tombstoned worker's [`DequeStats`] into a
    /// single pool-wide snapshot.
    pub fn stats(&self) -> PoolStats {
        let count = self.count.load(Ordering::SeqCst);
        let mut stats = PoolStats {
            num_workers: count,
            ..PoolStats::default()
        };

        for worker in &self.workers[..count] {
            let DequeStats {
                push_count,
                pop_count,
                steal_count,
                steal_attempt_count,
                grow_count,
                current_len,
            } = worker.deque.stats();
            stats.total_push += push_count;
            stats.total_pop += pop_count;
            stats.total_steal += steal_count;
            stats.total_steal_attempt += steal_attempt_count;
            stats.total_grow += grow_count;
            stats.total_len += current_len;
        }

        stats.steal_success_rate = if stats.total_steal_attempt > 0 {
            stats.total_steal as f64 / stats.total_steal_attempt as f64
        } else {
            0.0
        };

        stats
    }
}
