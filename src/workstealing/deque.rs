//! Chase-Lev work-stealing deque.
//!
//! The owner pushes and pops from the bottom (`push`, `pop_back`); any number
//! of thieves concurrently pop from the top (`pop`). Growth is triggered by
//! the owner alone and is invisible to thieves: a stale block stays reachable
//! through its `next` link for the lifetime of the deque, so a thief that
//! loaded the old block pointer before a resize still reads a correct value.
//!
//! Reference: Chase & Lev, "Dynamic Circular Work-Stealing Deque" (2005).
//! The deferred copy-out in `pop_back` — reserve the slot via the `top` CAS
//! (or the `t < b` fast path) and only then copy the payload — is the one
//! deliberate deviation from the paper; since the owner is the sole writer,
//! nothing can race the copy once the slot is reserved.

use alloc::boxed::Box;
use core::fmt;

use super::arena::{free_chain, Block, MIN_CAPACITY};
use super::backoff::Backoff;
use super::variant::{fence, AtomicPtr, AtomicU64, Ordering};
use crate::workstealing::cache_padded::CachePadded;

/// Error returned by [`Deque::push`] when the deque is at `max_capacity` and
/// cannot grow further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full;

impl fmt::Display for Full {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("deque is at its configured max capacity")
    }
}

/// Outcome of a single thief `pop` attempt.
#[derive(Debug)]
pub enum Steal<T> {
    /// Successfully stole a value.
    Success(T),
    /// The deque was observed empty. Carries the `bot` value seen during the
    /// attempt, which the [`Pool`](crate::workstealing::pool::Pool)'s steal
    /// scan uses as part of its linearizable-emptiness witness.
    Empty { observed_bot: u64 },
    /// A concurrent thief won the race for the same slot; retry.
    Retry,
}

impl<T> Steal<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Steal::Success(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Steal::Empty { .. })
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, Steal::Retry)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Steal::Success(v) => Some(v),
            _ => None,
        }
    }
}

/// Outcome of the retrying (`FAILED_RACE`-absorbing) thief pop.
#[derive(Debug)]
pub enum StrongSteal<T> {
    Success(T),
    Empty { observed_bot: u64 },
}

impl<T> StrongSteal<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            StrongSteal::Success(v) => Some(v),
            StrongSteal::Empty { .. } => None,
        }
    }
}

#[inline]
fn diff(a: u64, b: u64) -> i64 {
    a.wrapping_sub(b) as i64
}

/// An unbounded (or optionally capped) single-owner, multi-thief deque.
///
/// `top` and `bot` live on separate cache lines: thieves hammer `top`, the
/// owner hammers `bot`, and keeping them apart avoids false sharing between
/// the two groups.
pub struct Deque<T> {
    top: CachePadded<AtomicU64>,
    bot: CachePadded<AtomicU64>,
    /// Witness counter for the pool's two-round steal scan (§4.3): bumped
    /// under `SeqCst` at the start of every `pop_back`, so a thief can tell
    /// "bot cycled back to its old value because of a failed pop_back" apart
    /// from "nothing happened".
    bot_ticket: AtomicU64,
    block: AtomicPtr<Block<T>>,
    max_capacity: Option<u64>,
    permuted: bool,
    push_count: AtomicU64,
    pop_count: AtomicU64,
    steal_count: AtomicU64,
    steal_attempt_count: AtomicU64,
    grow_count: AtomicU64,
}

/// Point-in-time diagnostic counters for a [`Deque`]. Never consulted by the
/// deque itself — purely an observability side channel, grounded on the
/// pack's `WorkStealingDeque::stats()` (counters, not logging, since logging
/// on this hot path would defeat §5's wait-free/lock-free guarantees).
#[derive(Debug, Clone, Copy, Default)]
pub struct DequeStats {
    pub push_count: u64,
    pub pop_count: u64,
    pub steal_count: u64,
    pub steal_attempt_count: u64,
    pub grow_count: u64,
    pub current_len: u64,
}

unsafe impl<T: Send> Send for Deque<T> {}
unsafe impl<T: Send> Sync for Deque<T> {}

impl<T> Deque<T> {
    /// Creates an empty, unbounded deque. No block is allocated until the
    /// first push.
    pub fn new() -> Self {
        Self::with_max_capacity(None)
    }

    /// Creates an empty deque whose block never grows past
    /// `next_power_of_two(max_capacity)`.
    pub fn with_max_capacity(max_capacity: Option<u64>) -> Self {
        Self {
            top: CachePadded::new(AtomicU64::new(0)),
            bot: CachePadded::new(AtomicU64::new(0)),
            bot_ticket: AtomicU64::new(0),
            block: AtomicPtr::new(core::ptr::null_mut()),
            max_capacity,
            permuted: false,
            push_count: AtomicU64::new(0),
            pop_count: AtomicU64::new(0),
            steal_count: AtomicU64::new(0),
            steal_attempt_count: AtomicU64::new(0),
            grow_count: AtomicU64::new(0),
        }
    }

    /// Like [`Deque::with_max_capacity`], additionally enabling the
    /// speculative slot bit-permutation (spec §9, Open Questions). Off by
    /// default; does not change which logical index holds which value.
    pub fn with_permuted_slots(max_capacity: Option<u64>) -> Self {
        let mut this = Self::with_max_capacity(max_capacity);
        this.permuted = true;
        this
    }

    /// Owner-only. Pushes `value` onto the bottom of the deque.
    ///
    /// Grows the backing block when full; returns [`Full`] only when growth
    /// would exceed the configured `max_capacity`.
    pub fn push(&self, value: T) -> Result<(), Full> {
        let b = self.bot.load(Ordering::Relaxed);
        let t = self.top.load(Ordering::Acquire);
        let mut block_ptr = self.block.load(Ordering::Relaxed);

        let current_mask: i64 = if block_ptr.is_null() {
            -1
        } else {
            unsafe { (*block_ptr).capacity() as i64 - 1 }
        };

        if diff(b, t) > current_mask {
            let to_size = b.wrapping_sub(t).wrapping_add(1);
            let grown = self.grow_to(to_size, block_ptr);
            if grown == block_ptr {
                return Err(Full);
            }
            block_ptr = grown;
        }

        // Safety: block_ptr is non-null and has capacity for slot `b` per the check above.
        let block = unsafe { &*block_ptr };
        unsafe {
            block.write(b, value);
        }

        fence(Ordering::Release);
        self.bot.store(b.wrapping_add(1), Ordering::Relaxed);
        self.push_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Owner-only. Pops from the bottom (LIFO with respect to `push`).
    ///
    /// Races with thieves only on the last remaining element.
    pub fn pop_back(&self) -> Option<T> {
        let b = self.bot.load(Ordering::Relaxed).wrapping_sub(1);
        let block_ptr = self.block.load(Ordering::Relaxed);
        self.bot.store(b, Ordering::Relaxed);
        // SeqCst RMW: both the witness bump and the fence the algorithm needs
        // between the bot write above and the top read below.
        self.bot_ticket.fetch_add(1, Ordering::SeqCst);
        let t = self.top.load(Ordering::Relaxed);

        let d = diff(t, b);
        if d > 0 {
            // Empty: undo the tentative decrement.
            self.bot.store(b.wrapping_add(1), Ordering::Relaxed);
            return None;
        }

        if d == 0 {
            // Last element: race the thieves for it.
            if self
                .top
                .compare_exchange(t, t.wrapping_add(1), Ordering::SeqCst, Ordering::Relaxed)
                .is_err()
            {
                // Lost: a thief took it first.
                self.bot.store(b.wrapping_add(1), Ordering::Relaxed);
                return None;
            }
            self.bot.store(b.wrapping_add(1), Ordering::Relaxed);
        }

        // Safety: slot `b` is secured either because `t < b` (no contest
        // possible — thieves can't reach past `top`) or because we just won
        // the CAS above.
        let block = unsafe { &*block_ptr };
        self.pop_count.fetch_add(1, Ordering::Relaxed);
        Some(unsafe { block.read(b) })
    }

    /// Thief-callable. Attempts to steal from the top; may spuriously report
    /// [`Steal::Retry`] under contention with another thief.
    pub fn pop(&self) -> Steal<T> {
        self.steal_attempt_count.fetch_add(1, Ordering::Relaxed);
        let t = self.top.load(Ordering::Acquire);
        fence(Ordering::SeqCst);
        let b = self.bot.load(Ordering::Acquire);

        if diff(t, b) >= 0 {
            return Steal::Empty { observed_bot: b };
        }

        // Acquire: the strongest ordering available in `core::sync::atomic`,
        // a valid strengthening of the reference algorithm's consume load.
        let block_ptr = self.block.load(Ordering::Acquire);
        let block = unsafe { &*block_ptr };

        match self
            .top
            .compare_exchange(t, t.wrapping_add(1), Ordering::SeqCst, Ordering::Relaxed)
        {
            // Safety: we just won exclusive rights to slot `t`; nobody else
            // can read or overwrite it from here on.
            Ok(_) => {
                self.steal_count.fetch_add(1, Ordering::Relaxed);
                Steal::Success(unsafe { block.read(t) })
            }
            Err(_) => Steal::Retry,
        }
    }

    /// Thief-callable. Retries internally until the result is not
    /// [`Steal::Retry`]; `FAILED_RACE` never escapes this call.
    pub fn pop_strong(&self) -> StrongSteal<T> {
        let mut backoff = Backoff::new();
        loop {
            match self.pop() {
                Steal::Success(v) => return StrongSteal::Success(v),
                Steal::Empty { observed_bot } => return StrongSteal::Empty { observed_bot },
                Steal::Retry => backoff.spin(),
            }
        }
    }

    /// Reads the witness counter used by the pool's steal scan. Relaxed: it
    /// only needs to detect *that* a pop_back happened between two reads, not
    /// establish a global order on its own.
    pub(crate) fn bot_ticket(&self) -> u64 {
        self.bot_ticket.load(Ordering::Relaxed)
    }

    /// Ensures the deque can hold at least `to_size` items without growing
    /// again. Returns `true` if the capacity is (now) sufficient, `false` if
    /// `to_size` exceeds the configured `max_capacity`.
    pub fn reserve(&self, to_size: u64) -> bool {
        let block_ptr = self.block.load(Ordering::Relaxed);
        let old_cap = if block_ptr.is_null() {
            0
        } else {
            unsafe { (*block_ptr).capacity() }
        };
        if old_cap >= to_size {
            return true;
        }
        self.grow_to(to_size, block_ptr) != block_ptr
    }

    fn grow_to(&self, to_size: u64, current: *mut Block<T>) -> *mut Block<T> {
        if let Some(max_capacity) = self.max_capacity {
            if to_size > max_capacity {
                return current;
            }
        }

        let new_cap = MIN_CAPACITY.max(to_size).next_power_of_two();
        let new_block = Block::new(new_cap, current, self.permuted);

        if !current.is_null() {
            let t = self.top.load(Ordering::Relaxed);
            let b = self.bot.load(Ordering::Relaxed);
            // Safety: owner-only path; [t, b) are all initialized in `current`
            // and `new_cap >= to_size >= b - t`, so they all fit.
            unsafe {
                (*current).duplicate_into(&new_block, t, b);
            }
        }

        let new_ptr = Box::into_raw(new_block);
        self.block.store(new_ptr, Ordering::Release);
        self.grow_count.fetch_add(1, Ordering::Relaxed);
        new_ptr
    }

    /// Snapshot of this deque's diagnostic counters. Never consulted by the
    /// deque's own algorithm — purely observability.
    pub fn stats(&self) -> DequeStats {
        DequeStats {
            push_count: self.push_count.load(Ordering::Relaxed),
            pop_count: self.pop_count.load(Ordering::Relaxed),
            steal_count: self.steal_count.load(Ordering::Relaxed),
            steal_attempt_count: self.steal_attempt_count.load(Ordering::Relaxed),
            grow_count: self.grow_count.load(Ordering::Relaxed),
            current_len: self.len(),
        }
    }

    /// Current backing capacity. `0` before the first push.
    pub fn capacity(&self) -> u64 {
        let p = self.block.load(Ordering::Relaxed);
        if p.is_null() {
            0
        } else {
            unsafe { (*p).capacity() }
        }
    }

    /// Approximate item count: `max(0, bot - top)`.
    pub fn len(&self) -> u64 {
        let b = self.bot.load(Ordering::Relaxed);
        let t = self.top.load(Ordering::Relaxed);
        let d = diff(b, t);
        if d > 0 {
            d as u64
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Deque<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Deque<T> {
    fn drop(&mut self) {
        // Drain the live items out of the current block so their destructors
        // run; stale blocks only ever hold duplicate copies that were either
        // already taken or copied forward, so freeing them raw is correct.
        while self.pop_back().is_some() {}

        let head = self.block.load(Ordering::Relaxed);
        // Safety: `head` was produced by `Box::into_raw` in `grow_to` (or is
        // null), and this is the only place the chain is freed.
        unsafe {
            free_chain(head);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn empty_deque_reports_empty() {
        let deque: Deque<u64> = Deque::new();
        assert!(matches!(deque.pop(), Steal::Empty { .. }));
        assert_eq!(deque.pop_back(), None);
        assert_eq!(deque.len(), 0);
        assert_eq!(deque.capacity(), 0);

        assert!(deque.reserve(100));
        assert!(deque.capacity() >= 100);
        assert_eq!(deque.len(), 0);
    }

    #[test]
    fn owner_lifo_push_pop_back() {
        let deque: Deque<i32> = Deque::new();
        for i in 0..1000 {
            deque.push(i).unwrap();
        }
        for i in (0..1000).rev() {
            assert_eq!(deque.pop_back(), Some(i));
        }
        assert_eq!(deque.pop_back(), None);
    }

    #[test]
    fn thief_steals_fifo_order() {
        let deque: Deque<i32> = Deque::new();
        for i in 0..100 {
            deque.push(i).unwrap();
        }

        let mut received = Vec::new();
        loop {
            match deque.pop_strong() {
                StrongSteal::Success(v) => received.push(v),
                StrongSteal::Empty { .. } => break,
            }
        }

        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn push_then_pop_back_round_trips_and_preserves_count() {
        let deque: Deque<i32> = Deque::new();
        deque.push(42).unwrap();
        let before = deque.len();
        assert_eq!(deque.pop_back(), Some(42));
        assert_eq!(before, 1);
        assert_eq!(deque.len(), 0);
    }

    #[test]
    fn pop_back_on_empty_is_externally_invisible() {
        let deque: Deque<i32> = Deque::new();
        deque.push(1).unwrap();
        assert_eq!(deque.pop_back(), Some(1));
        let cap_before = deque.capacity();
        assert_eq!(deque.pop_back(), None);
        assert_eq!(deque.pop_back(), None);
        assert_eq!(deque.capacity(), cap_before);
        assert_eq!(deque.len(), 0);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let deque: Deque<i32> = Deque::new();
        for i in 0..500 {
            deque.push(i).unwrap();
        }
        assert!(deque.capacity() >= 500);
        for i in (0..500).rev() {
            assert_eq!(deque.pop_back(), Some(i));
        }
    }

    #[test]
    fn full_at_max_capacity() {
        let deque: Deque<i32> = Deque::with_max_capacity(Some(4));
        for i in 0..4 {
            assert!(deque.push(i).is_ok());
        }
        assert_eq!(deque.push(4), Err(Full));
        assert_eq!(deque.pop_back(), Some(3));
        assert!(deque.push(4).is_ok());
    }

    #[test]
    fn producer_and_many_thieves_partition_the_stream() {
        let deque = Arc::new(Deque::<u64>::new());
        const PRODUCED: u64 = 20_000;
        const THIEVES: usize = 8;

        let barrier = Arc::new(Barrier::new(THIEVES + 1));
        let mut handles = Vec::new();

        for _ in 0..THIEVES {
            let deque = deque.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                let mut mine = Vec::new();
                let mut idle = 0;
                while idle < 2000 {
                    match deque.pop_strong() {
                        StrongSteal::Success(v) => {
                            mine.push(v);
                            idle = 0;
                        }
                        StrongSteal::Empty { .. } => {
                            idle += 1;
                            thread::yield_now();
                        }
                    }
                }
                mine
            }));
        }

        barrier.wait();
        for i in 0..PRODUCED {
            deque.push(i).unwrap();
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        while let Some(v) = deque.pop_back() {
            all.push(v);
        }

        all.sort_unstable();
        assert_eq!(all, (0..PRODUCED).collect::<Vec<_>>());
        let mut dedup = all.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), all.len());
    }

    #[test]
    fn stats_count_pushes_pops_steals_and_growth() {
        let deque: Deque<u64> = Deque::new();
        for i in 0..(MIN_CAPACITY + 1) {
            deque.push(i).unwrap();
        }
        assert_eq!(deque.pop_strong().into_option(), Some(0));
        assert_eq!(deque.pop_back(), Some(MIN_CAPACITY));

        let stats = deque.stats();
        assert_eq!(stats.push_count, MIN_CAPACITY + 1);
        assert_eq!(stats.pop_count, 1);
        assert_eq!(stats.steal_count, 1);
        assert!(stats.steal_attempt_count >= 1);
        assert_eq!(stats.grow_count, 1);
        assert_eq!(stats.current_len, MIN_CAPACITY - 1);
    }

    #[test]
    fn growth_is_invisible_to_a_thief_holding_the_old_block() {
        let deque: Deque<u64> = Deque::new();
        for i in 0..MIN_CAPACITY {
            deque.push(i).unwrap();
        }
        // One more push forces a grow while the deque still has `MIN_CAPACITY`
        // live items in `[top, bot)`.
        deque.push(MIN_CAPACITY).unwrap();

        let mut drained = Vec::new();
        while let Some(v) = deque.pop_back() {
            drained.push(v);
        }
        drained.reverse();
        assert_eq!(drained, (0..=MIN_CAPACITY).collect::<Vec<_>>());
    }
}
