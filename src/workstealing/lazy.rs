//! Lazy variant of the work-stealing deque (spec §4.4).
//!
//! Trades the plain Chase-Lev deque's LIFO `pop_back` for two lighter-weight
//! endpoints: an owner-only `push`/`pop_owned` pair that caches its view of
//! the far end of the deque in a plain (non-atomic) field, and a thief `pop`
//! that caches its view of `bot` in a shared atomic, refreshing either cache
//! only when it looks like the deque might be empty or full. Most calls never
//! touch the counter on the other side at all.

use alloc::boxed::Box;
use core::fmt;

use super::arena::{free_chain, Block, MIN_CAPACITY};
use super::backoff::Backoff;
use super::variant::{fence, AtomicPtr, AtomicU64, Ordering};
use crate::workstealing::cache_padded::CachePadded;
use crate::workstealing::deque::DequeStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full;

impl fmt::Display for Full {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("lazy deque is at its configured max capacity")
    }
}

#[derive(Debug)]
pub enum Steal<T> {
    Success(T),
    Empty,
    Retry,
}

impl<T> Steal<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Steal::Success(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum StrongSteal<T> {
    Success(T),
    Empty,
}

impl<T> StrongSteal<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            StrongSteal::Success(v) => Some(v),
            StrongSteal::Empty => None,
        }
    }
}

#[inline]
fn diff(a: u64, b: u64) -> i64 {
    a.wrapping_sub(b) as i64
}

/// Single-owner, multi-thief deque with cached end-of-deque estimates.
///
/// Unlike [`Deque`](super::deque::Deque), the owner's endpoint operations
/// (`push`, `pop_owned`) never race a thief directly on the common case: they
/// only reach for the authoritative `top` when `estimate_top` suggests the
/// deque might be full or empty, at the cost of weaker freshness guarantees
/// on that estimate.
pub struct LazyDeque<T> {
    top: CachePadded<AtomicU64>,
    estimate_bot: AtomicU64,
    bot: CachePadded<AtomicU64>,
    /// Owner-only; never touched from any other thread.
    estimate_top: core::cell::Cell<u64>,
    block: CachePadded<AtomicPtr<Block<T>>>,
    max_capacity: Option<u64>,
    push_count: AtomicU64,
    pop_count: AtomicU64,
    steal_count: AtomicU64,
    steal_attempt_count: AtomicU64,
    grow_count: AtomicU64,
}

unsafe impl<T: Send> Send for LazyDeque<T> {}
unsafe impl<T: Send> Sync for LazyDeque<T> {}

impl<T> LazyDeque<T> {
    pub fn new() -> Self {
        Self::with_max_capacity(None)
    }

    pub fn with_max_capacity(max_capacity: Option<u64>) -> Self {
        Self {
            top: CachePadded::new(AtomicU64::new(0)),
            estimate_bot: AtomicU64::new(0),
            bot: CachePadded::new(AtomicU64::new(0)),
            estimate_top: core::cell::Cell::new(0),
            block: CachePadded::new(AtomicPtr::new(core::ptr::null_mut())),
            max_capacity,
            push_count: AtomicU64::new(0),
            pop_count: AtomicU64::new(0),
            steal_count: AtomicU64::new(0),
            steal_attempt_count: AtomicU64::new(0),
            grow_count: AtomicU64::new(0),
        }
    }

    /// Owner-only. Pushes onto the bottom.
    ///
    /// Only reloads the authoritative `top` (refreshing `estimate_top`) when
    /// the cached estimate suggests the block might be full.
    pub fn push(&self, value: T) -> Result<(), Full> {
        let b = self.bot.load(Ordering::Relaxed);
        let mut block_ptr = self.block.load(Ordering::Relaxed);
        let mut t = self.estimate_top.get();

        let fits = |block_ptr: *mut Block<T>, t: u64| -> bool {
            let mask = if block_ptr.is_null() {
                -1
            } else {
                unsafe { (*block_ptr).capacity() as i64 - 1 }
            };
            diff(b, t) <= mask
        };

        if !fits(block_ptr, t) {
            t = self.top.load(Ordering::Acquire);
            self.estimate_top.set(t);

            if !fits(block_ptr, t) {
                let to_size = b.wrapping_sub(t).wrapping_add(1);
                let grown = self.grow_to(to_size, block_ptr);
                if grown == block_ptr {
                    return Err(Full);
                }
                block_ptr = grown;
            }
        }

        let block = unsafe { &*block_ptr };
        unsafe {
            block.write(b, value);
        }

        self.bot.store(b.wrapping_add(1), Ordering::Release);
        self.push_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Owner-only. Pops from the top without contending with thieves via CAS;
    /// only valid when the caller guarantees no concurrent thief is active
    /// (e.g. workers have already been told to stand down). Use [`LazyDeque::pop`]
    /// when that guarantee does not hold.
    pub fn pop_owned(&self) -> Option<T> {
        let t = self.top.load(Ordering::Relaxed);
        let mut b = self.estimate_bot.load(Ordering::Relaxed);

        if diff(b, t) <= 0 {
            b = self.bot.load(Ordering::Relaxed);
            self.estimate_bot.store(b, Ordering::Relaxed);
            if diff(b, t) <= 0 {
                return None;
            }
        }

        // SeqCst: must not observe a stale `top`/`bot` pair alongside an old
        // block — doing so would read from uninitialized memory in a block
        // that has already been superseded. A plain Acquire load is
        // sufficient on x86 but not in general; SeqCst is the portable
        // strengthening available in `core::sync::atomic`.
        fence(Ordering::SeqCst);
        let block_ptr = self.block.load(Ordering::SeqCst);
        let block = unsafe { &*block_ptr };
        let value = unsafe { block.read(t) };

        self.top.store(t.wrapping_add(1), Ordering::Relaxed);
        self.pop_count.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Thief-callable. Single attempt; may report [`Steal::Retry`] under
    /// contention with another thief for the same slot.
    pub fn pop(&self) -> Steal<T> {
        self.steal_attempt_count.fetch_add(1, Ordering::Relaxed);
        let t = self.top.load(Ordering::Relaxed);
        let mut b = self.estimate_bot.load(Ordering::Relaxed);

        if diff(t, b) >= 0 {
            b = self.bot.load(Ordering::Relaxed);
            self.estimate_bot.store(b, Ordering::Relaxed);
            if diff(t, b) >= 0 {
                return Steal::Empty;
            }
        }

        fence(Ordering::SeqCst);
        let block_ptr = self.block.load(Ordering::SeqCst);
        let block = unsafe { &*block_ptr };

        // Win the `top` CAS before taking ownership of the slot's value, so a
        // losing thief never duplicates (and would have to forget) a value it
        // doesn't own.
        match self
            .top
            .compare_exchange(t, t.wrapping_add(1), Ordering::SeqCst, Ordering::Relaxed)
        {
            Ok(_) => {
                self.steal_count.fetch_add(1, Ordering::Relaxed);
                Steal::Success(unsafe { block.read(t) })
            }
            Err(_) => Steal::Retry,
        }
    }

    /// Thief-callable. Retries internally until the result is not
    /// [`Steal::Retry`].
    pub fn pop_strong(&self) -> StrongSteal<T> {
        let mut backoff = Backoff::new();
        loop {
            match self.pop() {
                Steal::Success(v) => return StrongSteal::Success(v),
                Steal::Empty => return StrongSteal::Empty,
                Steal::Retry => backoff.spin(),
            }
        }
    }

    fn grow_to(&self, to_size: u64, current: *mut Block<T>) -> *mut Block<T> {
        if let Some(max_capacity) = self.max_capacity {
            if to_size > max_capacity {
                return current;
            }
        }

        let new_cap = MIN_CAPACITY.max(to_size).next_power_of_two();
        let new_block = Block::new(new_cap, current, false);

        if !current.is_null() {
            let t = self.top.load(Ordering::Relaxed);
            let b = self.bot.load(Ordering::Relaxed);
            unsafe {
                (*current).duplicate_into(&new_block, t, b);
            }
        }

        let new_ptr = Box::into_raw(new_block);
        self.block.store(new_ptr, Ordering::Release);
        self.grow_count.fetch_add(1, Ordering::Relaxed);
        new_ptr
    }

    /// Snapshot of this deque's diagnostic counters.
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

    pub fn capacity(&self) -> u64 {
        let p = self.block.load(Ordering::Relaxed);
        if p.is_null() {
            0
        } else {
            unsafe { (*p).capacity() }
        }
    }

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

impl<T> Default for LazyDeque<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LazyDeque<T> {
    fn drop(&mut self) {
        while self.pop_owned().is_some() {}
        let head = self.block.load(Ordering::Relaxed);
        unsafe {
            free_chain(head);
        }
    }
}


#[cfg(all(test, loom))]
mod loom_tests {
    use super::*;
    use crate::workstealing::variant::{thread, Arc};

    #[test]
    fn push_and_single_steal_are_linearizable() {
        loom::model(|| {
            let deque = Arc::new(LazyDeque::<u32>::new());
            deque.push(1).unwrap();
            deque.push(2).unwrap();

            let stealer = {
                let deque = deque.clone();
                thread::spawn(move || deque.pop_strong().into_option())
            };

            let owner_popped = deque.pop_owned();
            let stolen = stealer.join().unwrap();

            let mut seen: Vec<u32> = owner_popped.into_iter().chain(stolen).collect();
            seen.sort_unstable();
            assert!(seen == vec![1] || seen == vec![2] || seen == vec![1, 2]);
        });
    }
}
