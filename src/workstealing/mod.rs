//! Lock-free work-stealing deques and the pool built on top of them.
//!
//! - [`deque::Deque`]: the Chase-Lev SPMC deque. Owner pushes/pops the
//!   bottom, thieves pop the top.
//! - [`lazy::LazyDeque`]: a variant that caches each side's view of the far
//!   end, refreshing only when the cache suggests empty/full.
//! - [`pool::Pool`]: one deque per worker, dynamic membership, and a
//!   witnessed scan for stealing across the whole table.

pub(crate) mod arena;
pub(crate) mod cache_padded;
pub(crate) mod variant;

pub mod backoff;
pub mod deque;
pub mod lazy;
pub mod pool;

pub use backoff::Backoff;
pub use deque::Deque;
pub use lazy::LazyDeque;
pub use pool::Pool;
