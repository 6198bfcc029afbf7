//! Swaps the atomic/thread primitives used by the core for loom's
//! instrumented equivalents when model-checking under `--cfg loom`.
//!
//! Everything in [`deque`](super::deque), [`lazy`](super::lazy) and
//! [`pool`](super::pool) that touches shared atomics goes through this module
//! instead of `core::sync::atomic`/`std::sync` directly, so a single
//! `RUSTFLAGS="--cfg loom" cargo test --release` run can exhaustively check
//! the interleavings of push/pop/steal against the model checker.

#[cfg(not(loom))]
pub(crate) use core::sync::atomic::{fence, AtomicBool, AtomicPtr, AtomicU32, AtomicU64, Ordering};
#[cfg(not(loom))]
pub(crate) use std::sync::Arc;
#[cfg(not(loom))]
pub(crate) use std::thread;

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{fence, AtomicBool, AtomicPtr, AtomicU32, AtomicU64, Ordering};
#[cfg(loom)]
pub(crate) use loom::sync::Arc;
#[cfg(loom)]
pub(crate) use loom::thread;
