#![cfg_attr(feature = "no-std", no_std)]

//! Lock-free work-stealing deques and a worker pool built on top of them.
//!
//! [`workstealing::deque::Deque`] is a Chase-Lev single-producer/multi-consumer
//! deque: the owner pushes and pops from the bottom, any number of thieves pop
//! from the top. [`workstealing::lazy::LazyDeque`] is a variant that caches
//! each side's view of the other end, trading tighter bounds for fewer atomic
//! operations on the common path. [`workstealing::pool::Pool`] multiplexes one
//! deque per worker with dynamic membership and a witnessed two-round steal
//! scan.

extern crate alloc;

pub mod workstealing;
