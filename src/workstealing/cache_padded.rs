//! Cache-line padding helper for hot atomics.
//!
//! `top` and `bot` are written by disjoint sets of threads (thieves vs. the
//! owner); keeping them on separate cache lines avoids false sharing between
//! stealers hammering `top` and the owner hammering `bot`.

use core::ops::{Deref, DerefMut};

/// Pads `T` out to a cache line so adjacent fields never share one.
#[repr(align(64))]
pub(crate) struct CachePadded<T>(T);

impl<T> CachePadded<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for CachePadded<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}
