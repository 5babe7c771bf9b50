//! The intrusive policy node (spec §3) and the deque-region tag it
//! carries.
//!
//! A node's `key`/`hash` are immutable after creation; `value` is
//! replaceable under a per-node lock (a `put` on an existing key mutates
//! it in place, per spec §4.8); `weight` and `tag` are small atomics so
//! the maintenance task can read/update them without a broader lock;
//! `prev`/`next` are raw, non-owning links mutated exclusively by the
//! maintenance task (spec §5, §9 design notes). The node's true owner is
//! whichever `Store` entry currently holds an `Arc` to it.
use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Which of the three access-ordered deques a node currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum CacheRegion {
    Window = 0,
    Probation = 1,
    Protected = 2,
}

impl CacheRegion {
    #[inline]
    fn from_u8(v: u8) -> Self {
        match v {
            0 => CacheRegion::Window,
            1 => CacheRegion::Probation,
            2 => CacheRegion::Protected,
            _ => unreachable!("tag byte must only ever be 0..=2"),
        }
    }
}

pub(crate) struct Links<K, V> {
    pub(crate) prev: Option<NonNull<PolicyNode<K, V>>>,
    pub(crate) next: Option<NonNull<PolicyNode<K, V>>>,
}

pub(crate) struct PolicyNode<K, V> {
    pub(crate) key: Arc<K>,
    pub(crate) hash: u64,
    value: Mutex<Arc<V>>,
    weight: AtomicU32,
    tag: AtomicU8,
    links: UnsafeCell<Links<K, V>>,
}

// SAFETY: `links` is only ever read or mutated from the single maintenance
// thread (see the crate-level concurrency notes); all other fields are
// themselves `Sync` (atomics, a `Mutex`, and `Arc<K>`/`Arc<V>` which
// require `K: Send + Sync` / `V: Send + Sync` to be `Sync` themselves).
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for PolicyNode<K, V> {}

// SAFETY: `NonNull` is not `Send` by default, but the pointers inside
// `links` only ever point at other `PolicyNode`s kept alive by `Arc`s that
// are themselves `Send`/`Sync` under the same bounds; moving a
// `PolicyNode` across threads moves no thread-confined state.
unsafe impl<K: Send + Sync, V: Send + Sync> Send for PolicyNode<K, V> {}

impl<K, V> PolicyNode<K, V> {
    pub(crate) fn new(key: Arc<K>, hash: u64, value: Arc<V>, weight: u32, tag: CacheRegion) -> Arc<Self> {
        Arc::new(Self {
            key,
            hash,
            value: Mutex::new(value),
            weight: AtomicU32::new(weight),
            tag: AtomicU8::new(tag as u8),
            links: UnsafeCell::new(Links { prev: None, next: None }),
        })
    }

    pub(crate) fn value(&self) -> Arc<V> {
        self.value.lock().clone()
    }

    pub(crate) fn set_value(&self, value: Arc<V>) {
        *self.value.lock() = value;
    }

    pub(crate) fn weight(&self) -> u32 {
        self.weight.load(Ordering::Relaxed)
    }

    pub(crate) fn set_weight(&self, weight: u32) {
        self.weight.store(weight, Ordering::Relaxed);
    }

    pub(crate) fn tag(&self) -> CacheRegion {
        CacheRegion::from_u8(self.tag.load(Ordering::Relaxed))
    }

    pub(crate) fn set_tag(&self, tag: CacheRegion) {
        self.tag.store(tag as u8, Ordering::Relaxed);
    }

    /// `true` when the key has been cleared by another path (spec §4.5's
    /// "empty key" tombstone branches). This crate never actually clears
    /// a live node's key — empty keys are rejected at the public surface
    /// — so this is always `false` in practice, but the check stays in
    /// the eviction code path per the design notes.
    pub(crate) fn is_tombstone(&self) -> bool
    where
        K: AsRef<[u8]>,
    {
        self.key.as_ref().as_ref().is_empty()
    }

    /// SAFETY: caller must only touch this from the maintenance thread.
    #[inline]
    pub(crate) unsafe fn links(&self) -> &Links<K, V> {
        &*self.links.get()
    }

    /// SAFETY: caller must only touch this from the maintenance thread.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn links_mut(&self) -> &mut Links<K, V> {
        &mut *self.links.get()
    }
}

/// Reconstructs an owned `Arc` handle from a deque's non-owning pointer.
///
/// SAFETY: `ptr` must point at a node kept alive by an `Arc` owned
/// elsewhere (the `Store`, or the caller's own stack) for at least as
/// long as the returned `Arc` is live.
pub(crate) unsafe fn clone_from_raw<K, V>(ptr: NonNull<PolicyNode<K, V>>) -> Arc<PolicyNode<K, V>> {
    Arc::increment_strong_count(ptr.as_ptr());
    Arc::from_raw(ptr.as_ptr())
}
