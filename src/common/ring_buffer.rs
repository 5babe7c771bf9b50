//! A bounded, lock-free-on-the-cursors ring buffer (spec §4.2).
//!
//! Capacity is fixed at 256 slots; the read/write cursors advance by 16
//! per operation rather than 1. Both constants come straight from
//! spec.md §3: 256 slots gives cache-line spacing headroom, and the
//! step-of-16 means a CAS collision on the write cursor is rare even
//! under many concurrent producers, because most producers land on
//! different words of the backing array's cache lines.
use super::atomic_array::AtomicSlotArray;
use std::sync::atomic::{AtomicU32, Ordering};

pub(crate) const CAPACITY: u32 = 256;
pub(crate) const STEP: u32 = 16;

/// Outcome of an `offer`. `Failed` and `Full` carry the element back since
/// a CAS loss or a full buffer both leave it unqueued — the caller decides
/// whether to retry.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum OfferOutcome<T> {
    Success,
    Failed(T),
    Full(T),
}

impl<T> OfferOutcome<T> {
    #[cfg(test)]
    pub(crate) fn is_success(&self) -> bool {
        matches!(self, OfferOutcome::Success)
    }
}

pub(crate) struct RingBuffer<T> {
    slots: AtomicSlotArray<T>,
    r: AtomicU32,
    w: AtomicU32,
}

impl<T> RingBuffer<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: AtomicSlotArray::new(CAPACITY as usize),
            r: AtomicU32::new(0),
            w: AtomicU32::new(0),
        }
    }

    #[inline]
    fn slot_index(cursor: u32) -> usize {
        (cursor & (CAPACITY - 1)) as usize
    }

    /// Attempts to enqueue `elem`. Many producers may call this
    /// concurrently. `Failed` means a concurrent CAS beat this caller to
    /// the write cursor and the caller should retry; `Full` means the
    /// buffer genuinely has no room right now.
    pub(crate) fn offer(&self, elem: T) -> OfferOutcome<T> {
        let r = self.r.load(Ordering::Acquire);
        let w = self.w.load(Ordering::Acquire);

        if w.wrapping_sub(r) >= CAPACITY {
            return OfferOutcome::Full(elem);
        }

        match self.w.compare_exchange(
            w,
            w.wrapping_add(STEP),
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => {
                self.slots.set(Self::slot_index(w), elem);
                OfferOutcome::Success
            }
            Err(_) => OfferOutcome::Failed(elem),
        }
    }

    /// Drains everything currently available, calling `consumer` once per
    /// element in FIFO order. Only one drainer may call this at a time
    /// (serialized by the drain coordinator, spec §4.4).
    pub(crate) fn drain_to(&self, mut consumer: impl FnMut(T)) {
        let mut r = self.r.load(Ordering::Acquire);
        let w = self.w.load(Ordering::Acquire);

        while r != w {
            let idx = Self::slot_index(r);
            match self.slots.take(idx) {
                Some(elem) => {
                    consumer(elem);
                    r = r.wrapping_add(STEP);
                }
                // A producer reserved this slot (bumped `w`) but hasn't
                // published into it yet. Stop; we'll pick it up next drain.
                None => break,
            }
        }

        self.r.store(r, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> u32 {
        self.w.load(Ordering::Acquire).wrapping_sub(self.r.load(Ordering::Acquire))
    }
}
