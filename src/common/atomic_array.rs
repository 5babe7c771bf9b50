//! A fixed-length array of slots that can be read, written, and
//! compare-and-swapped independently of one another.
//!
//! This is the storage the [`super::ring_buffer::RingBuffer`] is built on
//! top of (spec §4.2). Each slot holds an `Option<T>`; per the crate's
//! design notes, task values are owned directly (a tagged enum) rather
//! than passed as type-erased pointers, so a slot can't be a bare atomic
//! pointer. We pay for that with a per-slot `Mutex` instead of a lock-free
//! CAS on the slot itself; producers still only contend on the ring
//! buffer's `w` cursor, not on each other's slots.
use parking_lot::Mutex;

pub(crate) struct AtomicSlotArray<T> {
    slots: Box<[Mutex<Option<T>>]>,
}

impl<T> AtomicSlotArray<T> {
    pub(crate) fn new(len: usize) -> Self {
        let slots = (0..len).map(|_| Mutex::new(None)).collect::<Vec<_>>();
        Self {
            slots: slots.into_boxed_slice(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Acquire-like load: takes the slot's current value, leaving `None`
    /// behind. Returns `None` if the slot was already empty (a concurrent
    /// producer has reserved the index but not yet published into it).
    pub(crate) fn take(&self, index: usize) -> Option<T> {
        self.slots[index].lock().take()
    }

    /// Release-like store: publishes `value` into `index`.
    pub(crate) fn set(&self, index: usize, value: T) {
        *self.slots[index].lock() = Some(value);
    }

    /// Compare-and-set (spec §4.2), mirroring the original's
    /// `atomicArray.compareAndSet`, which compares the slot's raw pointer
    /// before swapping it. A slot here owns its value directly rather than
    /// holding a pointer to one, so the comparison is by value equality as
    /// a proxy for that pointer identity: if the slot currently holds a
    /// value equal to `expected`, it is replaced with `new` and this
    /// returns `true`; otherwise the slot is left untouched and this
    /// returns `false`.
    pub(crate) fn compare_and_set(&self, index: usize, expected: &Option<T>, new: Option<T>) -> bool
    where
        T: PartialEq,
    {
        let mut slot = self.slots[index].lock();
        if *slot == *expected {
            *slot = new;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_take_round_trips() {
        let arr: AtomicSlotArray<u32> = AtomicSlotArray::new(4);
        arr.set(2, 7);
        assert_eq!(arr.take(2), Some(7));
        assert_eq!(arr.take(2), None);
    }

    #[test]
    fn len_matches_construction() {
        let arr: AtomicSlotArray<u32> = AtomicSlotArray::new(16);
        assert_eq!(arr.len(), 16);
    }

    #[test]
    fn compare_and_set_swaps_only_on_match() {
        let arr: AtomicSlotArray<u32> = AtomicSlotArray::new(4);
        arr.set(0, 7);

        assert!(!arr.compare_and_set(0, &Some(8), Some(9)));
        assert_eq!(*arr.slots[0].lock(), Some(7));

        assert!(arr.compare_and_set(0, &Some(7), Some(9)));
        assert_eq!(*arr.slots[0].lock(), Some(9));
    }

    #[test]
    fn compare_and_set_against_empty_slot() {
        let arr: AtomicSlotArray<u32> = AtomicSlotArray::new(4);

        assert!(!arr.compare_and_set(1, &Some(1), Some(2)));
        assert!(arr.compare_and_set(1, &None, Some(2)));
        assert_eq!(arr.take(1), Some(2));
    }
}
