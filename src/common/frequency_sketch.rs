//! A 4-hash count-min sketch with 4-bit saturating counters, used to
//! estimate how often a key has been seen recently.
//!
//! The table, seeds, and reset algorithm below mirror the W-TinyLFU
//! frequency sketch used by Caffeine/moka. Every entry in this module is
//! owned and mutated exclusively by the maintenance task (see the crate's
//! concurrency notes); there is no internal synchronization here.

/// Four 64-bit mixing constants, taken verbatim from the original
/// W-TinyLFU implementation this crate is modeled on. They are magic
/// constants and are intentionally not derived from anything else.
const SEED: [u64; 4] = [
    0xc3a5_c85c_97cb_3127,
    0xb492_b66f_be98_f273,
    0x9ae1_6a3b_2f90_404f,
    0xcbf2_9ce4_8422_2325,
];

/// Mask selecting the low bit of every nibble in a 64-bit word.
const ONE_MASK: u64 = 0x1111_1111_1111_1111;
/// Mask selecting the top three bits of every nibble in a 64-bit word
/// (applied after a 1-bit right shift during `reset`).
const RESET_MASK: u64 = 0x7777_7777_7777_7777;

const MAX_TABLE_LEN: usize = 1 << 30;

/// Count-min sketch over 4-bit saturating counters, 4 counters per key.
#[derive(Debug)]
pub(crate) struct FrequencySketch {
    table: Vec<u64>,
    table_mask: u64,
    size: usize,
    sample_size: usize,
}

impl Default for FrequencySketch {
    fn default() -> Self {
        Self {
            table: Vec::new(),
            table_mask: 0,
            size: 0,
            sample_size: 0,
        }
    }
}

impl FrequencySketch {
    /// Returns the smallest power of two `>= capacity`, clamped to
    /// `[1, 2^30]`. `capacity <= 0` (as an unsigned count, just `0`)
    /// returns `1`.
    fn ceiling_power_of_two(capacity: usize) -> usize {
        if capacity == 0 {
            return 1;
        }
        capacity
            .next_power_of_two()
            .min(MAX_TABLE_LEN)
            .max(1)
    }

    /// Grows the table to cover at least `capacity` keys. No-op if the
    /// table already covers it; there is no shrink path.
    pub(crate) fn ensure_capacity(&mut self, capacity: usize) {
        let new_len = Self::ceiling_power_of_two(capacity);
        if !self.table.is_empty() && self.table.len() >= new_len {
            return;
        }
        self.table = vec![0u64; new_len];
        self.table_mask = new_len as u64 - 1;
        self.size = 0;
        self.sample_size = 10 * new_len;
    }

    /// Word index and starting nibble ordinate for a given hash/depth.
    #[inline]
    fn index_of(&self, hash: u64, depth: usize) -> u64 {
        let mut h = hash.wrapping_add(SEED[depth]).wrapping_mul(SEED[depth]);
        h = h.wrapping_add(h >> 32);
        h & self.table_mask
    }

    /// Current estimated frequency of `hash`, in `[0, 15]`.
    pub(crate) fn frequency(&self, hash: u64) -> u8 {
        if self.table.is_empty() {
            return 0;
        }

        let start = ((hash & 3) << 2) as u64;
        let mut min = 15u8;

        for depth in 0..4 {
            let idx = self.index_of(hash, depth) as usize;
            let ord = start + depth as u64;
            let count = ((self.table[idx] >> (ord << 2)) & 0xF) as u8;
            min = min.min(count);
        }

        min
    }

    /// Records an observation of `hash`, aging the whole table when the
    /// sample window fills up.
    pub(crate) fn increment(&mut self, hash: u64) {
        if self.table.is_empty() {
            return;
        }

        let start = ((hash & 3) << 2) as u64;
        let mut any_incremented = false;

        for depth in 0..4 {
            let idx = self.index_of(hash, depth) as usize;
            let ord = start + depth as u64;
            if Self::try_increment_word(&mut self.table[idx], ord) {
                any_incremented = true;
            }
        }

        self.size += 1;
        if any_incremented && self.size == self.sample_size {
            self.reset();
        }
    }

    /// Bumps the nibble at ordinate `ord` in `word` by one, saturating at
    /// 15. Returns whether the counter actually moved.
    #[inline]
    fn try_increment_word(word: &mut u64, ord: u64) -> bool {
        let shift = ord << 2;
        let nibble = (*word >> shift) & 0xF;
        if nibble < 15 {
            *word += 1 << shift;
            true
        } else {
            false
        }
    }

    /// Halves every counter in the table and rescales `size` to match.
    fn reset(&mut self) {
        let mut count = 0u32;

        for word in self.table.iter_mut() {
            count += bit_count(*word & ONE_MASK);
            *word = (*word >> 1) & RESET_MASK;
        }

        self.size = (self.size >> 1).saturating_sub((count >> 2) as usize);
    }

    #[cfg(test)]
    pub(crate) fn table_len(&self) -> usize {
        self.table.len()
    }

    #[cfg(test)]
    pub(crate) fn size(&self) -> usize {
        self.size
    }
}

/// Population count, broken out as a free function so it's independently
/// testable against spec.md's worked examples.
#[inline]
pub(crate) fn bit_count(word: u64) -> u32 {
    word.count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_power_of_two() {
        assert_eq!(FrequencySketch::ceiling_power_of_two(0), 1);
        assert_eq!(FrequencySketch::ceiling_power_of_two(1), 1);
        assert_eq!(FrequencySketch::ceiling_power_of_two(3), 4);
        assert_eq!(FrequencySketch::ceiling_power_of_two(64), 64);
        assert_eq!(FrequencySketch::ceiling_power_of_two(65), 128);
    }

    #[test]
    fn bit_count_examples() {
        assert_eq!(bit_count(0x1111_1111_1111_1111), 16);
        assert_eq!(bit_count(0xFFFF_00FF), 24);
        assert_eq!(bit_count(0xAB), 5);
    }

    #[test]
    fn frequency_is_bounded() {
        let mut sketch = FrequencySketch::default();
        sketch.ensure_capacity(512);

        let hash = {
            use std::hash::{Hash, Hasher};
            let mut h = std::collections::hash_map::DefaultHasher::new();
            "lou".hash(&mut h);
            h.finish()
        };

        for _ in 0..10 {
            sketch.increment(hash);
        }

        let freq = sketch.frequency(hash);
        assert!((1..=15).contains(&freq), "frequency was {freq}");
    }

    #[test]
    fn frequency_saturates_at_fifteen() {
        let mut sketch = FrequencySketch::default();
        sketch.ensure_capacity(16);

        for _ in 0..10_000 {
            sketch.increment(42);
            assert!(sketch.frequency(42) <= 15);
        }
    }

    #[test]
    fn reset_halves_every_counter() {
        let mut sketch = FrequencySketch::default();
        sketch.ensure_capacity(16);

        for key in 0..100u64 {
            for _ in 0..8 {
                sketch.increment(key);
            }
        }

        // Force a reset regardless of where the sample window landed.
        sketch.reset();

        for key in 0..100u64 {
            assert!(sketch.frequency(key) <= 7);
        }
    }

    #[test]
    fn ensure_capacity_is_idempotent_growth_only() {
        let mut sketch = FrequencySketch::default();
        sketch.ensure_capacity(64);
        let len = sketch.table_len();
        sketch.ensure_capacity(1);
        assert_eq!(sketch.table_len(), len);
        sketch.ensure_capacity(1024);
        assert!(sketch.table_len() >= 1024);
    }
}
