//! Packed bit-vector
//!
//! Holds every Bit-kind slot of the schema, and doubles as the per-slot
//! "found" map during boot and the "visited" map while applying a group.

use alloc::vec;
use alloc::vec::Vec;

const WORD_BITS: usize = u32::BITS as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitSet {
    words: Vec<u32>,
    len: usize,
}

impl BitSet {
    /// All-clear set of `len` bits
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bit value, `None` past the end
    pub fn get(&self, index: usize) -> Option<bool> {
        (index < self.len).then(|| self.words[index / WORD_BITS] & Self::mask(index) != 0)
    }

    /// Bit value, `false` past the end
    pub fn test(&self, index: usize) -> bool {
        self.get(index).unwrap_or(false)
    }

    /// Set or clear one bit; out-of-range writes are ignored
    pub fn set(&mut self, index: usize, value: bool) {
        if index >= self.len {
            return;
        }
        let word = &mut self.words[index / WORD_BITS];
        if value {
            *word |= Self::mask(index);
        } else {
            *word &= !Self::mask(index);
        }
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn mask(index: usize) -> u32 {
        1 << (index % WORD_BITS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut bits = BitSet::new(40);
        bits.set(0, true);
        bits.set(33, true);

        assert_eq!(bits.get(0), Some(true));
        assert_eq!(bits.get(1), Some(false));
        assert_eq!(bits.get(33), Some(true));
        assert_eq!(bits.get(40), None);
        assert_eq!(bits.count_ones(), 2);

        bits.set(33, false);
        assert!(!bits.test(33));
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut bits = BitSet::new(3);
        bits.set(3, true);
        assert_eq!(bits.count_ones(), 0);
        assert!(!bits.test(100));
    }

    #[test]
    fn test_count_ones() {
        let mut bits = BitSet::new(70);
        (0..70).for_each(|i| bits.set(i, true));
        assert_eq!(bits.count_ones(), 70);
        assert!(BitSet::new(0).is_empty());
    }
}
