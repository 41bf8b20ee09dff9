//! In-memory values
//!
//! One [`Storage`] per setting. Numerics, fixed strings and octets keep
//! every slot in a single inline buffer; blobs and heap strings own one
//! allocation per slot; bits live in the shared [`BitSet`].

use super::bits::BitSet;
use super::schema::{Schema, Setting, SettingKind};
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    /// `slots * size` bytes; strings are NUL-terminated within each slot
    Inline {
        size: usize,
        terminated: bool,
        buf: Box<[u8]>,
    },
    /// One owned buffer per slot
    Heap(Vec<Vec<u8>>),
    /// Slots start at `first` in the shared bit-vector
    Bits { first: usize },
}

impl Storage {
    fn for_setting(schema: &Schema, index: usize, setting: &Setting) -> Self {
        match setting.kind {
            SettingKind::Bit => Storage::Bits {
                first: schema.bit_index(index),
            },
            _ if setting.is_heap() => Storage::Heap(vec![Vec::new(); setting.slots()]),
            kind => {
                let size = setting.size as usize;
                Storage::Inline {
                    size,
                    terminated: kind == SettingKind::Str,
                    buf: vec![0; size * setting.slots()].into_boxed_slice(),
                }
            }
        }
    }
}

/// Live values of every setting in a schema
#[derive(Debug, Clone)]
pub struct SettingsState {
    storage: Vec<Storage>,
    bits: BitSet,
}

impl SettingsState {
    /// Zeroed state shaped after `schema`
    pub fn new(schema: &Schema) -> Self {
        Self {
            storage: schema
                .settings()
                .iter()
                .enumerate()
                .map(|(index, setting)| Storage::for_setting(schema, index, setting))
                .collect(),
            bits: BitSet::new(schema.total_bits()),
        }
    }

    pub fn storage(&self, index: usize) -> Option<&Storage> {
        self.storage.get(index)
    }

    /// Binary value of one slot (strings without their terminator)
    pub fn raw(&self, index: usize, slot: usize) -> Vec<u8> {
        match &self.storage[index] {
            Storage::Inline {
                size,
                terminated,
                buf,
            } => {
                let cell = &buf[slot * size..(slot + 1) * size];
                if *terminated {
                    let end = cell.iter().position(|b| *b == 0).unwrap_or(cell.len());
                    cell[..end].to_vec()
                } else {
                    cell.to_vec()
                }
            }
            Storage::Heap(slots) => slots[slot].clone(),
            Storage::Bits { first } => vec![u8::from(self.bits.test(first + slot))],
        }
    }

    /// Overwrite one slot; inline values are truncated or zero-padded to the
    /// slot size
    pub fn set_raw(&mut self, index: usize, slot: usize, raw: &[u8]) {
        match &mut self.storage[index] {
            Storage::Inline { size, buf, .. } => {
                let cell = &mut buf[slot * *size..(slot + 1) * *size];
                let len = raw.len().min(cell.len());
                cell[..len].copy_from_slice(&raw[..len]);
                cell[len..].fill(0);
            }
            Storage::Heap(slots) => slots[slot] = raw.to_vec(),
            Storage::Bits { first } => {
                let bit = *first + slot;
                self.bits.set(bit, raw.first().is_some_and(|b| *b != 0));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TABLE: &[Setting] = &[
        Setting::unsigned("count", 2, "0"),
        Setting::string("name", 6, ""),
        Setting::bit("flag", "").array(2),
        Setting::blob("cert", ""),
        Setting::unsigned("chan", 1, "").array(3),
    ];

    #[test]
    fn test_inline_slots() {
        let schema = Schema::new(TABLE).unwrap();
        let mut state = SettingsState::new(&schema);

        state.set_raw(4, 1, &[9]);
        assert_eq!(state.raw(4, 0), [0]);
        assert_eq!(state.raw(4, 1), [9]);
        assert_eq!(state.raw(0, 0), [0, 0]);
    }

    #[test]
    fn test_strings_are_terminated() {
        let schema = Schema::new(TABLE).unwrap();
        let mut state = SettingsState::new(&schema);

        state.set_raw(1, 0, b"hello");
        assert_eq!(state.raw(1, 0), b"hello");
        state.set_raw(1, 0, b"hi");
        assert_eq!(state.raw(1, 0), b"hi");
    }

    #[test]
    fn test_bits_and_heap() {
        let schema = Schema::new(TABLE).unwrap();
        let mut state = SettingsState::new(&schema);

        state.set_raw(2, 1, &[1]);
        assert_eq!(state.raw(2, 0), [0]);
        assert_eq!(state.raw(2, 1), [1]);

        state.set_raw(3, 0, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(state.raw(3, 0).len(), 8);
        assert!(matches!(state.storage(3), Some(Storage::Heap(_))));
    }
}
