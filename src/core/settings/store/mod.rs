//! Key-value store adapter
//!
//! Settings persist as one entry per slot in a namespaced key-value store.
//! Tags are the setting name, plus one index byte `0x80 | slot` for array
//! slots:
//!
//! ```text
//! "count"          scalar
//! "chan" 0x80      chan[0]
//! "chan" 0x82      chan[2]
//! "chan1"          chan[0], legacy one-based decimal suffix (read only)
//! ```

mod flash;
#[cfg(any(test, feature = "mock"))]
mod memory;

pub use flash::FlashStore;
#[cfg(any(test, feature = "mock"))]
pub use memory::MemoryStore;

use super::error::StoreError;
use super::schema::{Namespace, Setting};
use alloc::vec::Vec;

/// Maximum store tag length
pub const MAX_TAG_LEN: usize = 16;

/// Marks the index byte of an array slot tag
pub const INDEX_FLAG: u8 = 0x80;

/// Store tag
pub type Tag = heapless::Vec<u8, MAX_TAG_LEN>;

/// One persisted entry
pub type Entry = (Tag, Vec<u8>);

/// Tag of a scalar setting
pub fn scalar_tag(name: &str) -> Result<Tag, StoreError> {
    Tag::from_slice(name.as_bytes()).map_err(|_| StoreError::KeyTooLong)
}

/// Tag of array slot `slot`
pub fn slot_tag(name: &str, slot: usize) -> Result<Tag, StoreError> {
    let mut tag = scalar_tag(name)?;
    tag.push(INDEX_FLAG | (slot as u8 & !INDEX_FLAG))
        .map_err(|_| StoreError::KeyTooLong)?;
    Ok(tag)
}

/// Tag a setting slot persists under
pub fn setting_tag(setting: &Setting, slot: usize) -> Result<Tag, StoreError> {
    if setting.is_array() {
        slot_tag(setting.name, slot)
    } else {
        scalar_tag(setting.name)
    }
}

/// Legacy tag of array slot `slot` (one-based decimal suffix)
pub fn legacy_tag(name: &str, slot: usize) -> Result<Tag, StoreError> {
    let mut tag = scalar_tag(name)?;
    let mut digits = heapless::String::<4>::new();
    core::fmt::write(&mut digits, format_args!("{}", slot + 1)).map_err(|_| StoreError::KeyTooLong)?;
    tag.extend_from_slice(digits.as_bytes())
        .map_err(|_| StoreError::KeyTooLong)?;
    Ok(tag)
}

/// Namespaced key-value store
///
/// Writes are staged until [`commit`](KeyValueStore::commit). Erasing a tag
/// that is not present succeeds.
pub trait KeyValueStore {
    /// Open (or create) a namespace under `name`
    fn open(&mut self, namespace: Namespace, name: &str) -> Result<(), StoreError>;

    /// Value of `tag`, `None` if absent
    fn get(&mut self, namespace: Namespace, tag: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&mut self, namespace: Namespace, tag: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn erase(&mut self, namespace: Namespace, tag: &[u8]) -> Result<(), StoreError>;

    /// Snapshot of every entry in the namespace
    fn iterate(&mut self, namespace: Namespace) -> Result<Vec<Entry>, StoreError>;

    /// Make staged writes durable
    fn commit(&mut self, namespace: Namespace) -> Result<(), StoreError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &mut S {
    fn open(&mut self, namespace: Namespace, name: &str) -> Result<(), StoreError> {
        (**self).open(namespace, name)
    }

    fn get(&mut self, namespace: Namespace, tag: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(namespace, tag)
    }

    fn put(&mut self, namespace: Namespace, tag: &[u8], value: &[u8]) -> Result<(), StoreError> {
        (**self).put(namespace, tag, value)
    }

    fn erase(&mut self, namespace: Namespace, tag: &[u8]) -> Result<(), StoreError> {
        (**self).erase(namespace, tag)
    }

    fn iterate(&mut self, namespace: Namespace) -> Result<Vec<Entry>, StoreError> {
        (**self).iterate(namespace)
    }

    fn commit(&mut self, namespace: Namespace) -> Result<(), StoreError> {
        (**self).commit(namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(scalar_tag("count").unwrap().as_slice(), b"count");
        assert_eq!(slot_tag("chan", 2).unwrap().as_slice(), b"chan\x82");
        assert_eq!(legacy_tag("chan", 0).unwrap().as_slice(), b"chan1");
        assert_eq!(legacy_tag("chan", 11).unwrap().as_slice(), b"chan12");
    }

    #[test]
    fn test_tag_length_limit() {
        assert!(slot_tag("fifteen_chars_x", 0).is_ok());
        assert_eq!(
            scalar_tag("seventeen_chars_x").unwrap_err(),
            StoreError::KeyTooLong
        );
    }

    #[test]
    fn test_setting_tag_follows_shape() {
        let scalar = Setting::unsigned("count", 2, "");
        let array = Setting::unsigned("chan", 1, "").array(3);
        assert_eq!(setting_tag(&scalar, 0).unwrap().as_slice(), b"count");
        assert_eq!(setting_tag(&array, 1).unwrap().as_slice(), b"chan\x81");
    }
}
