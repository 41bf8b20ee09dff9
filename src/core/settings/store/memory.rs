//! RAM-backed store
//!
//! Behaves like the Flash store without the Flash: writes are visible
//! immediately and `commit` only counts. Put/erase/commit counters let tests
//! check how many store writes an operation caused.

use super::{Entry, KeyValueStore, Tag, MAX_TAG_LEN};
use crate::core::settings::error::StoreError;
use crate::core::settings::schema::Namespace;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

#[derive(Debug, Clone, Default)]
struct Space {
    name: Option<String>,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    spaces: [Space; 2],
    puts: usize,
    erases: usize,
    commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry without counting it as a write
    pub fn insert_raw(&mut self, namespace: Namespace, tag: &[u8], value: &[u8]) {
        self.spaces[namespace.id()]
            .entries
            .insert(tag.to_vec(), value.to_vec());
    }

    /// Stored value, bypassing `open`
    pub fn value(&self, namespace: Namespace, tag: &[u8]) -> Option<&[u8]> {
        self.spaces[namespace.id()]
            .entries
            .get(tag)
            .map(Vec::as_slice)
    }

    pub fn contains(&self, namespace: Namespace, tag: &[u8]) -> bool {
        self.value(namespace, tag).is_some()
    }

    /// Number of entries in a namespace
    pub fn len(&self, namespace: Namespace) -> usize {
        self.spaces[namespace.id()].entries.len()
    }

    /// Name the namespace was opened under
    pub fn namespace_name(&self, namespace: Namespace) -> Option<&str> {
        self.spaces[namespace.id()].name.as_deref()
    }

    pub fn put_count(&self) -> usize {
        self.puts
    }

    pub fn erase_count(&self) -> usize {
        self.erases
    }

    pub fn commit_count(&self) -> usize {
        self.commits
    }

    /// Total puts and erases
    pub fn write_count(&self) -> usize {
        self.puts + self.erases
    }

    pub fn reset_counters(&mut self) {
        self.puts = 0;
        self.erases = 0;
        self.commits = 0;
    }

    fn space(&mut self, namespace: Namespace) -> Result<&mut Space, StoreError> {
        let space = &mut self.spaces[namespace.id()];
        if space.name.is_none() {
            return Err(StoreError::NotOpen);
        }
        Ok(space)
    }
}

impl KeyValueStore for MemoryStore {
    fn open(&mut self, namespace: Namespace, name: &str) -> Result<(), StoreError> {
        self.spaces[namespace.id()].name = Some(name.to_string());
        Ok(())
    }

    fn get(&mut self, namespace: Namespace, tag: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.space(namespace)?.entries.get(tag).cloned())
    }

    fn put(&mut self, namespace: Namespace, tag: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if tag.len() > MAX_TAG_LEN {
            return Err(StoreError::KeyTooLong);
        }
        self.space(namespace)?
            .entries
            .insert(tag.to_vec(), value.to_vec());
        self.puts += 1;
        Ok(())
    }

    fn erase(&mut self, namespace: Namespace, tag: &[u8]) -> Result<(), StoreError> {
        if self.space(namespace)?.entries.remove(tag).is_some() {
            self.erases += 1;
        }
        Ok(())
    }

    fn iterate(&mut self, namespace: Namespace) -> Result<Vec<Entry>, StoreError> {
        self.space(namespace)?
            .entries
            .iter()
            .map(|(tag, value)| {
                Tag::from_slice(tag)
                    .map(|tag| (tag, value.clone()))
                    .map_err(|_| StoreError::KeyTooLong)
            })
            .collect()
    }

    fn commit(&mut self, namespace: Namespace) -> Result<(), StoreError> {
        self.space(namespace)?;
        self.commits += 1;
        Ok(())
    }
}
