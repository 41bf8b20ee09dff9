//! Flash-backed store
//!
//! Each namespace owns two rotating 4 KB blocks. A commit writes the whole
//! namespace image into the block not currently active, so a torn write
//! leaves the previous image intact; open picks the valid block with the
//! newest sequence number.
//!
//! # Block Format
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ Magic: [u8; 4] = b"SETS"                      │  Offset: 0
//! ├───────────────────────────────────────────────┤
//! │ Version: u16 = 1                              │  Offset: 4
//! │ Sequence: u16                                 │  Offset: 6
//! │ Entry count: u16                              │  Offset: 8
//! │ Payload length: u16                           │  Offset: 10
//! ├───────────────────────────────────────────────┤
//! │ Entries: [(tag, value)]                       │  Offset: 12
//! │   tag_len: u8, tag: [u8; tag_len]             │
//! │   value_len: u16, value: [u8; value_len]      │
//! ├───────────────────────────────────────────────┤
//! │ CRC32: u32 (over header + payload)            │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! All multi-byte header fields are little-endian.

use super::{Entry, KeyValueStore, Tag, MAX_TAG_LEN};
use crate::core::settings::error::StoreError;
use crate::core::settings::schema::Namespace;
use crate::platform::traits::FlashInterface;
use crate::{log_debug, log_info, log_warn};
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use crc::{Crc, CRC_32_ISO_HDLC};

/// First namespace block (Flash offset)
const STORE_BASE: u32 = 0x040000; // 256 KB

/// Block size (4 KB per block)
const BLOCK_SIZE: u32 = 4096;

/// Rotating blocks per namespace
const BLOCKS_PER_NAMESPACE: u32 = 2;

/// Magic number for namespace blocks ("SETS")
const MAGIC: [u8; 4] = *b"SETS";

/// Block format version
const VERSION: u16 = 1;

const HEADER_LEN: usize = 12;
const CRC_LEN: usize = 4;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// One decoded namespace block
struct Block {
    sequence: u16,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
struct Space {
    name: Option<String>,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    sequence: u16,
    /// Address of the block holding the last committed image
    active: Option<u32>,
    dirty: bool,
}

/// Flash-backed key-value store
pub struct FlashStore<F: FlashInterface> {
    flash: F,
    spaces: [Space; 2],
}

impl<F: FlashInterface> FlashStore<F> {
    pub fn new(flash: F) -> Self {
        Self {
            flash,
            spaces: Default::default(),
        }
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Give back the Flash, dropping uncommitted writes
    pub fn into_inner(self) -> F {
        self.flash
    }

    /// Whether a namespace has uncommitted writes
    pub fn is_dirty(&self, namespace: Namespace) -> bool {
        self.spaces[namespace.id()].dirty
    }

    fn block_address(namespace: Namespace, block: u32) -> u32 {
        STORE_BASE + (namespace.id() as u32 * BLOCKS_PER_NAMESPACE + block) * BLOCK_SIZE
    }

    /// Sequence `a` was written after `b` (wrapping)
    fn is_newer(a: u16, b: u16) -> bool {
        (a.wrapping_sub(b) as i16) > 0
    }

    fn entry_len(tag: &[u8], value: &[u8]) -> usize {
        1 + tag.len() + 2 + value.len()
    }

    fn image_len(entries: &BTreeMap<Vec<u8>, Vec<u8>>) -> usize {
        HEADER_LEN
            + entries
                .iter()
                .map(|(tag, value)| Self::entry_len(tag, value))
                .sum::<usize>()
            + CRC_LEN
    }

    fn take<'a>(buf: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8], StoreError> {
        let bytes = buf.get(*offset..*offset + len).ok_or(StoreError::Corrupt)?;
        *offset += len;
        Ok(bytes)
    }

    /// Read and validate one block
    fn load_block(&mut self, address: u32) -> Result<Block, StoreError> {
        let mut header = [0u8; HEADER_LEN];
        self.flash.read(address, &mut header)?;

        // Validate magic
        if header[0..4] != MAGIC {
            return Err(StoreError::Corrupt);
        }

        // Validate version
        if u16::from_le_bytes([header[4], header[5]]) != VERSION {
            return Err(StoreError::Corrupt);
        }

        let sequence = u16::from_le_bytes([header[6], header[7]]);
        let count = u16::from_le_bytes([header[8], header[9]]) as usize;
        let payload_len = u16::from_le_bytes([header[10], header[11]]) as usize;
        let body_len = HEADER_LEN + payload_len;
        if body_len + CRC_LEN > BLOCK_SIZE as usize {
            return Err(StoreError::Corrupt);
        }

        let mut buf = vec![0u8; body_len + CRC_LEN];
        self.flash.read(address, &mut buf)?;

        // Validate CRC
        let stored_crc = u32::from_le_bytes([
            buf[body_len],
            buf[body_len + 1],
            buf[body_len + 2],
            buf[body_len + 3],
        ]);
        if CRC32.checksum(&buf[..body_len]) != stored_crc {
            return Err(StoreError::Corrupt);
        }

        // Deserialize entries
        let body = &buf[..body_len];
        let mut offset = HEADER_LEN;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let tag_len = Self::take(body, &mut offset, 1)?[0] as usize;
            if tag_len > MAX_TAG_LEN {
                return Err(StoreError::Corrupt);
            }
            let tag = Self::take(body, &mut offset, tag_len)?.to_vec();
            let len = Self::take(body, &mut offset, 2)?;
            let value_len = u16::from_le_bytes([len[0], len[1]]) as usize;
            let value = Self::take(body, &mut offset, value_len)?.to_vec();
            entries.insert(tag, value);
        }
        if offset != body_len {
            return Err(StoreError::Corrupt);
        }

        Ok(Block { sequence, entries })
    }

    /// Serialize a namespace image
    fn encode(entries: &BTreeMap<Vec<u8>, Vec<u8>>, sequence: u16) -> Vec<u8> {
        let image_len = Self::image_len(entries);
        let payload_len = image_len - HEADER_LEN - CRC_LEN;

        let mut image = Vec::with_capacity(image_len);
        image.extend_from_slice(&MAGIC);
        image.extend_from_slice(&VERSION.to_le_bytes());
        image.extend_from_slice(&sequence.to_le_bytes());
        image.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        image.extend_from_slice(&(payload_len as u16).to_le_bytes());

        for (tag, value) in entries {
            image.push(tag.len() as u8);
            image.extend_from_slice(tag);
            image.extend_from_slice(&(value.len() as u16).to_le_bytes());
            image.extend_from_slice(value);
        }

        let crc = CRC32.checksum(&image);
        image.extend_from_slice(&crc.to_le_bytes());
        image
    }

    fn space(&mut self, namespace: Namespace) -> Result<&mut Space, StoreError> {
        let space = &mut self.spaces[namespace.id()];
        if space.name.is_none() {
            return Err(StoreError::NotOpen);
        }
        Ok(space)
    }
}

impl<F: FlashInterface> KeyValueStore for FlashStore<F> {
    fn open(&mut self, namespace: Namespace, name: &str) -> Result<(), StoreError> {
        let mut newest: Option<(u32, Block)> = None;

        for block in 0..BLOCKS_PER_NAMESPACE {
            let address = Self::block_address(namespace, block);
            match self.load_block(address) {
                Ok(loaded) => {
                    let newer = newest
                        .as_ref()
                        .map_or(true, |(_, current)| Self::is_newer(loaded.sequence, current.sequence));
                    if newer {
                        newest = Some((address, loaded));
                    }
                }
                Err(StoreError::Corrupt) => {
                    log_debug!("No valid image in block {} of {}", block, name);
                }
                Err(e) => return Err(e),
            }
        }

        let space = &mut self.spaces[namespace.id()];
        space.name = Some(name.to_string());
        space.dirty = false;

        match newest {
            Some((address, block)) => {
                log_info!(
                    "Loaded {} entries for {} (sequence {})",
                    block.entries.len(),
                    name,
                    block.sequence
                );
                space.entries = block.entries;
                space.sequence = block.sequence;
                space.active = Some(address);
            }
            None => {
                log_info!("No stored settings for {}", name);
                space.entries.clear();
                space.sequence = 0;
                space.active = None;
            }
        }

        Ok(())
    }

    fn get(&mut self, namespace: Namespace, tag: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.space(namespace)?.entries.get(tag).cloned())
    }

    fn put(&mut self, namespace: Namespace, tag: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if tag.len() > MAX_TAG_LEN {
            return Err(StoreError::KeyTooLong);
        }

        let space = self.space(namespace)?;
        if space.entries.get(tag).is_some_and(|current| current == value) {
            return Ok(());
        }

        let replaced = space
            .entries
            .get(tag)
            .map_or(0, |current| Self::entry_len(tag, current));
        let needed = Self::image_len(&space.entries) - replaced + Self::entry_len(tag, value);
        if needed > BLOCK_SIZE as usize {
            log_warn!("Store full, {} bytes needed", needed);
            return Err(StoreError::Full);
        }

        space.entries.insert(tag.to_vec(), value.to_vec());
        space.dirty = true;
        Ok(())
    }

    fn erase(&mut self, namespace: Namespace, tag: &[u8]) -> Result<(), StoreError> {
        let space = self.space(namespace)?;
        if space.entries.remove(tag).is_some() {
            space.dirty = true;
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
                    .map_err(|_| StoreError::Corrupt)
            })
            .collect()
    }

    fn commit(&mut self, namespace: Namespace) -> Result<(), StoreError> {
        let space = &mut self.spaces[namespace.id()];
        if space.name.is_none() {
            return Err(StoreError::NotOpen);
        }
        if !space.dirty {
            return Ok(());
        }

        let first = Self::block_address(namespace, 0);
        let target = match space.active {
            Some(address) if address == first => Self::block_address(namespace, 1),
            _ => first,
        };
        let sequence = space.sequence.wrapping_add(1);
        let image = Self::encode(&space.entries, sequence);

        self.flash.erase(target, BLOCK_SIZE)?;
        self.flash.write(target, &image)?;

        space.sequence = sequence;
        space.active = Some(target);
        space.dirty = false;

        log_debug!(
            "Committed {} entries to block {} (sequence {})",
            space.entries.len(),
            target,
            sequence
        );
        Ok(())
    }
}
