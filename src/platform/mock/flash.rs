//! Mock Flash implementation for testing
//!
//! Provides in-memory NOR Flash simulation for settings store tests.

use crate::platform::{error::FlashError, traits::FlashInterface, Result};
use alloc::vec;
use alloc::vec::Vec;

/// Flash block size (4 KB)
const BLOCK_SIZE: u32 = 4096;

/// Default simulated capacity (512 KB: firmware region + settings region)
const DEFAULT_CAPACITY: u32 = 512 * 1024;

/// Protected firmware region (first 256 KB)
const FIRMWARE_SIZE: u32 = 0x40000;

/// Mock Flash implementation
///
/// Simulates Flash storage in memory. Supports:
/// - Read/write/erase with NOR semantics (erase to 0xFF, writes only clear bits)
/// - Corruption injection for testing CRC recovery
/// - Erase and write counters for wear checks
/// - Power-loss simulation (next write lands only half its bytes)
///
/// # Example
///
/// ```
/// use pico_settings::platform::mock::MockFlash;
/// use pico_settings::platform::FlashInterface;
///
/// let mut flash = MockFlash::new();
/// flash.erase(0x040000, 4096).unwrap();
/// flash.write(0x040000, b"SETS").unwrap();
///
/// let mut buf = [0u8; 4];
/// flash.read(0x040000, &mut buf).unwrap();
/// assert_eq!(&buf, b"SETS");
/// assert_eq!(flash.erase_count(0x040000), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockFlash {
    storage: Vec<u8>,
    erase_counts: Vec<u32>,
    writes: u32,
    power_loss: bool,
}

impl MockFlash {
    /// Create a new mock Flash with the default capacity, fully erased
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a mock Flash of `capacity` bytes (rounded down to whole blocks)
    pub fn with_capacity(capacity: u32) -> Self {
        let blocks = (capacity / BLOCK_SIZE).max(1);
        Self {
            storage: vec![0xFF; (blocks * BLOCK_SIZE) as usize],
            erase_counts: vec![0; blocks as usize],
            writes: 0,
            power_loss: false,
        }
    }

    /// Copy of the raw Flash contents (for test verification)
    pub fn contents(&self, address: u32, len: usize) -> Vec<u8> {
        self.storage[address as usize..address as usize + len].to_vec()
    }

    /// Overwrite a region with a corrupt pattern, bypassing NOR semantics
    pub fn inject_corruption(&mut self, address: u32, len: usize) {
        for byte in &mut self.storage[address as usize..address as usize + len] {
            *byte ^= 0xAA;
        }
    }

    /// Number of times the block containing `address` has been erased
    pub fn erase_count(&self, address: u32) -> u32 {
        self.erase_counts[(address / BLOCK_SIZE) as usize]
    }

    /// Total erase count across all blocks
    pub fn total_erase_count(&self) -> u32 {
        self.erase_counts.iter().sum()
    }

    /// Number of write calls performed
    pub fn write_count(&self) -> u32 {
        self.writes
    }

    /// Make the next write only partially complete
    pub fn simulate_power_loss(&mut self) {
        self.power_loss = true;
    }

    fn is_writable(&self, address: u32) -> bool {
        (FIRMWARE_SIZE..self.capacity()).contains(&address)
    }
}

impl Default for MockFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashInterface for MockFlash {
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        let end = address as usize + buf.len();
        if address >= self.capacity() || end > self.storage.len() {
            return Err(FlashError::InvalidAddress.into());
        }

        buf.copy_from_slice(&self.storage[address as usize..end]);
        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        if !self.is_writable(address) || address as usize + data.len() > self.storage.len() {
            return Err(FlashError::InvalidAddress.into());
        }

        let write_len = if self.power_loss {
            self.power_loss = false;
            data.len() / 2
        } else {
            data.len()
        };

        // NOR Flash can only clear bits
        let start = address as usize;
        for (cell, byte) in self.storage[start..start + write_len]
            .iter_mut()
            .zip(data.iter())
        {
            *cell &= *byte;
        }
        self.writes += 1;

        Ok(())
    }

    fn erase(&mut self, address: u32, size: u32) -> Result<()> {
        if !self.is_writable(address)
            || address % BLOCK_SIZE != 0
            || size % BLOCK_SIZE != 0
            || address + size > self.capacity()
        {
            return Err(FlashError::InvalidAddress.into());
        }

        self.storage[address as usize..(address + size) as usize].fill(0xFF);

        let first = (address / BLOCK_SIZE) as usize;
        for count in &mut self.erase_counts[first..first + (size / BLOCK_SIZE) as usize] {
            *count += 1;
        }

        Ok(())
    }

    fn block_size(&self) -> u32 {
        BLOCK_SIZE
    }

    fn capacity(&self) -> u32 {
        self.storage.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_flash_read_write() {
        let mut flash = MockFlash::new();
        flash.erase(0x040000, 4096).unwrap();

        flash.write(0x040000, &[0x53, 0x45, 0x54, 0x53]).unwrap();

        let mut buf = [0u8; 4];
        flash.read(0x040000, &mut buf).unwrap();
        assert_eq!(&buf, b"SETS");
        assert_eq!(flash.write_count(), 1);
    }

    #[test]
    fn test_mock_flash_erase_resets_and_counts() {
        let mut flash = MockFlash::new();
        flash.erase(0x040000, 4096).unwrap();
        flash.write(0x040000, &[0x55; 64]).unwrap();
        flash.erase(0x040000, 4096).unwrap();

        assert!(flash.contents(0x040000, 64).iter().all(|&b| b == 0xFF));
        assert_eq!(flash.erase_count(0x040000), 2);
        assert_eq!(flash.total_erase_count(), 2);
    }

    #[test]
    fn test_mock_flash_protects_firmware_region() {
        let mut flash = MockFlash::new();
        assert!(flash.write(0x000000, &[0x00; 4]).is_err());
        assert!(flash.erase(0x000000, 4096).is_err());

        let mut buf = [0u8; 4];
        assert!(flash.read(flash.capacity(), &mut buf).is_err());
    }

    #[test]
    fn test_mock_flash_rejects_unaligned_erase() {
        let mut flash = MockFlash::new();
        assert!(flash.erase(0x040100, 4096).is_err());
        assert!(flash.erase(0x040000, 1024).is_err());
    }

    #[test]
    fn test_mock_flash_power_loss_writes_half() {
        let mut flash = MockFlash::new();
        flash.erase(0x040000, 4096).unwrap();

        flash.simulate_power_loss();
        flash.write(0x040000, &[0x55; 256]).unwrap();

        let contents = flash.contents(0x040000, 256);
        assert_eq!(&contents[..128], &[0x55; 128]);
        assert_eq!(&contents[128..], &[0xFF; 128]);
    }

    #[test]
    fn test_mock_flash_write_only_clears_bits() {
        let mut flash = MockFlash::new();
        flash.erase(0x040000, 4096).unwrap();

        flash.write(0x040000, &[0x0F]).unwrap();
        flash.write(0x040000, &[0xFF]).unwrap();

        let mut buf = [0u8; 1];
        flash.read(0x040000, &mut buf).unwrap();
        assert_eq!(buf[0], 0x0F);
    }
}
