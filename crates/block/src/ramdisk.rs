//! In-memory block device
//!
//! Backs disk images and test fixtures. Enforces the full open/close
//! contract so session and driver code can be exercised against it
//! exactly as against a hardware transport.

use alloc::vec;
use alloc::vec::Vec;

use crate::{BlockDevice, BlockDeviceExt, BlockGeometry, DeviceError, DeviceResult};

/// In-memory block device backed by a byte vector
pub struct RamDisk {
    data: Vec<u8>,
    block_size: u32,
    total_blocks: u64,
    open: bool,
    closed: bool,
}

impl RamDisk {
    /// Create a zero-filled disk
    ///
    /// `block_size` must be non-zero; 512 matches common USB media.
    pub fn new(block_size: u32, total_blocks: u64) -> Self {
        RamDisk {
            data: vec![0u8; (total_blocks * block_size as u64) as usize],
            block_size,
            total_blocks,
            open: false,
            closed: false,
        }
    }

    /// Wrap an existing image
    ///
    /// Ragged images are padded with zeroes up to the next block boundary.
    pub fn from_image(block_size: u32, mut image: Vec<u8>) -> Self {
        let bs = block_size as usize;
        let remainder = image.len() % bs;
        if remainder != 0 {
            image.resize(image.len() + (bs - remainder), 0);
        }
        let total_blocks = (image.len() / bs) as u64;
        RamDisk {
            data: image,
            block_size,
            total_blocks,
            open: false,
            closed: false,
        }
    }

    /// Raw view of the backing image
    pub fn image(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view of the backing image, for fixtures that patch bytes
    pub fn image_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl BlockDevice for RamDisk {
    fn geometry(&self) -> BlockGeometry {
        BlockGeometry {
            block_size: self.block_size,
            total_blocks: self.total_blocks,
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self) -> DeviceResult<()> {
        if self.closed {
            return Err(DeviceError::Unavailable);
        }
        if self.open {
            return Err(DeviceError::Busy);
        }
        self.open = true;
        Ok(())
    }

    fn read_blocks(&mut self, start: u64, buffer: &mut [u8]) -> DeviceResult<()> {
        self.check_read(start, buffer)?;
        let offset = (start * self.block_size as u64) as usize;
        buffer.copy_from_slice(&self.data[offset..offset + buffer.len()]);
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.closed = true;
    }
}
