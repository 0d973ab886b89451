//! Block Device Abstraction
//!
//! Implemented by storage transports (USB bulk-only adapters, disk images,
//! test fixtures). Used by the partition scanner and filesystem drivers,
//! which address the medium purely in whole blocks.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;

use spin::Mutex;

pub mod ramdisk;

pub use ramdisk::RamDisk;

/// Result type alias for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors reported by block device implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// No authorized device is present, or the handle was closed
    Unavailable,
    /// Device is already open elsewhere
    Busy,
    /// Transport-level I/O failure
    Io,
    /// Request exceeds the device's blocks or is not whole-block sized
    OutOfRange,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Unavailable => write!(f, "device unavailable"),
            DeviceError::Busy => write!(f, "device busy"),
            DeviceError::Io => write!(f, "I/O error"),
            DeviceError::OutOfRange => write!(f, "request out of range"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DeviceError {}

/// Block device geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGeometry {
    /// Block size in bytes (usually 512)
    pub block_size: u32,
    /// Total number of blocks
    pub total_blocks: u64,
}

impl BlockGeometry {
    /// Total device size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.total_blocks * self.block_size as u64
    }
}

/// A contiguous run of blocks on a device: a partition, or the whole
/// device when the medium carries no partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    /// First block of the range (LBA)
    pub start: u64,
    /// Number of blocks in the range
    pub count: u64,
}

impl BlockRange {
    /// Range covering an entire device
    pub fn whole_device(geometry: BlockGeometry) -> Self {
        BlockRange {
            start: 0,
            count: geometry.total_blocks,
        }
    }

    /// Whether the range stays inside a device of `total_blocks`
    pub fn fits(&self, total_blocks: u64) -> bool {
        match self.start.checked_add(self.count) {
            Some(end) => end <= total_blocks,
            None => false,
        }
    }
}

/// Block device interface for storage transports
///
/// The transport handle exists from hardware attach; `open()` is called
/// once access has been authorized. After `close()` the handle is dead:
/// it cannot be reopened, and reads fail with `Unavailable` so callers
/// holding a reference across a detach observe the device as gone.
pub trait BlockDevice: Send {
    /// Get device geometry
    fn geometry(&self) -> BlockGeometry;

    /// Whether the device is currently open
    fn is_open(&self) -> bool;

    /// Open the device for I/O
    ///
    /// Fails with `Unavailable` if the underlying device is gone (closed
    /// handles are not reusable) and `Busy` if it is already open.
    fn open(&mut self) -> DeviceResult<()>;

    /// Read whole blocks starting at block index `start`
    ///
    /// `buffer` length selects the block count and must be a non-zero
    /// multiple of the block size. On success the buffer is filled
    /// completely; there are no short reads.
    fn read_blocks(&mut self, start: u64, buffer: &mut [u8]) -> DeviceResult<()>;

    /// Close the device and release the transport handle
    ///
    /// Idempotent; safe to call on a device that was never opened.
    fn close(&mut self);
}

// Forward through boxes so a trait-object device can be opened and then
// shared.
impl<T: BlockDevice + ?Sized> BlockDevice for Box<T> {
    fn geometry(&self) -> BlockGeometry {
        (**self).geometry()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn open(&mut self) -> DeviceResult<()> {
        (**self).open()
    }

    fn read_blocks(&mut self, start: u64, buffer: &mut [u8]) -> DeviceResult<()> {
        (**self).read_blocks(start, buffer)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Convenience methods for BlockDevice
pub trait BlockDeviceExt: BlockDevice {
    /// Get block size in bytes
    fn block_size(&self) -> u32 {
        self.geometry().block_size
    }

    /// Get total block count
    fn total_blocks(&self) -> u64 {
        self.geometry().total_blocks
    }

    /// Validate a read request against open state and geometry
    ///
    /// Implementations call this before touching the transport so the
    /// whole-block contract is enforced uniformly.
    fn check_read(&self, start: u64, buffer: &[u8]) -> DeviceResult<()> {
        if !self.is_open() {
            return Err(DeviceError::Unavailable);
        }
        let geometry = self.geometry();
        let block_size = geometry.block_size as usize;
        if buffer.is_empty() || buffer.len() % block_size != 0 {
            return Err(DeviceError::OutOfRange);
        }
        let count = (buffer.len() / block_size) as u64;
        match start.checked_add(count) {
            Some(end) if end <= geometry.total_blocks => Ok(()),
            _ => Err(DeviceError::OutOfRange),
        }
    }
}

// Auto-implement BlockDeviceExt for all BlockDevice implementors
impl<T: BlockDevice + ?Sized> BlockDeviceExt for T {}

/// A device shared between the session and a mounted filesystem
///
/// The mutex serializes transport I/O; the `Arc` lets in-flight readers
/// keep the device alive across a detach, at which point they observe it
/// closed and fail instead of dangling.
pub type SharedDevice = Arc<Mutex<dyn BlockDevice>>;

/// Wrap a device for shared use
pub fn share<D: BlockDevice + 'static>(device: D) -> SharedDevice {
    Arc::new(Mutex::new(device))
}
