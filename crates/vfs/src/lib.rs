//! Filesystem access layer for removable block devices
//!
//! Sits between the device session and the format drivers: scans the
//! partition table, picks the driver that recognizes the volume, and
//! exposes the mounted filesystem behind read-only traits.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │            Device session            │
//! └──────────────────┬───────────────────┘
//!                    │ scan / mount_first
//! ┌──────────────────▼───────────────────┐
//! │              VFS layer               │
//! │  - MBR partition scan                │
//! │  - Format driver registry            │
//! │  - Filesystem / FileReader traits    │
//! └──────────────────┬───────────────────┘
//!                    │ Filesystem trait
//! ┌─────────┬────────┴────────┬──────────┐
//! │   FAT   │      ext2       │   ...    │
//! └─────────┴─────────────────┴──────────┘
//! ```
//!
//! Everything here is read-only. Drivers never write to the device, and
//! the traits expose no mutation surface at all.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

pub mod entry;
pub mod error;
pub mod partition;
pub mod path;
pub mod registry;
pub mod timestamp;

pub use entry::{DirHandle, FileEntry, FileHandle, FileType, Node, VolumeInfo};
pub use error::{FsError, FsResult};
pub use partition::{PartitionEntry, PartitionType};
pub use registry::{DriverRegistry, FilesystemDriver};
pub use timestamp::Timestamp;

pub use umsfs_block::{BlockRange, SharedDevice};

/// Buffer granularity for `FileReader::read_to_end`
const READ_CHUNK: usize = 4096;

/// A mounted, readable volume
///
/// Handles returned by one volume are only meaningful on that volume.
/// Metadata operations are serialized through the owner; open readers
/// run independently and survive until they hit the unmounted flag.
pub trait Filesystem: Send {
    /// Format name, e.g. "FAT16"
    fn format(&self) -> &'static str;

    /// Volume-level facts: label, cluster size, capacity
    fn info(&self) -> VolumeInfo;

    /// Handle for the root directory
    fn root(&self) -> DirHandle;

    /// Walk `components` down from `base`, case-sensitively
    ///
    /// Fails with `NotFound` when a component is missing and with
    /// `NotADirectory` when an intermediate component names a file.
    fn resolve(&mut self, base: &DirHandle, components: &[&str]) -> FsResult<Node>;

    /// List a directory in on-disk order
    ///
    /// Deleted entries and the `.`/`..` entries are omitted.
    fn list_children(&mut self, dir: &DirHandle) -> FsResult<Vec<FileEntry>>;

    /// Open a file for sequential reading
    ///
    /// Readers are lazy: blocks are fetched as `read` consumes them.
    fn open_for_read(&mut self, file: &FileHandle) -> FsResult<Box<dyn FileReader>>;

    /// Release the volume
    ///
    /// In-flight readers fail with `NotMounted` on their next fetch.
    fn unmount(&mut self);
}

/// Sequential file reader handed out by `Filesystem::open_for_read`
pub trait FileReader: Send {
    /// Read up to `buf.len()` bytes, returning 0 at end of file
    fn read(&mut self, buf: &mut [u8]) -> FsResult<usize>;

    /// Read the remainder of the file into `out`
    ///
    /// On error `out` keeps whatever was read before the failure.
    fn read_to_end(&mut self, out: &mut Vec<u8>) -> FsResult<usize> {
        let mut chunk = vec![0u8; READ_CHUNK];
        let mut total = 0;
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&chunk[..n]);
            total += n;
        }
    }
}
