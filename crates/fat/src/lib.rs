//! FAT12/16/32 driver for umsfs
//!
//! Read-only driver over a partition's block range:
//! - FAT12 (floppy-style media, small volumes)
//! - FAT16 (small to medium volumes)
//! - FAT32 (large volumes)
//!
//! `FatDriver` plugs into the `umsfs-vfs` driver registry; a successful
//! mount yields a [`FatVolume`] serving directory walks and lazy
//! cluster-chain file reads. Long names are assembled from their
//! fragment slots and matched case-sensitively.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

mod bpb;
mod dir;
mod reader;
mod table;
mod volume;


use alloc::boxed::Box;
use alloc::vec;

use umsfs_block::{BlockRange, SharedDevice};
use umsfs_vfs::{Filesystem, FilesystemDriver, FsResult};

pub use bpb::{BiosParameterBlock, FatType};
pub use dir::{attrs, RawDirEntry};
pub use volume::FatVolume;

/// The FAT-family entry for the driver registry
pub struct FatDriver;

impl FilesystemDriver for FatDriver {
    fn name(&self) -> &'static str {
        "fat"
    }

    fn probe(&self, device: &SharedDevice, range: BlockRange) -> FsResult<bool> {
        let block_size = device.lock().geometry().block_size;
        if (block_size as usize) < 512 || range.count == 0 {
            return Ok(false);
        }
        let mut sector = vec![0u8; block_size as usize];
        device.lock().read_blocks(range.start, &mut sector)?;
        Ok(BiosParameterBlock::probe(&sector))
    }

    fn mount(&self, device: &SharedDevice, range: BlockRange) -> FsResult<Box<dyn Filesystem>> {
        FatVolume::mount(device, range).map(|volume| Box::new(volume) as Box<dyn Filesystem>)
    }
}
