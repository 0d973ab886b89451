//! Mounted FAT volume
//!
//! Owns the parsed layout and the shared device, performs all sector and
//! cluster I/O offset by the partition's start block, and implements the
//! read-only filesystem operations. The layout is immutable after mount;
//! readers share it through an `Arc` and observe the unmounted flag once
//! the session tears the volume down.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use umsfs_block::{BlockRange, SharedDevice};
use umsfs_vfs::{
    path, DirHandle, FileEntry, FileHandle, FileReader, Filesystem, FsError, FsResult, Node,
    VolumeInfo,
};

use crate::bpb::{BiosParameterBlock, FatType};
use crate::dir::{self, LongNameCollector, NamedEntry};
use crate::reader::FatReader;
use crate::table::{self, ChainLink};

/// Geometry derived from the BPB, fixed for the life of the mount
pub(crate) struct FatLayout {
    pub fat_type: FatType,
    /// Device blocks backing the volume
    pub partition: BlockRange,
    /// Device blocks per filesystem sector
    pub blocks_per_sector: u64,
    /// Filesystem sector size in bytes
    pub sector_size: u32,
    pub sectors_per_cluster: u32,
    /// First sector of the (first) FAT
    pub fat_start: u64,
    /// Fixed FAT12/16 root directory region
    pub root_dir_start: u64,
    pub root_dir_sectors: u32,
    /// FAT32 root directory cluster
    pub root_cluster: u32,
    pub first_data_sector: u64,
    pub total_sectors: u64,
    pub cluster_count: u32,
    pub label: Option<String>,
}

impl FatLayout {
    fn new(bpb: &BiosParameterBlock, range: BlockRange, block_size: u32) -> FsResult<Self> {
        let sector_size = bpb.bytes_per_sector as u32;
        if block_size == 0 || sector_size < block_size || sector_size % block_size != 0 {
            warn!(
                "sector size {} incompatible with device block size {}",
                sector_size, block_size
            );
            return Err(FsError::Corrupted);
        }
        let blocks_per_sector = (sector_size / block_size) as u64;

        let total_sectors = bpb.total_sectors();
        let volume_blocks = total_sectors
            .checked_mul(blocks_per_sector)
            .ok_or(FsError::Corrupted)?;
        if volume_blocks > range.count {
            warn!(
                "volume claims {} blocks but partition holds {}",
                volume_blocks, range.count
            );
            return Err(FsError::Corrupted);
        }

        let fat_start = bpb.reserved_sector_count as u64;
        let root_dir_start = fat_start + bpb.num_fats as u64 * bpb.fat_size() as u64;
        Ok(FatLayout {
            fat_type: bpb.fat_type(),
            partition: range,
            blocks_per_sector,
            sector_size,
            sectors_per_cluster: bpb.sectors_per_cluster as u32,
            fat_start,
            root_dir_start,
            root_dir_sectors: bpb.root_dir_sectors(),
            root_cluster: bpb.root_cluster,
            first_data_sector: bpb.first_data_sector(),
            total_sectors,
            cluster_count: bpb.data_clusters(),
            label: bpb.volume_label_str(),
        })
    }

    pub fn cluster_size(&self) -> u32 {
        self.sectors_per_cluster * self.sector_size
    }

    fn cluster_to_sector(&self, cluster: u32) -> u64 {
        self.first_data_sector + (cluster as u64 - 2) * self.sectors_per_cluster as u64
    }

    /// Whether `cluster` addresses a data cluster of this volume
    pub fn is_valid_data_cluster(&self, cluster: u32) -> bool {
        cluster >= 2 && (cluster as u64) < self.cluster_count as u64 + 2
    }
}

/// Volume state shared between the filesystem object and its readers
pub(crate) struct FatInner {
    device: SharedDevice,
    layout: FatLayout,
    mounted: AtomicBool,
}

impl FatInner {
    pub fn cluster_size(&self) -> u32 {
        self.layout.cluster_size()
    }

    pub fn cluster_count(&self) -> u32 {
        self.layout.cluster_count
    }

    pub fn check_mounted(&self) -> FsResult<()> {
        if self.mounted.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(FsError::NotMounted)
        }
    }

    /// Read one filesystem sector, offset into the partition
    fn read_sector(&self, sector: u64, buf: &mut [u8]) -> FsResult<()> {
        self.check_mounted()?;
        if sector >= self.layout.total_sectors {
            return Err(FsError::Corrupted);
        }
        let block = self.layout.partition.start + sector * self.layout.blocks_per_sector;
        self.device.lock().read_blocks(block, buf)?;
        Ok(())
    }

    /// Read a whole data cluster; `buf` must be `cluster_size` bytes
    pub fn read_cluster(&self, cluster: u32, buf: &mut [u8]) -> FsResult<()> {
        if !self.layout.is_valid_data_cluster(cluster) {
            warn!("cluster {} outside data region", cluster);
            return Err(FsError::Corrupted);
        }
        let first = self.layout.cluster_to_sector(cluster);
        let sector_size = self.layout.sector_size as usize;
        for i in 0..self.layout.sectors_per_cluster as usize {
            self.read_sector(first + i as u64, &mut buf[i * sector_size..(i + 1) * sector_size])?;
        }
        Ok(())
    }

    /// Follow the FAT one link from `cluster`
    pub fn next_cluster(&self, cluster: u32) -> FsResult<ChainLink> {
        let fat_type = self.layout.fat_type;
        let offset = table::entry_offset(fat_type, cluster);
        let width = fat_type.entry_width();
        let sector_size = self.layout.sector_size as usize;

        let sector = self.layout.fat_start + offset / sector_size as u64;
        let in_sector = (offset % sector_size as u64) as usize;

        let mut buf = vec![0u8; sector_size];
        self.read_sector(sector, &mut buf)?;

        let mut raw = [0u8; 4];
        if in_sector + width <= sector_size {
            raw[..width].copy_from_slice(&buf[in_sector..in_sector + width]);
        } else {
            // FAT12 entry straddling a sector boundary
            let split = sector_size - in_sector;
            raw[..split].copy_from_slice(&buf[in_sector..]);
            self.read_sector(sector + 1, &mut buf)?;
            raw[split..width].copy_from_slice(&buf[..width - split]);
        }
        Ok(table::classify(fat_type, table::decode(fat_type, cluster, &raw)))
    }

    /// Collect every listable entry of a directory
    ///
    /// `token` 0 names the fixed FAT12/16 root region; anything else is
    /// the first cluster of an ordinary directory chain. The chain walk
    /// is bounded by the volume's cluster count so cyclic directories
    /// fail instead of looping.
    pub fn read_dir_entries(&self, token: u32) -> FsResult<Vec<NamedEntry>> {
        if token == 0 && self.layout.fat_type != FatType::Fat32 {
            return self.read_fixed_root();
        }

        let mut entries = Vec::new();
        let mut collector = LongNameCollector::new();
        let mut buf = vec![0u8; self.layout.cluster_size() as usize];
        let mut cluster = token;
        let mut walked = 0u32;
        loop {
            walked += 1;
            if walked > self.layout.cluster_count {
                warn!("directory chain exceeds volume cluster count, assuming a cycle");
                return Err(FsError::Corrupted);
            }
            self.read_cluster(cluster, &mut buf)?;
            if dir::collect_slots(&buf, &mut collector, &mut entries) {
                break;
            }
            match self.next_cluster(cluster)? {
                ChainLink::Next(next) => cluster = next,
                ChainLink::End => break,
                ChainLink::Free | ChainLink::Bad => {
                    warn!("directory chain hit an unallocated or bad cluster");
                    return Err(FsError::Corrupted);
                }
            }
        }
        Ok(entries)
    }

    fn read_fixed_root(&self) -> FsResult<Vec<NamedEntry>> {
        let mut entries = Vec::new();
        let mut collector = LongNameCollector::new();
        let mut buf = vec![0u8; self.layout.sector_size as usize];
        for i in 0..self.layout.root_dir_sectors as u64 {
            self.read_sector(self.layout.root_dir_start + i, &mut buf)?;
            if dir::collect_slots(&buf, &mut collector, &mut entries) {
                break;
            }
        }
        Ok(entries)
    }
}

/// A mounted FAT12/16/32 volume
pub struct FatVolume {
    inner: Arc<FatInner>,
}

impl FatVolume {
    /// Parse and mount the volume occupying `range` on `device`
    ///
    /// Fails with `UnsupportedFormat` when the boot sector does not look
    /// like FAT at all, `Corrupted` when it does but the structural
    /// checks fail.
    pub fn mount(device: &SharedDevice, range: BlockRange) -> FsResult<Self> {
        let block_size = device.lock().geometry().block_size;
        if (block_size as usize) < 512 || range.count == 0 {
            return Err(FsError::UnsupportedFormat);
        }

        let mut sector = vec![0u8; block_size as usize];
        device.lock().read_blocks(range.start, &mut sector)?;
        if !BiosParameterBlock::probe(&sector) {
            return Err(FsError::UnsupportedFormat);
        }
        let bpb = BiosParameterBlock::parse(&sector)?;
        let layout = FatLayout::new(&bpb, range, block_size)?;
        info!(
            "mounted {} volume: {} clusters of {} bytes, label {:?}",
            layout.fat_type.name(),
            layout.cluster_count,
            layout.cluster_size(),
            layout.label
        );

        Ok(FatVolume {
            inner: Arc::new(FatInner {
                device: Arc::clone(device),
                layout,
                mounted: AtomicBool::new(true),
            }),
        })
    }

    fn root_token(&self) -> u64 {
        match self.inner.layout.fat_type {
            FatType::Fat32 => self.inner.layout.root_cluster as u64,
            _ => 0,
        }
    }
}

impl Filesystem for FatVolume {
    fn format(&self) -> &'static str {
        self.inner.layout.fat_type.name()
    }

    fn info(&self) -> VolumeInfo {
        let layout = &self.inner.layout;
        VolumeInfo {
            format: layout.fat_type.name(),
            label: layout.label.clone(),
            cluster_size: layout.cluster_size(),
            total_bytes: layout.cluster_count as u64 * layout.cluster_size() as u64,
        }
    }

    fn root(&self) -> DirHandle {
        DirHandle {
            token: self.root_token(),
            path: String::new(),
        }
    }

    fn resolve(&mut self, base: &DirHandle, components: &[&str]) -> FsResult<Node> {
        self.inner.check_mounted()?;
        let mut current = Node::Dir(base.clone());
        for component in components {
            let dir = match current {
                Node::Dir(d) => d,
                Node::File(_) => return Err(FsError::NotADirectory),
            };
            let entries = self.inner.read_dir_entries(dir.token as u32)?;
            let found = entries
                .iter()
                .find(|e| e.name == *component)
                .ok_or(FsError::NotFound)?;
            current = if found.raw.is_directory() {
                Node::Dir(DirHandle {
                    token: found.raw.first_cluster() as u64,
                    path: path::descend(&dir.path, &found.name),
                })
            } else {
                Node::File(FileHandle {
                    token: found.raw.first_cluster() as u64,
                    size: found.raw.file_size as u64,
                })
            };
        }
        Ok(current)
    }

    fn list_children(&mut self, dir: &DirHandle) -> FsResult<Vec<FileEntry>> {
        self.inner.check_mounted()?;
        let entries = self.inner.read_dir_entries(dir.token as u32)?;
        Ok(entries.iter().map(|e| e.to_file_entry(&dir.path)).collect())
    }

    fn open_for_read(&mut self, file: &FileHandle) -> FsResult<Box<dyn FileReader>> {
        self.inner.check_mounted()?;
        Ok(Box::new(FatReader::new(
            Arc::clone(&self.inner),
            file.token as u32,
            file.size,
        )))
    }

    fn unmount(&mut self) {
        debug!("unmounting {} volume", self.inner.layout.fat_type.name());
        self.inner.mounted.store(false, Ordering::Release);
    }
}
