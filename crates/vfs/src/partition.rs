//! MBR partition table scan
//!
//! Reads the device's first block, validates the boot signature, and
//! extracts the four primary slots. Un-partitioned media and first
//! sectors that are really FAT volume boot records both yield an empty
//! list, telling the caller to treat the whole device as one filesystem
//! candidate. Extended partitions are not followed; the session only
//! ever mounts the first usable entry.

use alloc::vec;
use alloc::vec::Vec;

use log::{debug, warn};
use umsfs_block::{BlockRange, SharedDevice};

use crate::error::{FsError, FsResult};

/// Boot signature closing the first sector
const BOOT_SIGNATURE: u16 = 0xAA55;
/// Byte offset of the first partition slot
const TABLE_OFFSET: usize = 446;
/// Bytes per slot
const SLOT_SIZE: usize = 16;
/// Primary slots in an MBR
const SLOT_COUNT: usize = 4;

/// Partition type decoded from the MBR type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionType {
    Empty,
    Fat12,
    Fat16,
    Fat32,
    /// NTFS or exFAT (both use 0x07)
    Ntfs,
    /// Extended partition container (0x05, 0x0F)
    Extended,
    LinuxSwap,
    LinuxNative,
    /// Protective entry covering a GPT disk (0xEE)
    GptProtective,
    Unknown(u8),
}

impl From<u8> for PartitionType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => PartitionType::Empty,
            0x01 => PartitionType::Fat12,
            0x04 | 0x06 | 0x0E => PartitionType::Fat16,
            0x0B | 0x0C => PartitionType::Fat32,
            0x07 => PartitionType::Ntfs,
            0x05 | 0x0F => PartitionType::Extended,
            0x82 => PartitionType::LinuxSwap,
            0x83 => PartitionType::LinuxNative,
            0xEE => PartitionType::GptProtective,
            other => PartitionType::Unknown(other),
        }
    }
}

impl PartitionType {
    /// Whether this type names something a format driver could mount
    ///
    /// Containers, swap, protective entries, and unknown type bytes are
    /// never handed to the driver registry.
    pub fn is_mountable(&self) -> bool {
        matches!(
            self,
            PartitionType::Fat12
                | PartitionType::Fat16
                | PartitionType::Fat32
                | PartitionType::Ntfs
                | PartitionType::LinuxNative
        )
    }
}

/// One populated MBR slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionEntry {
    /// Slot index in the table (0..=3)
    pub index: usize,
    /// Decoded type byte
    pub kind: PartitionType,
    /// Boot flag (0x80 in the status byte)
    pub bootable: bool,
    /// Device blocks the partition covers
    pub range: BlockRange,
}

/// Scan a device's first block for partition entries
///
/// An empty result means un-partitioned media: the whole device is the
/// filesystem candidate.
pub fn scan(device: &SharedDevice) -> FsResult<Vec<PartitionEntry>> {
    let (sector, total_blocks) = {
        let mut dev = device.lock();
        let geometry = dev.geometry();
        if geometry.block_size < 512 {
            // too small to hold an MBR at all
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; geometry.block_size as usize];
        dev.read_blocks(0, &mut buf)?;
        (buf, geometry.total_blocks)
    };
    parse(&sector, total_blocks)
}

/// Parse an MBR sector against a device of `total_blocks`
pub fn parse(sector: &[u8], total_blocks: u64) -> FsResult<Vec<PartitionEntry>> {
    if sector.len() < 512 {
        return Ok(Vec::new());
    }
    if u16::from_le_bytes([sector[510], sector[511]]) != BOOT_SIGNATURE {
        debug!("no boot signature, treating device as unpartitioned");
        return Ok(Vec::new());
    }
    if looks_like_vbr(sector) {
        debug!("first sector is a volume boot record, not a partition table");
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for index in 0..SLOT_COUNT {
        let offset = TABLE_OFFSET + index * SLOT_SIZE;
        let slot = &sector[offset..offset + SLOT_SIZE];
        let kind = PartitionType::from(slot[4]);
        let start = u32::from_le_bytes([slot[8], slot[9], slot[10], slot[11]]) as u64;
        let count = u32::from_le_bytes([slot[12], slot[13], slot[14], slot[15]]) as u64;
        if kind == PartitionType::Empty || count == 0 {
            continue;
        }
        let range = BlockRange { start, count };
        if !range.fits(total_blocks) {
            warn!(
                "partition {} exceeds device: {}+{} of {} blocks",
                index, start, count, total_blocks
            );
            return Err(FsError::CorruptTable);
        }
        debug!(
            "partition {}: {:?}, {} blocks at {}",
            index, kind, count, start
        );
        entries.push(PartitionEntry {
            index,
            kind,
            bootable: slot[0] & 0x80 != 0,
            range,
        });
    }
    Ok(entries)
}

/// First entry worth mounting: non-empty, recognized type, non-zero
/// length (zero-length slots were already dropped during parsing)
pub fn first_usable(entries: &[PartitionEntry]) -> Option<&PartitionEntry> {
    entries.iter().find(|e| e.kind.is_mountable())
}

// FAT volume boot records end in the same 0xAA55 signature; without this
// check a superfloppy would parse as a table of garbage slots. The FAT
// type string sits at 54..62 (FAT12/16) or 82..90 (FAT32).
fn looks_like_vbr(sector: &[u8]) -> bool {
    &sector[54..57] == b"FAT" || &sector[82..85] == b"FAT"
}

#[cfg(test)]
mod tests {
    use super::*;
    use umsfs_block::BlockDevice;

    fn mbr_with_slots(slots: &[(usize, u8, u32, u32)]) -> Vec<u8> {
        let mut sector = vec![0u8; 512];
        sector[510] = 0x55;
        sector[511] = 0xAA;
        for &(index, kind, start, count) in slots {
            let off = TABLE_OFFSET + index * SLOT_SIZE;
            sector[off + 4] = kind;
            sector[off + 8..off + 12].copy_from_slice(&start.to_le_bytes());
            sector[off + 12..off + 16].copy_from_slice(&count.to_le_bytes());
        }
        sector
    }

    #[test]
    fn test_missing_signature_is_empty_not_error() {
        let sector = vec![0u8; 512];
        assert_eq!(parse(&sector, 1000).unwrap(), Vec::new());
    }

    #[test]
    fn test_entries_in_slot_order() {
        let sector = mbr_with_slots(&[(0, 0x06, 64, 400), (1, 0x0B, 500, 300)]);
        let entries = parse(&sector, 1000).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, PartitionType::Fat16);
        assert_eq!(entries[0].range, BlockRange { start: 64, count: 400 });
        assert_eq!(entries[1].kind, PartitionType::Fat32);
        assert_eq!(entries[1].index, 1);
    }

    #[test]
    fn test_empty_slots_are_skipped() {
        let sector = mbr_with_slots(&[(2, 0x06, 64, 400)]);
        let entries = parse(&sector, 1000).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].index, 2);
    }

    #[test]
    fn test_zero_length_slot_is_skipped() {
        let sector = mbr_with_slots(&[(0, 0x06, 64, 0), (1, 0x06, 64, 100)]);
        let entries = parse(&sector, 1000).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].index, 1);
    }

    #[test]
    fn test_overflowing_entry_is_corrupt() {
        let sector = mbr_with_slots(&[(0, 0x06, 900, 200)]);
        assert_eq!(parse(&sector, 1000), Err(FsError::CorruptTable));
    }

    #[test]
    fn test_vbr_is_treated_as_unpartitioned() {
        let mut sector = mbr_with_slots(&[(0, 0x06, 0xFFFF, 0xFFFF)]);
        sector[54..62].copy_from_slice(b"FAT16   ");
        assert_eq!(parse(&sector, 1000).unwrap(), Vec::new());

        let mut fat32 = mbr_with_slots(&[(0, 0x06, 0xFFFF, 0xFFFF)]);
        fat32[82..90].copy_from_slice(b"FAT32   ");
        assert_eq!(parse(&fat32, 1000).unwrap(), Vec::new());
    }

    #[test]
    fn test_first_usable_skips_containers_and_protective() {
        let sector = mbr_with_slots(&[
            (0, 0x05, 10, 100),
            (1, 0xEE, 1, 999),
            (2, 0x82, 200, 50),
            (3, 0x0C, 300, 500),
        ]);
        let entries = parse(&sector, 1000).unwrap();
        let usable = first_usable(&entries).unwrap();
        assert_eq!(usable.index, 3);
        assert_eq!(usable.kind, PartitionType::Fat32);
    }

    #[test]
    fn test_unknown_type_is_not_usable() {
        let sector = mbr_with_slots(&[(0, 0x42, 10, 100)]);
        let entries = parse(&sector, 1000).unwrap();
        assert_eq!(entries[0].kind, PartitionType::Unknown(0x42));
        assert!(first_usable(&entries).is_none());
    }

    #[test]
    fn test_scan_reads_first_block() {
        let mut image = mbr_with_slots(&[(0, 0x06, 2, 6)]);
        image.resize(8 * 512, 0);
        let mut disk = umsfs_block::RamDisk::from_image(512, image);
        disk.open().unwrap();
        let device = umsfs_block::share(disk);
        let entries = scan(&device).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].range, BlockRange { start: 2, count: 6 });
    }
}
