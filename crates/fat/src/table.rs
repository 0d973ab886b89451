//! FAT entry encoding
//!
//! Pure decode logic for the three entry widths. Sector I/O stays in the
//! volume; this module only knows where an entry lives inside the FAT
//! region and what its raw value means.

use crate::bpb::FatType;

/// End of cluster chain markers
pub const EOC_FAT12: u32 = 0x0FF8;
pub const EOC_FAT16: u32 = 0xFFF8;
pub const EOC_FAT32: u32 = 0x0FFF_FFF8;

/// Bad cluster markers
pub const BAD_FAT12: u32 = 0x0FF7;
pub const BAD_FAT16: u32 = 0xFFF7;
pub const BAD_FAT32: u32 = 0x0FFF_FFF7;

/// Free cluster marker
pub const FREE_CLUSTER: u32 = 0;

/// Decoded FAT entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainLink {
    /// Chain continues at this cluster
    Next(u32),
    /// End of chain
    End,
    /// Cluster is unallocated; inside a chain this means corruption
    Free,
    /// Cluster is marked bad
    Bad,
}

/// Byte offset of a cluster's entry within the FAT region
///
/// FAT12 entries are packed 1.5 bytes each, so odd clusters start mid-byte
/// and `decode` picks the right nibbles.
pub fn entry_offset(fat_type: FatType, cluster: u32) -> u64 {
    match fat_type {
        FatType::Fat12 => (cluster + cluster / 2) as u64,
        FatType::Fat16 => cluster as u64 * 2,
        FatType::Fat32 => cluster as u64 * 4,
    }
}

/// Decode the raw entry value from the bytes at `entry_offset`
///
/// `bytes` must hold at least `fat_type.entry_width()` bytes.
pub fn decode(fat_type: FatType, cluster: u32, bytes: &[u8]) -> u32 {
    match fat_type {
        FatType::Fat12 => {
            let low = bytes[0] as u32;
            let high = bytes[1] as u32;
            if cluster & 1 != 0 {
                (low >> 4) | (high << 4)
            } else {
                low | ((high & 0x0F) << 8)
            }
        }
        FatType::Fat16 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
        FatType::Fat32 => {
            // Top 4 bits are reserved
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) & 0x0FFF_FFFF
        }
    }
}

/// Classify a raw entry value
pub fn classify(fat_type: FatType, value: u32) -> ChainLink {
    let (eoc, bad) = match fat_type {
        FatType::Fat12 => (EOC_FAT12, BAD_FAT12),
        FatType::Fat16 => (EOC_FAT16, BAD_FAT16),
        FatType::Fat32 => (EOC_FAT32, BAD_FAT32),
    };
    if value == FREE_CLUSTER {
        ChainLink::Free
    } else if value == bad {
        ChainLink::Bad
    } else if value >= eoc {
        ChainLink::End
    } else {
        ChainLink::Next(value)
    }
}
