//! BIOS Parameter Block parsing
//!
//! The BPB sits in the first 512 bytes of a FAT volume. `probe` does the
//! cheap signature check the driver registry needs; `parse` extracts the
//! fields and runs the structural consistency pass.

use alloc::string::String;

use umsfs_vfs::{FsError, FsResult};

/// FAT type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

impl FatType {
    /// Format identifier as reported to callers
    pub fn name(self) -> &'static str {
        match self {
            FatType::Fat12 => "FAT12",
            FatType::Fat16 => "FAT16",
            FatType::Fat32 => "FAT32",
        }
    }

    /// FAT entry width in bytes; FAT12 entries are packed 1.5 bytes
    /// each, so two bytes always cover one
    pub(crate) fn entry_width(self) -> usize {
        match self {
            FatType::Fat12 | FatType::Fat16 => 2,
            FatType::Fat32 => 4,
        }
    }
}

/// Clusters the FAT cannot address; chains may never reach these values
const MAX_FAT32_CLUSTERS: u64 = 0x0FFF_FFF6;

/// FAT12/16 vs FAT32 threshold per the format's defining algorithm
const FAT12_MAX_CLUSTERS: u64 = 4085;
const FAT16_MAX_CLUSTERS: u64 = 65525;

/// BIOS Parameter Block - common to all FAT variants
#[derive(Debug, Clone)]
pub struct BiosParameterBlock {
    /// Bytes per sector (power of two, 512..=4096)
    pub bytes_per_sector: u16,
    /// Sectors per cluster (power of two)
    pub sectors_per_cluster: u8,
    /// Reserved sector count (including boot sector)
    pub reserved_sector_count: u16,
    /// Number of FATs (usually 2)
    pub num_fats: u8,
    /// Root entry count (0 for FAT32)
    pub root_entry_count: u16,
    /// Total sectors (16-bit, 0 if using 32-bit field)
    pub total_sectors_16: u16,
    /// FAT size in sectors (16-bit, 0 for FAT32)
    pub fat_size_16: u16,
    /// Total sectors (32-bit)
    pub total_sectors_32: u32,
    /// FAT32: FAT size in sectors
    pub fat_size_32: u32,
    /// FAT32: root directory cluster
    pub root_cluster: u32,
    /// Volume label
    pub volume_label: [u8; 11],
}

impl BiosParameterBlock {
    /// Cheap signature check without full parsing
    ///
    /// True when the sector ends in the 0xAA55 boot signature and the
    /// two geometry fields every FAT variant shares look sane. Never
    /// touches the device.
    pub fn probe(sector: &[u8]) -> bool {
        if sector.len() < 512 || sector[510] != 0x55 || sector[511] != 0xAA {
            return false;
        }
        let bytes_per_sector = u16::from_le_bytes([sector[11], sector[12]]);
        let sectors_per_cluster = sector[13];
        (512..=4096).contains(&bytes_per_sector)
            && bytes_per_sector.is_power_of_two()
            && sectors_per_cluster != 0
            && sectors_per_cluster.is_power_of_two()
    }

    /// Parse a boot sector, running the full consistency pass
    ///
    /// Callers are expected to have probed first; anything wrong at this
    /// point is a structural fault, so every violation is `Corrupted`.
    pub fn parse(sector: &[u8]) -> FsResult<Self> {
        if !Self::probe(sector) {
            return Err(FsError::Corrupted);
        }

        let fat_size_16 = u16::from_le_bytes([sector[22], sector[23]]);
        let mut volume_label = [0u8; 11];
        let (fat_size_32, root_cluster) = if fat_size_16 == 0 {
            volume_label.copy_from_slice(&sector[71..82]);
            (
                u32::from_le_bytes([sector[36], sector[37], sector[38], sector[39]]),
                u32::from_le_bytes([sector[44], sector[45], sector[46], sector[47]]),
            )
        } else {
            volume_label.copy_from_slice(&sector[43..54]);
            (0, 0)
        };

        let bpb = BiosParameterBlock {
            bytes_per_sector: u16::from_le_bytes([sector[11], sector[12]]),
            sectors_per_cluster: sector[13],
            reserved_sector_count: u16::from_le_bytes([sector[14], sector[15]]),
            num_fats: sector[16],
            root_entry_count: u16::from_le_bytes([sector[17], sector[18]]),
            total_sectors_16: u16::from_le_bytes([sector[19], sector[20]]),
            fat_size_16,
            total_sectors_32: u32::from_le_bytes([sector[32], sector[33], sector[34], sector[35]]),
            fat_size_32,
            root_cluster,
            volume_label,
        };
        bpb.validate()?;
        Ok(bpb)
    }

    fn validate(&self) -> FsResult<()> {
        if self.reserved_sector_count == 0
            || self.num_fats == 0
            || self.fat_size() == 0
            || self.total_sectors() == 0
        {
            return Err(FsError::Corrupted);
        }

        let cluster_count = self.cluster_count()?;
        if cluster_count == 0 || cluster_count >= MAX_FAT32_CLUSTERS {
            return Err(FsError::Corrupted);
        }

        // The 16-bit FAT size field doubles as the FAT32 discriminator;
        // it must agree with what the cluster count says the volume is.
        if (self.fat_size_16 == 0) != (cluster_count >= FAT16_MAX_CLUSTERS) {
            return Err(FsError::Corrupted);
        }

        match self.fat_type() {
            FatType::Fat32 => {
                if self.root_entry_count != 0 {
                    return Err(FsError::Corrupted);
                }
                let root = self.root_cluster as u64;
                if root < 2 || root >= cluster_count + 2 {
                    return Err(FsError::Corrupted);
                }
            }
            _ => {
                if self.root_entry_count == 0 {
                    return Err(FsError::Corrupted);
                }
            }
        }

        // The FAT region must cover every addressable cluster; entries 0
        // and 1 are reserved, so cluster_count + 2 entries are needed.
        let entries = cluster_count + 2;
        let needed = match self.fat_type() {
            FatType::Fat12 => (entries * 3 + 1) / 2,
            FatType::Fat16 => entries * 2,
            FatType::Fat32 => entries * 4,
        };
        let available = self.fat_size() as u64 * self.bytes_per_sector as u64;
        if needed > available {
            return Err(FsError::Corrupted);
        }

        Ok(())
    }

    /// FAT size in sectors, whichever field holds it
    pub fn fat_size(&self) -> u32 {
        if self.fat_size_16 != 0 {
            self.fat_size_16 as u32
        } else {
            self.fat_size_32
        }
    }

    /// Total volume size in filesystem sectors
    pub fn total_sectors(&self) -> u64 {
        if self.total_sectors_16 != 0 {
            self.total_sectors_16 as u64
        } else {
            self.total_sectors_32 as u64
        }
    }

    /// Sectors occupied by the fixed FAT12/16 root directory
    pub fn root_dir_sectors(&self) -> u32 {
        ((self.root_entry_count as u32 * 32) + (self.bytes_per_sector as u32 - 1))
            / self.bytes_per_sector as u32
    }

    /// First sector of the data region
    pub fn first_data_sector(&self) -> u64 {
        self.reserved_sector_count as u64
            + self.num_fats as u64 * self.fat_size() as u64
            + self.root_dir_sectors() as u64
    }

    /// Number of data clusters the volume holds
    fn cluster_count(&self) -> FsResult<u64> {
        let data_sectors = self
            .total_sectors()
            .checked_sub(self.first_data_sector())
            .ok_or(FsError::Corrupted)?;
        Ok(data_sectors / self.sectors_per_cluster as u64)
    }

    /// Cluster count after `validate` has established it is sane
    pub fn data_clusters(&self) -> u32 {
        self.cluster_count().unwrap_or(0) as u32
    }

    /// Determine FAT type from the data-cluster count
    ///
    /// The thresholds are the format's defining algorithm: below 4085
    /// clusters the volume is FAT12, below 65525 FAT16, else FAT32.
    pub fn fat_type(&self) -> FatType {
        let clusters = self.cluster_count().unwrap_or(0);
        if clusters < FAT12_MAX_CLUSTERS {
            FatType::Fat12
        } else if clusters < FAT16_MAX_CLUSTERS {
            FatType::Fat16
        } else {
            FatType::Fat32
        }
    }

    /// Volume label with trailing padding removed; `None` when unset
    pub fn volume_label_str(&self) -> Option<String> {
        let end = self
            .volume_label
            .iter()
            .rposition(|&c| c != 0x20 && c != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        if end == 0 {
            return None;
        }
        core::str::from_utf8(&self.volume_label[..end])
            .ok()
            .map(String::from)
    }
}
