//! FAT directory entry handling
//!
//! Parses the 32-byte slot format, assembles long names from their
//! preceding fragment slots, and decodes the native timestamps. Name
//! matching is case-sensitive against whatever name the entry presents:
//! the long name when a valid chain precedes the short entry, otherwise
//! the stored 8.3 name.

use alloc::string::String;
use alloc::vec::Vec;

use umsfs_vfs::{path, FileEntry, FileType, Timestamp};

/// FAT directory entry attributes
pub mod attrs {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const VOLUME_ID: u8 = 0x08;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
    pub const LONG_NAME: u8 = READ_ONLY | HIDDEN | SYSTEM | VOLUME_ID;
    pub const LONG_NAME_MASK: u8 = LONG_NAME | DIRECTORY | ARCHIVE;
}

/// Slot marker for deleted entries
const DELETED: u8 = 0xE5;
/// UTF-16 units per long-name slot
const UNITS_PER_SLOT: usize = 13;

/// Checksum of an 8.3 name, stored in each of its long-name slots
pub fn short_checksum(name: &[u8; 11]) -> u8 {
    name.iter()
        .fold(0u8, |sum, &b| ((sum & 1) << 7).wrapping_add(sum >> 1).wrapping_add(b))
}

/// FAT directory entry (32 bytes)
#[derive(Debug, Clone)]
pub struct RawDirEntry {
    /// 8.3 filename
    pub name: [u8; 11],
    /// File attributes
    pub attributes: u8,
    /// Creation time 10 ms units (0..=199)
    pub creation_time_tenths: u8,
    /// Creation time
    pub creation_time: u16,
    /// Creation date
    pub creation_date: u16,
    /// Last access date (date resolution only)
    pub last_access_date: u16,
    /// High 16 bits of first cluster (FAT32)
    pub first_cluster_high: u16,
    /// Last modification time
    pub modification_time: u16,
    /// Last modification date
    pub modification_date: u16,
    /// Low 16 bits of first cluster
    pub first_cluster_low: u16,
    /// File size in bytes
    pub file_size: u32,
}

impl RawDirEntry {
    /// Parse a 32-byte directory slot
    pub fn parse(slot: &[u8]) -> Self {
        let mut name = [0u8; 11];
        name.copy_from_slice(&slot[0..11]);
        RawDirEntry {
            name,
            attributes: slot[11],
            creation_time_tenths: slot[13],
            creation_time: u16::from_le_bytes([slot[14], slot[15]]),
            creation_date: u16::from_le_bytes([slot[16], slot[17]]),
            last_access_date: u16::from_le_bytes([slot[18], slot[19]]),
            first_cluster_high: u16::from_le_bytes([slot[20], slot[21]]),
            modification_time: u16::from_le_bytes([slot[22], slot[23]]),
            modification_date: u16::from_le_bytes([slot[24], slot[25]]),
            first_cluster_low: u16::from_le_bytes([slot[26], slot[27]]),
            file_size: u32::from_le_bytes([slot[28], slot[29], slot[30], slot[31]]),
        }
    }

    /// Check if this is a directory
    pub fn is_directory(&self) -> bool {
        self.attributes & attrs::DIRECTORY != 0
    }

    /// Check if this is a volume label
    pub fn is_volume_label(&self) -> bool {
        self.attributes & attrs::VOLUME_ID != 0
    }

    /// Get the first cluster number
    pub fn first_cluster(&self) -> u32 {
        ((self.first_cluster_high as u32) << 16) | (self.first_cluster_low as u32)
    }

    /// Checksum the long-name slots of this entry must carry
    pub fn checksum(&self) -> u8 {
        short_checksum(&self.name)
    }

    /// Get the 8.3 filename as a string
    pub fn short_name(&self) -> String {
        let name_part = &self.name[0..8];
        let ext_part = &self.name[8..11];

        let name_end = name_part
            .iter()
            .rposition(|&c| c != 0x20)
            .map(|i| i + 1)
            .unwrap_or(0);
        let ext_end = ext_part
            .iter()
            .rposition(|&c| c != 0x20)
            .map(|i| i + 1)
            .unwrap_or(0);

        let mut result = String::new();
        if name_end > 0 {
            // 0x05 in the first byte stands in for a real 0xE5
            let first = if name_part[0] == 0x05 { 0xE5 } else { name_part[0] };
            result.push(first as char);
            for &c in &name_part[1..name_end] {
                result.push(c as char);
            }
        }
        if ext_end > 0 {
            result.push('.');
            for &c in &ext_part[0..ext_end] {
                result.push(c as char);
            }
        }
        result
    }

    /// Creation stamp at 10 ms resolution, if recorded
    pub fn created(&self) -> Option<Timestamp> {
        (self.creation_date != 0).then(|| {
            Timestamp::from_dos_datetime_tenths(
                self.creation_date,
                self.creation_time,
                self.creation_time_tenths,
            )
        })
    }

    /// Modification stamp at two-second resolution, if recorded
    pub fn modified(&self) -> Option<Timestamp> {
        (self.modification_date != 0)
            .then(|| Timestamp::from_dos_datetime(self.modification_date, self.modification_time))
    }

    /// Access stamp; FAT stores these at date resolution only
    pub fn accessed(&self) -> Option<Timestamp> {
        (self.last_access_date != 0).then(|| Timestamp::from_dos_date(self.last_access_date))
    }
}

/// A directory entry together with the name it presents
#[derive(Debug, Clone)]
pub struct NamedEntry {
    pub name: String,
    pub raw: RawDirEntry,
}

impl NamedEntry {
    /// Materialize a listing element under `parent`
    pub fn to_file_entry(&self, parent: &str) -> FileEntry {
        let is_dir = self.raw.is_directory();
        FileEntry {
            name: self.name.clone(),
            path: path::join(parent, &self.name),
            kind: if is_dir { FileType::Directory } else { FileType::File },
            size: if is_dir { None } else { Some(self.raw.file_size as u64) },
            created: self.raw.created(),
            modified: self.raw.modified(),
            accessed: self.raw.accessed(),
        }
    }
}

/// Accumulates long-name fragments until their short entry arrives
///
/// Fragments are stored physically last-part-first, each carrying its
/// ordinal and the short name's checksum. Any inconsistency invalidates
/// the whole chain and the entry falls back to its 8.3 name.
pub struct LongNameCollector {
    units: Vec<u16>,
    next_seq: u8,
    checksum: u8,
    valid: bool,
}

impl LongNameCollector {
    pub fn new() -> Self {
        LongNameCollector {
            units: Vec::new(),
            next_seq: 0,
            checksum: 0,
            valid: false,
        }
    }

    pub fn reset(&mut self) {
        self.units.clear();
        self.next_seq = 0;
        self.valid = false;
    }

    /// Feed one long-name slot
    pub fn push(&mut self, slot: &[u8]) {
        let seq = slot[0] & 0x1F;
        if slot[0] & 0x40 != 0 {
            // First physical slot: highest ordinal, defines the checksum
            self.units.clear();
            self.checksum = slot[13];
            self.next_seq = seq;
            self.valid = seq != 0;
        } else if !self.valid || seq == 0 || seq + 1 != self.next_seq || slot[13] != self.checksum {
            self.reset();
            return;
        } else {
            self.next_seq = seq;
        }
        if self.valid {
            let mut part = [0u16; UNITS_PER_SLOT];
            for (i, unit) in part.iter_mut().enumerate() {
                let off = match i {
                    0..=4 => 1 + i * 2,
                    5..=10 => 14 + (i - 5) * 2,
                    _ => 28 + (i - 11) * 2,
                };
                *unit = u16::from_le_bytes([slot[off], slot[off + 1]]);
            }
            self.units.splice(0..0, part.iter().copied());
        }
    }

    /// Close the chain against its short entry
    ///
    /// Returns the assembled name when the chain is complete and the
    /// checksum matches; otherwise `None`. Either way the collector is
    /// ready for the next entry.
    pub fn take(&mut self, short: &RawDirEntry) -> Option<String> {
        let complete = self.valid && self.next_seq == 1 && self.checksum == short.checksum();
        let units = core::mem::take(&mut self.units);
        self.reset();
        if !complete {
            return None;
        }
        let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        let mut name = String::with_capacity(end);
        for decoded in char::decode_utf16(units[..end].iter().copied()) {
            match decoded {
                Ok(c) => name.push(c),
                Err(_) => return None,
            }
        }
        (!name.is_empty()).then_some(name)
    }
}

/// Walk the 32-byte slots of one directory buffer
///
/// Appends listable entries to `out`, feeding long-name fragments through
/// `collector` (which survives across buffers so chains may span cluster
/// boundaries). Returns true when the end-of-directory marker was seen.
pub fn collect_slots(
    buf: &[u8],
    collector: &mut LongNameCollector,
    out: &mut Vec<NamedEntry>,
) -> bool {
    for slot in buf.chunks_exact(32) {
        match slot[0] {
            0x00 => return true,
            DELETED => {
                collector.reset();
                continue;
            }
            _ => {}
        }
        if slot[11] & attrs::LONG_NAME_MASK == attrs::LONG_NAME {
            collector.push(slot);
            continue;
        }
        let raw = RawDirEntry::parse(slot);
        let long = collector.take(&raw);
        if raw.is_volume_label() {
            continue;
        }
        let name = long.unwrap_or_else(|| raw.short_name());
        if name == "." || name == ".." {
            continue;
        }
        out.push(NamedEntry { name, raw });
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn short_slot(name: &[u8; 11], attributes: u8) -> Vec<u8> {
        let mut slot = vec![0u8; 32];
        slot[..11].copy_from_slice(name);
        slot[11] = attributes;
        slot
    }

    fn lfn_slots(long: &str, checksum: u8) -> Vec<u8> {
        let units: Vec<u16> = long.encode_utf16().collect();
        let count = (units.len() + UNITS_PER_SLOT - 1) / UNITS_PER_SLOT;
        let mut out = Vec::new();
        for seq in (1..=count).rev() {
            let mut slot = vec![0u8; 32];
            slot[0] = seq as u8 | if seq == count { 0x40 } else { 0 };
            slot[11] = attrs::LONG_NAME;
            slot[13] = checksum;
            let base = (seq - 1) * UNITS_PER_SLOT;
            for i in 0..UNITS_PER_SLOT {
                let unit = match (base + i).cmp(&units.len()) {
                    core::cmp::Ordering::Less => units[base + i],
                    core::cmp::Ordering::Equal => 0,
                    core::cmp::Ordering::Greater => 0xFFFF,
                };
                let off = match i {
                    0..=4 => 1 + i * 2,
                    5..=10 => 14 + (i - 5) * 2,
                    _ => 28 + (i - 11) * 2,
                };
                slot[off..off + 2].copy_from_slice(&unit.to_le_bytes());
            }
            out.extend_from_slice(&slot);
        }
        out
    }

    #[test]
    fn test_short_name_trims_and_substitutes() {
        let entry = RawDirEntry::parse(&short_slot(b"README  TXT", attrs::ARCHIVE));
        assert_eq!(entry.short_name(), "README.TXT");

        let bare = RawDirEntry::parse(&short_slot(b"DOCS       ", attrs::DIRECTORY));
        assert_eq!(bare.short_name(), "DOCS");

        let mut name = *b"XFILE   TXT";
        name[0] = 0x05;
        let kanji = RawDirEntry::parse(&short_slot(&name, attrs::ARCHIVE));
        assert_eq!(kanji.short_name().as_bytes()[0], 0xC3); // U+00E5 in UTF-8
    }

    #[test]
    fn test_long_name_assembles_across_slots() {
        let short = *b"LONGNA~1TXT";
        let long = "a rather long file name.txt"; // 27 units, 3 slots
        let mut buf = lfn_slots(long, short_checksum(&short));
        buf.extend_from_slice(&short_slot(&short, attrs::ARCHIVE));
        buf.resize(512, 0);

        let mut collector = LongNameCollector::new();
        let mut out = Vec::new();
        assert!(collect_slots(&buf, &mut collector, &mut out));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, long);
    }

    #[test]
    fn test_checksum_mismatch_falls_back_to_short_name() {
        let short = *b"LONGNA~1TXT";
        let mut buf = lfn_slots("mismatched.txt", short_checksum(&short).wrapping_add(1));
        buf.extend_from_slice(&short_slot(&short, attrs::ARCHIVE));
        buf.resize(512, 0);

        let mut collector = LongNameCollector::new();
        let mut out = Vec::new();
        collect_slots(&buf, &mut collector, &mut out);
        assert_eq!(out[0].name, "LONGNA~1.TXT");
    }

    #[test]
    fn test_deleted_slot_breaks_the_chain() {
        let short = *b"ORPHAN  TXT";
        let mut buf = lfn_slots("orphaned long name", short_checksum(&short));
        buf[32] = 0xE5; // delete the middle fragment
        buf.extend_from_slice(&short_slot(&short, attrs::ARCHIVE));
        buf.resize(512, 0);

        let mut collector = LongNameCollector::new();
        let mut out = Vec::new();
        collect_slots(&buf, &mut collector, &mut out);
        assert_eq!(out[0].name, "ORPHAN.TXT");
    }

    #[test]
    fn test_labels_dots_and_deleted_are_skipped() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&short_slot(b"MYVOLUME   ", attrs::VOLUME_ID));
        buf.extend_from_slice(&short_slot(b".          ", attrs::DIRECTORY));
        buf.extend_from_slice(&short_slot(b"..         ", attrs::DIRECTORY));
        let mut dead = short_slot(b"GONE    TXT", attrs::ARCHIVE);
        dead[0] = 0xE5;
        buf.extend_from_slice(&dead);
        buf.extend_from_slice(&short_slot(b"KEEP    TXT", attrs::ARCHIVE));
        buf.resize(512, 0);

        let mut collector = LongNameCollector::new();
        let mut out = Vec::new();
        assert!(collect_slots(&buf, &mut collector, &mut out));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "KEEP.TXT");
    }

    #[test]
    fn test_end_marker_stops_the_walk() {
        let mut buf = vec![0u8; 512];
        buf[32..64].copy_from_slice(&short_slot(b"AFTER   TXT", attrs::ARCHIVE));

        let mut collector = LongNameCollector::new();
        let mut out = Vec::new();
        assert!(collect_slots(&buf, &mut collector, &mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn test_timestamp_decode() {
        let mut slot = short_slot(b"STAMPED TXT", attrs::ARCHIVE);
        let date: u16 = (44 << 9) | (6 << 5) | 1; // 2024-06-01
        let time: u16 = (12 << 11) | (30 << 5) | 20; // 12:30:40
        slot[13] = 150;
        slot[14..16].copy_from_slice(&time.to_le_bytes());
        slot[16..18].copy_from_slice(&date.to_le_bytes());
        slot[18..20].copy_from_slice(&date.to_le_bytes());
        slot[22..24].copy_from_slice(&time.to_le_bytes());
        slot[24..26].copy_from_slice(&date.to_le_bytes());
        let entry = RawDirEntry::parse(&slot);

        let created = entry.created().unwrap();
        assert_eq!((created.second, created.centis), (41, 50));
        let modified = entry.modified().unwrap();
        assert_eq!((modified.year, modified.second, modified.centis), (2024, 40, 0));
        let accessed = entry.accessed().unwrap();
        assert_eq!((accessed.year, accessed.hour), (2024, 0));

        let blank = RawDirEntry::parse(&short_slot(b"BLANK   TXT", attrs::ARCHIVE));
        assert!(blank.created().is_none());
        assert!(blank.modified().is_none());
        assert!(blank.accessed().is_none());
    }
}
