//! Shared fixtures for the end-to-end session tests
//!
//! A compact FAT16 image builder (long names included, so the fixtures
//! can carry lowercase file names), an MBR wrapper to exercise the
//! partition scan, a scripted authorizer, and a fail-injecting device
//! wrapper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use umsfs::{
    Authorizer, BlockDevice, BlockGeometry, DeviceError, DeviceResult, RamDisk, UsbDeviceHandle,
};

const SS: usize = 512;
const RESERVED: usize = 1;
const ROOT_ENTRIES: usize = 64;
const CLUSTERS: usize = 4200; // enough data clusters to classify as FAT16

const ARCHIVE: u8 = 0x20;
const DIRECTORY: u8 = 0x10;
const LONG_NAME: u8 = 0x0F;

/// Builds a FAT16 volume image one allocation at a time
pub struct Fat16Builder {
    fat: Vec<u32>,
    data: Vec<u8>,
    root: Vec<u8>,
    next_free: u32,
}

impl Fat16Builder {
    pub fn new() -> Self {
        let mut fat = vec![0u32; CLUSTERS + 2];
        fat[0] = 0xFFF8;
        fat[1] = 0xFFFF;
        Fat16Builder {
            fat,
            data: vec![0u8; CLUSTERS * SS],
            root: vec![0u8; ROOT_ENTRIES * 32],
            next_free: 2,
        }
    }

    /// Allocate a cluster chain for `content`; empty content gets none
    pub fn alloc_chain(&mut self, content: &[u8]) -> u32 {
        if content.is_empty() {
            return 0;
        }
        self.alloc_clusters(content, (content.len() + SS - 1) / SS)
    }

    /// Allocate a directory cluster chain (at least one cluster)
    pub fn add_dir(&mut self, content: &[u8]) -> u32 {
        self.alloc_clusters(content, ((content.len() + SS - 1) / SS).max(1))
    }

    fn alloc_clusters(&mut self, content: &[u8], clusters: usize) -> u32 {
        let first = self.next_free;
        for i in 0..clusters {
            let c = self.next_free as usize;
            assert!(c + 1 < self.fat.len(), "fixture image out of clusters");
            let chunk_start = i * SS;
            if chunk_start < content.len() {
                let chunk = &content[chunk_start..content.len().min(chunk_start + SS)];
                let off = (c - 2) * SS;
                self.data[off..off + chunk.len()].copy_from_slice(chunk);
            }
            self.fat[c] = if i + 1 == clusters { 0xFFFF } else { self.next_free + 1 };
            self.next_free += 1;
        }
        first
    }

    pub fn set_root(&mut self, content: &[u8]) {
        assert!(content.len() <= self.root.len(), "root fixture too large");
        self.root[..content.len()].copy_from_slice(content);
    }

    fn fat_sectors(&self) -> usize {
        (self.fat.len() * 2 + SS - 1) / SS
    }

    fn root_sectors(&self) -> usize {
        ROOT_ENTRIES * 32 / SS
    }

    pub fn total_sectors(&self) -> usize {
        RESERVED + self.fat_sectors() + self.root_sectors() + CLUSTERS
    }

    /// Serialize the volume image, boot sector first
    pub fn build(&self) -> Vec<u8> {
        let total = self.total_sectors();
        let mut image = vec![0u8; total * SS];

        image[11..13].copy_from_slice(&(SS as u16).to_le_bytes());
        image[13] = 1; // sectors per cluster
        image[14..16].copy_from_slice(&(RESERVED as u16).to_le_bytes());
        image[16] = 1; // one FAT
        image[17..19].copy_from_slice(&(ROOT_ENTRIES as u16).to_le_bytes());
        image[19..21].copy_from_slice(&(total as u16).to_le_bytes());
        image[21] = 0xF8;
        image[22..24].copy_from_slice(&(self.fat_sectors() as u16).to_le_bytes());
        image[43..54].copy_from_slice(b"DEMOSTICK  ");
        image[54..62].copy_from_slice(b"FAT16   ");
        image[510] = 0x55;
        image[511] = 0xAA;

        let fat_off = RESERVED * SS;
        for (i, &v) in self.fat.iter().enumerate() {
            image[fat_off + i * 2..fat_off + i * 2 + 2].copy_from_slice(&(v as u16).to_le_bytes());
        }

        let root_off = (RESERVED + self.fat_sectors()) * SS;
        image[root_off..root_off + self.root.len()].copy_from_slice(&self.root);

        let data_off = root_off + self.root_sectors() * SS;
        image[data_off..data_off + self.data.len()].copy_from_slice(&self.data);

        image
    }
}

fn name83(name: &str) -> [u8; 11] {
    let mut out = [b' '; 11];
    let (base, ext) = match name.rfind('.') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => (name, ""),
    };
    for (i, b) in base.bytes().take(8).enumerate() {
        out[i] = b.to_ascii_uppercase();
    }
    for (i, b) in ext.bytes().take(3).enumerate() {
        out[8 + i] = b.to_ascii_uppercase();
    }
    out
}

fn short_checksum(name: &[u8; 11]) -> u8 {
    name.iter()
        .fold(0u8, |sum, &b| ((sum & 1) << 7).wrapping_add(sum >> 1).wrapping_add(b))
}

fn slot(name: [u8; 11], attributes: u8, cluster: u32, size: u32) -> Vec<u8> {
    let mut s = vec![0u8; 32];
    s[..11].copy_from_slice(&name);
    s[11] = attributes;
    s[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
    s[28..32].copy_from_slice(&size.to_le_bytes());
    s
}

/// Directory slots for a long-named file: fragments plus the 8.3 entry
pub fn lfn_file(long: &str, short: &str, cluster: u32, size: u32) -> Vec<u8> {
    lfn_entry(long, short, ARCHIVE, cluster, size)
}

/// Directory slots for a long-named subdirectory
pub fn lfn_dir(long: &str, short: &str, cluster: u32) -> Vec<u8> {
    lfn_entry(long, short, DIRECTORY, cluster, 0)
}

fn lfn_entry(long: &str, short: &str, attributes: u8, cluster: u32, size: u32) -> Vec<u8> {
    let short83 = name83(short);
    let sum = short_checksum(&short83);
    let units: Vec<u16> = long.encode_utf16().collect();
    let count = (units.len() + 12) / 13;
    let mut out = Vec::new();
    for seq in (1..=count).rev() {
        let mut s = vec![0u8; 32];
        s[0] = seq as u8 | if seq == count { 0x40 } else { 0 };
        s[11] = LONG_NAME;
        s[13] = sum;
        let base = (seq - 1) * 13;
        for i in 0..13 {
            let unit = match (base + i).cmp(&units.len()) {
                std::cmp::Ordering::Less => units[base + i],
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 0xFFFF,
            };
            let off = match i {
                0..=4 => 1 + i * 2,
                5..=10 => 14 + (i - 5) * 2,
                _ => 28 + (i - 11) * 2,
            };
            s[off..off + 2].copy_from_slice(&unit.to_le_bytes());
        }
        out.extend_from_slice(&s);
    }
    out.extend_from_slice(&slot(short83, attributes, cluster, size));
    out
}

/// The standard fixture volume:
/// `/wide.txt`, `/bad.bin`, and `/docs/{a.txt, sub/}`
pub fn sample_volume() -> Vec<u8> {
    let mut b = Fat16Builder::new();

    let a_content: Vec<u8> = (0..100u8).collect();
    let a = b.alloc_chain(&a_content);
    let sub = b.add_dir(&[]);

    let mut docs_content = lfn_file("a.txt", "A.TXT", a, 100);
    docs_content.extend_from_slice(&lfn_dir("sub", "SUB", sub));
    let docs = b.add_dir(&docs_content);

    // two-byte UTF-8 sequence straddling the cluster boundary at 512
    let mut wide = vec![b'a'; 511];
    wide.extend_from_slice("é!".as_bytes());
    let wide_cluster = b.alloc_chain(&wide);

    let bad = b.alloc_chain(&[b'h', 0xFF, 0x01]);

    let mut root = lfn_dir("docs", "DOCS", docs);
    root.extend_from_slice(&lfn_file("wide.txt", "WIDE.TXT", wide_cluster, wide.len() as u32));
    root.extend_from_slice(&lfn_file("bad.bin", "BAD.BIN", bad, 3));
    b.set_root(&root);
    b.build()
}

/// Wrap a volume image behind an MBR with one FAT16 partition
pub fn partitioned_image(volume: &[u8], start_block: u64) -> Vec<u8> {
    let volume_blocks = volume.len() / SS;
    let mut image = vec![0u8; (start_block as usize + volume_blocks) * SS];
    image[446 + 4] = 0x06;
    image[446 + 8..446 + 12].copy_from_slice(&(start_block as u32).to_le_bytes());
    image[446 + 12..446 + 16].copy_from_slice(&(volume_blocks as u32).to_le_bytes());
    image[510] = 0x55;
    image[511] = 0xAA;
    let off = start_block as usize * SS;
    image[off..off + volume.len()].copy_from_slice(volume);
    image
}

/// Records every identifier it is asked to authorize
pub struct ScriptedAuthorizer {
    requests: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAuthorizer {
    pub fn new() -> (Box<Self>, Arc<Mutex<Vec<String>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        (
            Box::new(ScriptedAuthorizer {
                requests: Arc::clone(&requests),
            }),
            requests,
        )
    }
}

impl Authorizer for ScriptedAuthorizer {
    fn request_authorization(&mut self, device_id: &str) {
        self.requests.lock().unwrap().push(device_id.to_string());
    }
}

/// RamDisk wrapper whose reads can be made to fail on demand
pub struct FlakyDisk {
    inner: RamDisk,
    failing: Arc<AtomicBool>,
}

impl FlakyDisk {
    pub fn new(image: Vec<u8>) -> (Self, Arc<AtomicBool>) {
        let failing = Arc::new(AtomicBool::new(false));
        (
            FlakyDisk {
                inner: RamDisk::from_image(SS as u32, image),
                failing: Arc::clone(&failing),
            },
            failing,
        )
    }
}

impl BlockDevice for FlakyDisk {
    fn geometry(&self) -> BlockGeometry {
        self.inner.geometry()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn open(&mut self) -> DeviceResult<()> {
        self.inner.open()
    }

    fn read_blocks(&mut self, start: u64, buffer: &mut [u8]) -> DeviceResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeviceError::Io);
        }
        self.inner.read_blocks(start, buffer)
    }

    fn close(&mut self) {
        self.inner.close()
    }
}

/// Handle over a RamDisk holding `image`
pub fn image_handle(identifier: &str, image: Vec<u8>) -> UsbDeviceHandle {
    UsbDeviceHandle::new(identifier, Box::new(RamDisk::from_image(SS as u32, image)))
}

/// Handle over a blank, unformatted RamDisk
pub fn blank_handle(identifier: &str) -> UsbDeviceHandle {
    UsbDeviceHandle::new(identifier, Box::new(RamDisk::new(SS as u32, 256)))
}
