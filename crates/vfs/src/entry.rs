//! Directory entries and volume handles

use alloc::string::String;

use crate::timestamp::Timestamp;

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
}

/// One element of a directory listing
///
/// Materialized per call and owned by the caller; holds no reference
/// back into the filesystem it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Name as stored on disk
    pub name: String,
    /// Full path, session-root-relative
    pub path: String,
    /// File or directory
    pub kind: FileType,
    /// Size in bytes; `None` for directories
    pub size: Option<u64>,
    /// Creation stamp, where the format stores one
    pub created: Option<Timestamp>,
    /// Last-modification stamp
    pub modified: Option<Timestamp>,
    /// Last-access stamp (FAT stores these at date resolution)
    pub accessed: Option<Timestamp>,
}

impl FileEntry {
    /// Whether this entry is a directory
    pub fn is_dir(&self) -> bool {
        self.kind == FileType::Directory
    }
}

/// Handle to a resolved directory
///
/// `token` is the volume-specific location of the directory (for FAT,
/// its first cluster; 0 names the fixed FAT12/16 root region). `path`
/// accumulates the session-root-relative path during resolution and
/// seeds the paths of listed children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirHandle {
    pub token: u64,
    pub path: String,
}

/// Handle to a resolved file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle {
    /// Volume-specific location token (FAT: first cluster, 0 when empty)
    pub token: u64,
    /// File size in bytes
    pub size: u64,
}

/// Result of resolving a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Dir(DirHandle),
    File(FileHandle),
}

impl Node {
    /// Whether the resolved node is a directory
    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }
}

/// Identity and size summary of a mounted volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    /// Format identifier, e.g. "FAT16"
    pub format: &'static str,
    /// Volume label if the format stores one
    pub label: Option<String>,
    /// Allocation-unit size in bytes
    pub cluster_size: u32,
    /// Total data capacity in bytes
    pub total_bytes: u64,
}
