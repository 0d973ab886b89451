//! Filesystem error types

use core::fmt;

use umsfs_block::DeviceError;

/// Result type alias for filesystem operations
pub type FsResult<T> = Result<T, FsError>;

/// Errors surfaced by the partition scanner, format drivers, and mounted
/// volumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Block read failed, or the device disappeared mid-operation
    Io,
    /// Partition table signature present but entries are inconsistent
    CorruptTable,
    /// No registered driver recognizes the on-disk format
    UnsupportedFormat,
    /// On-disk structures fail consistency checks (bad geometry, broken
    /// allocation chain, out-of-range pointers)
    Corrupted,
    /// Path component not found
    NotFound,
    /// Intermediate path component is a file
    NotADirectory,
    /// A directory where a file was expected
    IsADirectory,
    /// Volume is no longer mounted
    NotMounted,
    /// File bytes are not valid text in the fixed encoding
    Decode,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::Io => write!(f, "I/O error"),
            FsError::CorruptTable => write!(f, "corrupt partition table"),
            FsError::UnsupportedFormat => write!(f, "unsupported filesystem format"),
            FsError::Corrupted => write!(f, "corrupt filesystem"),
            FsError::NotFound => write!(f, "not found"),
            FsError::NotADirectory => write!(f, "not a directory"),
            FsError::IsADirectory => write!(f, "is a directory"),
            FsError::NotMounted => write!(f, "not mounted"),
            FsError::Decode => write!(f, "invalid text encoding"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FsError {}

// Device failures reaching the filesystem layer have already passed the
// volume's own bounds checks, so whatever remains is an I/O fault.
impl From<DeviceError> for FsError {
    fn from(_: DeviceError) -> Self {
        FsError::Io
    }
}
