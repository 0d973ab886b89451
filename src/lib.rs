//! Read-only filesystem access for USB mass-storage devices
//!
//! The crate ties the layers together behind one owned value,
//! [`DeviceSession`]: hardware attach/detach events and the
//! authorization verdict go in, and once a volume is mounted the
//! application reads it through `exists` / `list_dir` / `read_as_text`.
//!
//! Layering, bottom up:
//! - `umsfs-block`: the [`BlockDevice`] transport trait and the shared
//!   device wrapper
//! - `umsfs-vfs`: MBR partition scan, the format driver registry, and
//!   the read-only [`Filesystem`] / [`FileReader`] traits
//! - `umsfs-fat`: the FAT12/16/32 driver, registered by default
//!
//! The session is single-device by policy: one attached device, one
//! mounted volume, first usable partition. Everything is read-only;
//! nothing in the crate writes to the medium.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

use core::fmt;

mod session;

pub use session::{Authorizer, DeviceSession, SessionState, UsbDeviceHandle};

pub use umsfs_block::{
    share, BlockDevice, BlockGeometry, BlockRange, DeviceError, DeviceResult, RamDisk,
    SharedDevice,
};
pub use umsfs_fat::FatDriver;
pub use umsfs_vfs::{
    DirHandle, DriverRegistry, FileEntry, FileHandle, FileReader, FileType, Filesystem,
    FilesystemDriver, FsError, FsResult, Node, PartitionEntry, PartitionType, Timestamp,
    VolumeInfo,
};

/// Errors surfaced by [`DeviceSession`] operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// No device is attached, authorized, and mounted
    NotReady,
    /// The device itself failed
    Device(DeviceError),
    /// The partition table, format, or filesystem contents failed
    Fs(FsError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotReady => write!(f, "device not set up"),
            SessionError::Device(e) => write!(f, "device error: {}", e),
            SessionError::Fs(e) => write!(f, "filesystem error: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::NotReady => None,
            SessionError::Device(e) => Some(e),
            SessionError::Fs(e) => Some(e),
        }
    }
}

impl From<DeviceError> for SessionError {
    fn from(e: DeviceError) -> Self {
        SessionError::Device(e)
    }
}

impl From<FsError> for SessionError {
    fn from(e: FsError) -> Self {
        SessionError::Fs(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        assert_eq!(SessionError::NotReady.to_string(), "device not set up");
        assert_eq!(
            SessionError::Device(DeviceError::Busy).to_string(),
            "device error: device busy"
        );
        assert_eq!(
            SessionError::Fs(FsError::UnsupportedFormat).to_string(),
            "filesystem error: unsupported filesystem format"
        );
    }

    #[test]
    fn test_layer_errors_convert() {
        assert_eq!(
            SessionError::from(DeviceError::Unavailable),
            SessionError::Device(DeviceError::Unavailable)
        );
        assert_eq!(
            SessionError::from(FsError::NotFound),
            SessionError::Fs(FsError::NotFound)
        );
    }
}
