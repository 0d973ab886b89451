//! Format driver registry
//!
//! Drivers are probed in registration order and the first one that
//! recognizes a volume mounts it. Probing must be cheap and must not
//! write to the device; a driver that cannot tell quickly should say no
//! and let a later driver claim the volume.

use alloc::boxed::Box;
use alloc::vec::Vec;

use log::{debug, info};
use umsfs_block::{BlockRange, SharedDevice};

use crate::error::{FsError, FsResult};
use crate::Filesystem;

/// A mountable filesystem format
pub trait FilesystemDriver: Send + Sync {
    /// Short format name for logs ("fat", "ext2", ...)
    fn name(&self) -> &'static str;

    /// Cheaply decide whether the volume looks like this format
    ///
    /// Reads at most a few blocks and never mutates the device. `Ok(false)`
    /// means "not mine"; errors mean the device itself failed.
    fn probe(&self, device: &SharedDevice, range: BlockRange) -> FsResult<bool>;

    /// Mount the volume
    ///
    /// Only called after `probe` returned true. Structural problems found
    /// during the deeper consistency pass surface as `FsError::Corrupted`.
    fn mount(&self, device: &SharedDevice, range: BlockRange) -> FsResult<Box<dyn Filesystem>>;
}

/// Ordered collection of format drivers
pub struct DriverRegistry {
    drivers: Vec<Box<dyn FilesystemDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        DriverRegistry {
            drivers: Vec::new(),
        }
    }

    /// Append a driver; earlier registrations probe first
    pub fn register(&mut self, driver: Box<dyn FilesystemDriver>) {
        debug!("registered filesystem driver '{}'", driver.name());
        self.drivers.push(driver);
    }

    /// Mount the volume with the first driver whose probe succeeds
    ///
    /// A driver that recognizes the volume owns the outcome: its mount
    /// errors are returned as-is rather than trying later drivers. When
    /// no driver recognizes the volume the result is `UnsupportedFormat`.
    pub fn mount_first(
        &self,
        device: &SharedDevice,
        range: BlockRange,
    ) -> FsResult<Box<dyn Filesystem>> {
        for driver in &self.drivers {
            if driver.probe(device, range)? {
                info!("mounting volume as '{}'", driver.name());
                return driver.mount(device, range);
            }
            debug!("driver '{}' declined the volume", driver.name());
        }
        Err(FsError::UnsupportedFormat)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
