//! Device session state machine
//!
//! One session owns at most one device. Hardware events drive the state
//! forward:
//!
//! ```text
//! NoDevice --on_attach--> AwaitingAuthorization --granted--> Mounting
//!     ^                          |                              |
//!     |<------denied------------/                              |
//!     |<------mount failure / on_detach-----------------------/|
//!     |                                                        v
//!     \<---------------------on_detach--------------------- Ready
//! ```
//!
//! `close()` runs the same teardown from any state and ends in the
//! terminal `Closed` state. Teardown order is fixed: unmount the
//! filesystem first, then close the device, so in-flight readers fail
//! with `NotMounted` or `Io` rather than touching a dangling transport.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, info, warn};
use umsfs_block::{share, BlockDevice, BlockRange, SharedDevice};
use umsfs_fat::FatDriver;
use umsfs_vfs::{
    partition, path, DriverRegistry, FileEntry, FsError, Filesystem, Node, VolumeInfo,
};

use crate::SessionError;

/// Where the session is in the attach/authorize/mount lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing attached
    NoDevice,
    /// A device is attached, waiting for the authorization verdict
    AwaitingAuthorization,
    /// Authorization granted, device open and mount in progress
    Mounting,
    /// A volume is mounted and the read operations are available
    Ready,
    /// Session closed by the application; terminal
    Closed,
}

/// An attached-but-not-yet-authorized device
///
/// Couples the identifier shown during authorization with the transport
/// handle. The device is not opened until authorization is granted.
pub struct UsbDeviceHandle {
    identifier: String,
    device: Box<dyn BlockDevice>,
}

impl UsbDeviceHandle {
    pub fn new(identifier: impl Into<String>, device: Box<dyn BlockDevice>) -> Self {
        UsbDeviceHandle {
            identifier: identifier.into(),
            device,
        }
    }

    /// Identifier presented to the authorization collaborator
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Asks the environment whether an attached device may be used
///
/// Fire-and-forget: the verdict comes back through
/// [`DeviceSession::on_authorization_result`].
pub trait Authorizer: Send {
    fn request_authorization(&mut self, device_id: &str);
}

/// The single-device access session
///
/// Methods take `&mut self`; the embedding application serializes
/// hardware events and read operations.
pub struct DeviceSession {
    state: SessionState,
    /// Device attached but not yet authorized
    pending: Option<UsbDeviceHandle>,
    /// Open device backing the mounted volume
    device: Option<SharedDevice>,
    filesystem: Option<Box<dyn Filesystem>>,
    registry: DriverRegistry,
    authorizer: Box<dyn Authorizer>,
    on_ready: Option<Box<dyn FnMut() + Send>>,
}

impl DeviceSession {
    /// Session with the default driver registry (FAT only)
    pub fn new(authorizer: Box<dyn Authorizer>) -> Self {
        let mut registry = DriverRegistry::new();
        registry.register(Box::new(FatDriver));
        Self::with_registry(authorizer, registry)
    }

    /// Session with a caller-composed driver registry
    pub fn with_registry(authorizer: Box<dyn Authorizer>, registry: DriverRegistry) -> Self {
        DeviceSession {
            state: SessionState::NoDevice,
            pending: None,
            device: None,
            filesystem: None,
            registry,
            authorizer,
            on_ready: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Facts about the mounted volume; `None` unless `Ready`
    pub fn volume_info(&self) -> Option<VolumeInfo> {
        if self.state == SessionState::Ready {
            self.filesystem.as_ref().map(|fs| fs.info())
        } else {
            None
        }
    }

    /// Store the callback fired on every transition into `Ready`
    pub fn register<F: FnMut() + Send + 'static>(&mut self, callback: F) {
        self.on_ready = Some(Box::new(callback));
    }

    /// A device was plugged in
    ///
    /// Only honored in `NoDevice`; the session is single-device, so an
    /// attach while another device is in play is logged and dropped.
    pub fn on_attach(&mut self, handle: UsbDeviceHandle) {
        if self.state != SessionState::NoDevice {
            warn!(
                "ignoring attach of '{}' while in {:?}",
                handle.identifier, self.state
            );
            return;
        }
        debug!(
            "device '{}' attached, requesting authorization",
            handle.identifier
        );
        self.state = SessionState::AwaitingAuthorization;
        self.authorizer.request_authorization(&handle.identifier);
        self.pending = Some(handle);
    }

    /// The authorization verdict arrived
    ///
    /// Denied access is an expected outcome, logged and answered with
    /// `Ok`. A granted device is opened and mounted; any failure on that
    /// path tears the session back down to `NoDevice` and is returned.
    pub fn on_authorization_result(&mut self, granted: bool) -> Result<(), SessionError> {
        if self.state != SessionState::AwaitingAuthorization {
            warn!("ignoring stale authorization result while in {:?}", self.state);
            return Ok(());
        }
        let handle = match self.pending.take() {
            Some(handle) => handle,
            None => {
                self.state = SessionState::NoDevice;
                return Ok(());
            }
        };
        if !granted {
            warn!("authorization denied for '{}'", handle.identifier);
            self.state = SessionState::NoDevice;
            return Ok(());
        }

        debug!("authorization granted for '{}'", handle.identifier);
        self.state = SessionState::Mounting;
        match self.mount_device(handle) {
            Ok(()) => {
                self.state = SessionState::Ready;
                if let Some(callback) = self.on_ready.as_mut() {
                    callback();
                }
                Ok(())
            }
            Err(e) => {
                warn!("mount failed: {}", e);
                self.release();
                self.state = SessionState::NoDevice;
                Err(e)
            }
        }
    }

    /// The device was unplugged
    ///
    /// Safe in any state; after `close()` the event is ignored.
    pub fn on_detach(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        debug!("device detached");
        self.release();
        self.state = SessionState::NoDevice;
    }

    /// Application-initiated teardown; idempotent and terminal
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        debug!("session closed");
        self.release();
        self.state = SessionState::Closed;
    }

    /// Whether `path` names an existing file or directory
    ///
    /// Absence (`NotFound`, or a file where a directory was needed) is
    /// `Ok(false)`; device and corruption failures propagate.
    pub fn exists(&mut self, path: &str) -> Result<bool, SessionError> {
        match self.resolve_path(path) {
            Ok(_) => Ok(true),
            Err(SessionError::Fs(FsError::NotFound))
            | Err(SessionError::Fs(FsError::NotADirectory)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// List the directory at `path`
    pub fn list_dir(&mut self, path: &str) -> Result<Vec<FileEntry>, SessionError> {
        let dir = match self.resolve_path(path)? {
            Node::Dir(dir) => dir,
            Node::File(_) => return Err(SessionError::Fs(FsError::NotADirectory)),
        };
        let fs = self.ready_fs()?;
        Ok(fs.list_children(&dir)?)
    }

    /// Read the file at `path` and decode it as UTF-8
    ///
    /// The whole file is accumulated before decoding, so multi-byte
    /// sequences spanning cluster boundaries are never split.
    pub fn read_as_text(&mut self, path: &str) -> Result<String, SessionError> {
        let file = match self.resolve_path(path)? {
            Node::File(file) => file,
            Node::Dir(_) => return Err(SessionError::Fs(FsError::IsADirectory)),
        };
        let fs = self.ready_fs()?;
        let mut reader = fs.open_for_read(&file)?;
        let mut bytes = Vec::with_capacity(file.size as usize);
        reader.read_to_end(&mut bytes)?;
        String::from_utf8(bytes).map_err(|_| {
            warn!("file '{}' is not valid UTF-8", path);
            SessionError::Fs(FsError::Decode)
        })
    }

    fn ready_fs(&mut self) -> Result<&mut (dyn Filesystem + 'static), SessionError> {
        if self.state != SessionState::Ready {
            return Err(SessionError::NotReady);
        }
        self.filesystem
            .as_deref_mut()
            .ok_or(SessionError::NotReady)
    }

    fn resolve_path(&mut self, target: &str) -> Result<Node, SessionError> {
        let components = path::components(path::strip_root(target));
        let fs = self.ready_fs()?;
        let root = fs.root();
        Ok(fs.resolve(&root, &components)?)
    }

    fn mount_device(&mut self, handle: UsbDeviceHandle) -> Result<(), SessionError> {
        let mut device = handle.device;
        device.open()?;
        let shared = share(device);
        self.device = Some(Arc::clone(&shared));

        let entries = partition::scan(&shared)?;
        let range = match partition::first_usable(&entries) {
            Some(entry) => {
                debug!(
                    "mounting partition {} ({:?}, {} blocks at {})",
                    entry.index, entry.kind, entry.range.count, entry.range.start
                );
                entry.range
            }
            None => {
                debug!("no usable partition entry, treating the whole device as one volume");
                BlockRange::whole_device(shared.lock().geometry())
            }
        };

        let filesystem = self.registry.mount_first(&shared, range)?;
        info!(
            "device '{}' ready: {} volume",
            handle.identifier,
            filesystem.format()
        );
        self.filesystem = Some(filesystem);
        Ok(())
    }

    // Filesystem before device: readers racing a detach must see the
    // unmounted flag or a closed device, never a half-torn-down volume.
    fn release(&mut self) {
        if let Some(mut filesystem) = self.filesystem.take() {
            filesystem.unmount();
        }
        if let Some(device) = self.device.take() {
            device.lock().close();
        }
        self.pending = None;
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.release();
    }
}
