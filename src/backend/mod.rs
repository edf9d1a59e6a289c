//! Seam between the camera façade and a vendor SDK.
//!
//! A backend enumerates devices and opens sessions; a session is the
//! exclusive, blocking connection to one device.

mod simulated;

pub use simulated::{SimulatedBackend, SimulatedDeviceConfig};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::CameraResult;
use crate::frame::Frame;
use crate::property::{PropertyInfo, PropertyValue};

/// Identity of a discovered device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Backend-specific identifier, opaque to callers
    pub id: String,
    pub vendor: String,
    pub model: String,
    pub serial: String,
    pub user_defined_name: Option<String>,
    pub transport: String,
}

impl DeviceDescriptor {
    pub fn full_name(&self) -> String {
        match &self.user_defined_name {
            Some(name) => format!("{} {} ({}) \"{}\"", self.vendor, self.model, self.serial, name),
            None => format!("{} {} ({})", self.vendor, self.model, self.serial),
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.full_name(), self.transport)
    }
}

/// Device discovery and connection, as provided by a vendor SDK
pub trait CameraBackend: Send + Sync {
    fn name(&self) -> &str;

    /// All devices currently attached. May be empty.
    fn enumerate(&self) -> CameraResult<Vec<DeviceDescriptor>>;

    /// Open an exclusive session to `descriptor`.
    ///
    /// Fails with `DeviceBusy` when another session holds the device and
    /// with `Connection` when it cannot be reached.
    fn connect(&self, descriptor: &DeviceDescriptor) -> CameraResult<Box<dyn DeviceSession>>;
}

/// Exclusive connection to one device
pub trait DeviceSession: Send {
    fn descriptor(&self) -> &DeviceDescriptor;

    fn property_names(&self) -> Vec<String>;

    /// Metadata for `name`, with limits valid for the current configuration
    fn property_info(&self, name: &str) -> CameraResult<PropertyInfo>;

    fn read(&self, name: &str) -> CameraResult<PropertyValue>;

    /// Apply a value. A rejected write must leave the previous value in place.
    fn write(&mut self, name: &str, value: &PropertyValue) -> CameraResult<()>;

    fn execute(&mut self, command: &str) -> CameraResult<()>;

    fn start_stream(&mut self) -> CameraResult<()>;

    /// Wait up to `timeout` for the next frame. `Ok(None)` means nothing arrived.
    fn retrieve(&mut self, timeout: Duration) -> CameraResult<Option<Frame>>;

    fn stop_stream(&mut self) -> CameraResult<()>;

    /// Free device buffers and give up the claim on the device
    fn release(&mut self);
}
