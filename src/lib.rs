pub mod backend;
pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod frame;
pub mod property;
pub mod roi;
pub mod sink;

pub use backend::{CameraBackend, DeviceDescriptor, DeviceSession, SimulatedBackend, SimulatedDeviceConfig};
pub use camera::{
    discover, select_device, Acquisition, CameraHandle, CameraHandleBuilder, CameraState,
    CloseSignal, GrabOptions,
};
pub use capture::{capture_all, run_capture, run_software_triggered, CameraCapture, CaptureSummary};
pub use config::CamctlConfig;
pub use error::{CamctlError, CameraError, CameraResult, Result};
pub use frame::{Frame, PixelFormat};
pub use property::{Access, Property, PropertyEntry, PropertyInfo, PropertyKind, PropertyValue, Range};
pub use roi::{Axis, Roi};
pub use sink::{ChannelSink, CollectingSink, FrameLogSink, FrameSink};

#[cfg(feature = "image_output")]
pub use sink::ImageFileSink;
