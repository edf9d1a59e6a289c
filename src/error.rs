use std::time::Duration;
use thiserror::Error;

use crate::roi::Axis;

/// Errors surfaced by camera discovery, property access and acquisition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("No camera device found")]
    NoDeviceFound,

    #[error("Device {device} is already in use")]
    DeviceBusy { device: String },

    #[error("Connection to device {device} failed: {details}")]
    Connection { device: String, details: String },

    #[error("Property {name} is not readable: {details}")]
    PropertyUnreadable { name: String, details: String },

    #[error("Invalid value for property {name}: {details}")]
    InvalidValue { name: String, details: String },

    #[error("Failed to write property {name}: {details}")]
    PropertyWrite { name: String, details: String },

    #[error("Invalid ROI on {axis} axis: offset {offset} + extent {extent} exceeds maximum {max}")]
    InvalidRoi {
        axis: Axis,
        offset: i64,
        extent: i64,
        max: i64,
    },

    #[error("No frame received within {timeout:?}")]
    GrabTimeout { timeout: Duration },

    #[error("Camera handle is closed")]
    Closed,
}

impl CameraError {
    pub fn unreadable<N: Into<String>, D: Into<String>>(name: N, details: D) -> Self {
        Self::PropertyUnreadable {
            name: name.into(),
            details: details.into(),
        }
    }

    pub fn invalid_value<N: Into<String>, D: Into<String>>(name: N, details: D) -> Self {
        Self::InvalidValue {
            name: name.into(),
            details: details.into(),
        }
    }

    pub fn write<N: Into<String>, D: Into<String>>(name: N, details: D) -> Self {
        Self::PropertyWrite {
            name: name.into(),
            details: details.into(),
        }
    }

    pub fn connection<N: Into<String>, D: Into<String>>(device: N, details: D) -> Self {
        Self::Connection {
            device: device.into(),
            details: details.into(),
        }
    }
}

pub type CameraResult<T> = std::result::Result<T, CameraError>;

#[derive(Error, Debug)]
pub enum CamctlError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[cfg(feature = "image_output")]
    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Frame sink error: {message}")]
    Sink { message: String },

    #[error("System error: {message}")]
    System { message: String },
}

impl CamctlError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn sink<S: Into<String>>(message: S) -> Self {
        Self::Sink {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CamctlError>;
