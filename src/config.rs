use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::SimulatedDeviceConfig;
use crate::camera::GrabOptions;
use crate::frame::PixelFormat;
use crate::property::PropertyValue;
use crate::roi::Roi;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CamctlConfig {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AcquisitionConfig {
    /// Frames per capture run (0 = continuous until interrupted)
    #[serde(default = "default_frame_count")]
    pub frame_count: u32,

    /// Maximum wait for a single frame
    #[serde(default = "default_grab_timeout_ms")]
    pub grab_timeout_ms: u64,

    /// How often a blocked grab checks for a close request
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl AcquisitionConfig {
    pub fn grab_options(&self) -> GrabOptions {
        GrabOptions {
            timeout: Duration::from_millis(self.grab_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

/// Which discovered device to open. Without either field the last one is used.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct SelectionConfig {
    /// Match on serial number
    #[serde(default)]
    pub serial: Option<String>,

    /// Position in the discovery list
    #[serde(default)]
    pub index: Option<usize>,
}

/// Settings applied to a camera right after it is opened
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct CameraConfig {
    /// Additional properties, written in order before anything else
    #[serde(default)]
    pub properties: Vec<PropertySetting>,

    #[serde(default)]
    pub pixel_format: Option<PixelFormat>,

    /// Exposure time in microseconds
    #[serde(default)]
    pub exposure_time: Option<f64>,

    /// Use a half-size window centred on the sensor
    #[serde(default)]
    pub centered_roi: bool,

    /// Explicit sensor window
    #[serde(default)]
    pub roi: Option<Roi>,

    /// Hardware or software trigger; free-run when unset
    #[serde(default)]
    pub trigger: Option<TriggerSettings>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PropertySetting {
    pub name: String,
    pub value: PropertyValue,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TriggerSettings {
    /// Trigger to configure (FrameStart, AcquisitionStart)
    #[serde(default = "default_trigger_selector")]
    pub selector: String,

    /// Signal source (Software, Line1, ...)
    #[serde(default = "default_trigger_source")]
    pub source: String,
}

impl TriggerSettings {
    pub fn line1() -> Self {
        Self {
            selector: default_trigger_selector(),
            source: default_trigger_source(),
        }
    }

    pub fn software() -> Self {
        Self {
            selector: default_trigger_selector(),
            source: "Software".to_string(),
        }
    }

    pub fn is_software(&self) -> bool {
        self.source == "Software"
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OutputConfig {
    /// Directory for saved frames
    #[serde(default = "default_output_directory")]
    pub directory: String,

    /// File name prefix for saved frames
    #[serde(default = "default_output_prefix")]
    pub prefix: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SimulatorConfig {
    #[serde(default = "default_simulated_devices")]
    pub devices: Vec<SimulatedDeviceConfig>,
}

impl CamctlConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("camctl.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("acquisition.frame_count", default_frame_count())?
            .set_default("acquisition.grab_timeout_ms", default_grab_timeout_ms())?
            .set_default("acquisition.poll_interval_ms", default_poll_interval_ms())?
            .set_default("output.directory", default_output_directory())?
            .set_default("output.prefix", default_output_prefix())?
            .add_source(File::with_name(&path_str).required(false))
            // CAMCTL_ACQUISITION__FRAME_COUNT=5 overrides acquisition.frame_count
            .add_source(
                Environment::with_prefix("CAMCTL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: CamctlConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.acquisition.grab_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Acquisition grab_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.acquisition.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Acquisition poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if let Some(roi) = &self.camera.roi {
            if self.camera.centered_roi {
                return Err(ConfigError::Message(
                    "Camera roi and centered_roi are mutually exclusive".to_string(),
                ));
            }
            if roi.width <= 0 || roi.height <= 0 || roi.offset_x < 0 || roi.offset_y < 0 {
                return Err(ConfigError::Message(format!(
                    "Camera roi {} must have positive size and non-negative offsets",
                    roi
                )));
            }
        }

        if let Some(exposure) = self.camera.exposure_time {
            if exposure <= 0.0 {
                return Err(ConfigError::Message(
                    "Camera exposure_time must be greater than 0".to_string(),
                ));
            }
        }

        if self.camera.properties.iter().any(|p| p.name.trim().is_empty()) {
            return Err(ConfigError::Message(
                "Camera property names must not be empty".to_string(),
            ));
        }

        if self.output.prefix.is_empty() {
            return Err(ConfigError::Message(
                "Output prefix must not be empty".to_string(),
            ));
        }

        let mut serials = HashSet::new();
        for device in &self.simulator.devices {
            if !serials.insert(device.serial.as_str()) {
                return Err(ConfigError::Message(format!(
                    "Simulated device serial {} is used more than once",
                    device.serial
                )));
            }
            if device.width_max <= 0 || device.height_max <= 0 {
                return Err(ConfigError::Message(format!(
                    "Simulated device {} must have a positive sensor size",
                    device.serial
                )));
            }
            if device.pixel_formats.is_empty() {
                return Err(ConfigError::Message(format!(
                    "Simulated device {} needs at least one pixel format",
                    device.serial
                )));
            }
        }

        Ok(())
    }

    /// Default configuration rendered as TOML
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }
}

impl Default for CamctlConfig {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionConfig::default(),
            selection: SelectionConfig::default(),
            camera: CameraConfig::default(),
            output: OutputConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            frame_count: default_frame_count(),
            grab_timeout_ms: default_grab_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            prefix: default_output_prefix(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            devices: default_simulated_devices(),
        }
    }
}

// Default value functions
fn default_frame_count() -> u32 {
    1
}
fn default_grab_timeout_ms() -> u64 {
    5000
}
fn default_poll_interval_ms() -> u64 {
    50
}

fn default_trigger_selector() -> String {
    "FrameStart".to_string()
}
fn default_trigger_source() -> String {
    "Line1".to_string()
}

fn default_output_directory() -> String {
    "./frames".to_string()
}
fn default_output_prefix() -> String {
    "frame".to_string()
}

fn default_simulated_devices() -> Vec<SimulatedDeviceConfig> {
    vec![SimulatedDeviceConfig::new("SIM0001")]
}
