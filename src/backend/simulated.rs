use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, trace};

use super::{CameraBackend, DeviceDescriptor, DeviceSession};
use crate::error::{CameraError, CameraResult};
use crate::frame::{Frame, PixelFormat};
use crate::property::{Access, Property, PropertyInfo, PropertyValue};

const EXPOSURE_MIN_US: f64 = 20.0;
const EXPOSURE_MAX_US: f64 = 10_000_000.0;
const GAIN_MAX_DB: f64 = 24.0;
const TRIGGER_SELECTORS: [&str; 2] = ["FrameStart", "AcquisitionStart"];
const TRIGGER_SOURCES: [&str; 3] = ["Software", "Line1", "Line2"];
const ON_OFF: [&str; 2] = ["Off", "On"];

/// Description of one simulated camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedDeviceConfig {
    pub serial: String,

    #[serde(default = "default_vendor")]
    pub vendor: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub user_defined_name: Option<String>,

    /// Sensor width in pixels
    #[serde(default = "default_width_max")]
    pub width_max: i64,

    /// Sensor height in pixels
    #[serde(default = "default_height_max")]
    pub height_max: i64,

    /// Step for offsets and extents
    #[serde(default = "default_roi_increment")]
    pub roi_increment: i64,

    #[serde(default = "default_pixel_formats")]
    pub pixel_formats: Vec<PixelFormat>,

    /// Free-run frame period
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Period of pulses on the trigger lines; no pulses when unset
    #[serde(default)]
    pub line_trigger_interval_ms: Option<u64>,

    /// Refuse connections
    #[serde(default)]
    pub unreachable: bool,

    /// Properties whose reads are denied
    #[serde(default)]
    pub unreadable: Vec<String>,
}

impl SimulatedDeviceConfig {
    pub fn new<S: Into<String>>(serial: S) -> Self {
        Self {
            serial: serial.into(),
            vendor: default_vendor(),
            model: default_model(),
            user_defined_name: None,
            width_max: default_width_max(),
            height_max: default_height_max(),
            roi_increment: default_roi_increment(),
            pixel_formats: default_pixel_formats(),
            frame_interval_ms: default_frame_interval_ms(),
            line_trigger_interval_ms: None,
            unreachable: false,
            unreadable: Vec::new(),
        }
    }

    pub fn sensor(mut self, width_max: i64, height_max: i64) -> Self {
        self.width_max = width_max;
        self.height_max = height_max;
        self
    }

    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn line_trigger_interval(mut self, interval: Duration) -> Self {
        self.line_trigger_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn unreadable<S: Into<String>>(mut self, name: S) -> Self {
        self.unreadable.push(name.into());
        self
    }

    fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            id: format!("sim://{}", self.serial),
            vendor: self.vendor.clone(),
            model: self.model.clone(),
            serial: self.serial.clone(),
            user_defined_name: self.user_defined_name.clone(),
            transport: "Simulated".to_string(),
        }
    }
}

pub(crate) fn default_vendor() -> String {
    "Simulated".to_string()
}
pub(crate) fn default_model() -> String {
    "SIM-4096".to_string()
}
pub(crate) fn default_width_max() -> i64 {
    4096
}
pub(crate) fn default_height_max() -> i64 {
    3000
}
pub(crate) fn default_roi_increment() -> i64 {
    1
}
pub(crate) fn default_pixel_formats() -> Vec<PixelFormat> {
    vec![PixelFormat::Mono8, PixelFormat::Mono12]
}
pub(crate) fn default_frame_interval_ms() -> u64 {
    10
}

/// Settings a device keeps between sessions
#[derive(Debug, Clone)]
struct DeviceState {
    width: i64,
    height: i64,
    offset_x: i64,
    offset_y: i64,
    reverse_x: bool,
    exposure_time: f64,
    gain: f64,
    pixel_format: PixelFormat,
    trigger_selector: String,
    trigger_mode: String,
    trigger_source: String,
    throughput_limit_mode: String,
}

type WriteLog = Arc<Mutex<Vec<(String, PropertyValue)>>>;

impl DeviceState {
    fn new(config: &SimulatedDeviceConfig) -> Self {
        Self {
            width: config.width_max,
            height: config.height_max,
            offset_x: 0,
            offset_y: 0,
            reverse_x: false,
            exposure_time: 5000.0,
            gain: 0.0,
            pixel_format: config
                .pixel_formats
                .first()
                .copied()
                .unwrap_or(PixelFormat::Mono8),
            trigger_selector: TRIGGER_SELECTORS[0].to_string(),
            trigger_mode: "Off".to_string(),
            trigger_source: "Software".to_string(),
            throughput_limit_mode: "On".to_string(),
        }
    }

    fn payload_size(&self) -> i64 {
        self.width * self.height * self.pixel_format.bytes_per_pixel() as i64
    }

    fn triggered(&self) -> bool {
        self.trigger_mode == "On"
    }
}

/// In-process backend that behaves like a GenICam camera
pub struct SimulatedBackend {
    devices: Vec<SimulatedDeviceConfig>,
    states: HashMap<String, Arc<Mutex<DeviceState>>>,
    write_logs: HashMap<String, WriteLog>,
    claims: Arc<Mutex<HashSet<String>>>,
}

impl SimulatedBackend {
    pub fn new(devices: Vec<SimulatedDeviceConfig>) -> Self {
        let states = devices
            .iter()
            .map(|device| {
                (
                    device.serial.clone(),
                    Arc::new(Mutex::new(DeviceState::new(device))),
                )
            })
            .collect();
        let write_logs = devices
            .iter()
            .map(|device| (device.serial.clone(), WriteLog::default()))
            .collect();

        info!("Simulated backend created with {} device(s)", devices.len());

        Self {
            devices,
            states,
            write_logs,
            claims: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Writes the device accepted, in order
    pub fn write_log(&self, serial: &str) -> Vec<(String, PropertyValue)> {
        self.write_logs
            .get(serial)
            .map(|log| log.lock().clone())
            .unwrap_or_default()
    }

    pub fn clear_write_log(&self, serial: &str) {
        if let Some(log) = self.write_logs.get(serial) {
            log.lock().clear();
        }
    }

    pub fn is_claimed(&self, serial: &str) -> bool {
        self.claims.lock().contains(serial)
    }
}

impl CameraBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn enumerate(&self) -> CameraResult<Vec<DeviceDescriptor>> {
        Ok(self.devices.iter().map(|d| d.descriptor()).collect())
    }

    fn connect(&self, descriptor: &DeviceDescriptor) -> CameraResult<Box<dyn DeviceSession>> {
        let config = self
            .devices
            .iter()
            .find(|d| d.descriptor().id == descriptor.id)
            .ok_or_else(|| CameraError::connection(&descriptor.id, "device not attached"))?;

        if config.unreachable {
            return Err(CameraError::connection(&descriptor.id, "device did not respond"));
        }

        let state = self
            .states
            .get(&config.serial)
            .cloned()
            .ok_or_else(|| CameraError::connection(&descriptor.id, "device state missing"))?;
        let write_log = self.write_logs.get(&config.serial).cloned().unwrap_or_default();

        {
            let mut claims = self.claims.lock();
            if !claims.insert(config.serial.clone()) {
                return Err(CameraError::DeviceBusy {
                    device: descriptor.id.clone(),
                });
            }
        }

        debug!("Simulated device {} claimed", config.serial);

        Ok(Box::new(SimulatedSession {
            descriptor: config.descriptor(),
            config: config.clone(),
            state,
            write_log,
            claims: Arc::clone(&self.claims),
            stream: None,
            released: false,
        }))
    }
}

struct StreamState {
    next_due: Instant,
    pending_triggers: u32,
    frame_id: u64,
}

struct SimulatedSession {
    descriptor: DeviceDescriptor,
    config: SimulatedDeviceConfig,
    state: Arc<Mutex<DeviceState>>,
    write_log: WriteLog,
    claims: Arc<Mutex<HashSet<String>>>,
    stream: Option<StreamState>,
    released: bool,
}

impl SimulatedSession {
    const PROPERTY_NAMES: [&'static str; 22] = [
        "DeviceVendorName",
        "DeviceModelName",
        "DeviceSerialNumber",
        "WidthMax",
        "HeightMax",
        "Width",
        "Height",
        "OffsetX",
        "OffsetY",
        "ReverseX",
        "PixelFormat",
        "PixelSize",
        "PayloadSize",
        "ExposureTime",
        "Gain",
        "TriggerSelector",
        "TriggerMode",
        "TriggerSource",
        "TriggerSoftware",
        "DeviceLinkThroughputLimitMode",
        "DeviceTemperature",
        "AcquisitionFrameRate",
    ];

    fn base_info(&self, name: &str, state: &DeviceState) -> Option<PropertyInfo> {
        let inc = self.config.roi_increment.max(1);
        let frame_rate = 1000.0 / self.config.frame_interval_ms.max(1) as f64;

        let info = match Property::from(name) {
            Property::DeviceVendorName => PropertyInfo::string(name, "Name of the device manufacturer").read_only(),
            Property::DeviceModelName => PropertyInfo::string(name, "Model name of the device").read_only(),
            Property::DeviceSerialNumber => PropertyInfo::string(name, "Serial number of the device").read_only(),
            Property::WidthMax => {
                PropertyInfo::integer(name, "Maximum width of the image", self.config.width_max, self.config.width_max, 1)
                    .read_only()
            }
            Property::HeightMax => {
                PropertyInfo::integer(name, "Maximum height of the image", self.config.height_max, self.config.height_max, 1)
                    .read_only()
            }
            Property::Width => PropertyInfo::integer(
                name,
                "Width of the image provided by the device",
                inc,
                self.config.width_max - state.offset_x,
                inc,
            ),
            Property::Height => PropertyInfo::integer(
                name,
                "Height of the image provided by the device",
                inc,
                self.config.height_max - state.offset_y,
                inc,
            ),
            Property::OffsetX => PropertyInfo::integer(
                name,
                "Horizontal offset from the origin to the region of interest",
                0,
                self.config.width_max - state.width,
                inc,
            ),
            Property::OffsetY => PropertyInfo::integer(
                name,
                "Vertical offset from the origin to the region of interest",
                0,
                self.config.height_max - state.height,
                inc,
            ),
            Property::PixelFormat => {
                let entries: Vec<&str> = self.config.pixel_formats.iter().map(|f| f.name()).collect();
                PropertyInfo::enumeration(name, "Format of the pixels provided by the device", &entries)
            }
            Property::PixelSize => {
                let entries: Vec<&str> = self.config.pixel_formats.iter().map(|f| f.pixel_size()).collect();
                PropertyInfo::enumeration(name, "Total size in bits of a pixel of the image", &entries).read_only()
            }
            Property::PayloadSize => {
                let payload = state.payload_size();
                PropertyInfo::integer(name, "Number of bytes transferred for each image", payload, payload, 1)
                    .read_only()
            }
            Property::ExposureTime => PropertyInfo::float(
                name,
                "Exposure time in microseconds",
                EXPOSURE_MIN_US,
                EXPOSURE_MAX_US,
            ),
            Property::Gain => PropertyInfo::float(name, "Gain in dB", 0.0, GAIN_MAX_DB),
            Property::TriggerSelector => {
                PropertyInfo::enumeration(name, "Selects the type of trigger to configure", &TRIGGER_SELECTORS)
            }
            Property::TriggerMode => {
                PropertyInfo::enumeration(name, "Controls if the selected trigger is active", &ON_OFF)
            }
            Property::TriggerSource => {
                PropertyInfo::enumeration(name, "Internal signal or physical input line to use as trigger source", &TRIGGER_SOURCES)
            }
            Property::TriggerSoftware => PropertyInfo::command(name, "Generates an internal trigger"),
            Property::DeviceLinkThroughputLimitMode => {
                PropertyInfo::enumeration(name, "Limits the link throughput to a configured value", &ON_OFF)
            }
            Property::Custom(custom) => match custom.as_str() {
                "ReverseX" => PropertyInfo::boolean(name, "Flip the image horizontally"),
                "DeviceTemperature" => {
                    PropertyInfo::float(name, "Device temperature in degrees Celsius", -40.0, 120.0).read_only()
                }
                "AcquisitionFrameRate" => {
                    PropertyInfo::float(name, "Free-run frame rate in Hz", frame_rate, frame_rate).read_only()
                }
                _ => return None,
            },
        };

        Some(info)
    }

    fn info_locked(&self, name: &str, state: &DeviceState) -> CameraResult<PropertyInfo> {
        let mut info = self
            .base_info(name, state)
            .ok_or_else(|| CameraError::unreadable(name, "no such property"))?;

        if self.stream.is_some()
            && matches!(
                Property::from(name),
                Property::Width | Property::Height | Property::PixelFormat
            )
            && info.access == Access::ReadWrite
        {
            info.access = Access::ReadOnly;
        }

        if self.config.unreadable.iter().any(|u| u == name) {
            info.access = match info.access {
                Access::ReadWrite | Access::WriteOnly => Access::WriteOnly,
                Access::ReadOnly | Access::NotAvailable => Access::NotAvailable,
            };
        }

        Ok(info)
    }

    fn read_locked(&self, name: &str, state: &DeviceState) -> CameraResult<PropertyValue> {
        let value = match Property::from(name) {
            Property::DeviceVendorName => self.config.vendor.clone().into(),
            Property::DeviceModelName => self.config.model.clone().into(),
            Property::DeviceSerialNumber => self.config.serial.clone().into(),
            Property::WidthMax => self.config.width_max.into(),
            Property::HeightMax => self.config.height_max.into(),
            Property::Width => state.width.into(),
            Property::Height => state.height.into(),
            Property::OffsetX => state.offset_x.into(),
            Property::OffsetY => state.offset_y.into(),
            Property::PixelFormat => state.pixel_format.name().into(),
            Property::PixelSize => state.pixel_format.pixel_size().into(),
            Property::PayloadSize => state.payload_size().into(),
            Property::ExposureTime => state.exposure_time.into(),
            Property::Gain => state.gain.into(),
            Property::TriggerSelector => state.trigger_selector.clone().into(),
            Property::TriggerMode => state.trigger_mode.clone().into(),
            Property::TriggerSource => state.trigger_source.clone().into(),
            Property::DeviceLinkThroughputLimitMode => state.throughput_limit_mode.clone().into(),
            Property::Custom(custom) if custom == "ReverseX" => state.reverse_x.into(),
            Property::Custom(custom) if custom == "DeviceTemperature" => PropertyValue::Float(41.5),
            Property::Custom(custom) if custom == "AcquisitionFrameRate" => {
                (1000.0 / self.config.frame_interval_ms.max(1) as f64).into()
            }
            _ => return Err(CameraError::unreadable(name, "no such property")),
        };
        Ok(value)
    }

    fn apply(state: &mut DeviceState, name: &str, value: &PropertyValue) -> CameraResult<()> {
        let as_int = || {
            value
                .as_i64()
                .ok_or_else(|| CameraError::invalid_value(name, "expected integer"))
        };
        let as_text = || {
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| CameraError::invalid_value(name, "expected text"))
        };

        match Property::from(name) {
            Property::Width => state.width = as_int()?,
            Property::Height => state.height = as_int()?,
            Property::OffsetX => state.offset_x = as_int()?,
            Property::OffsetY => state.offset_y = as_int()?,
            Property::ExposureTime => {
                state.exposure_time = value
                    .as_f64()
                    .ok_or_else(|| CameraError::invalid_value(name, "expected float"))?
            }
            Property::Gain => {
                state.gain = value
                    .as_f64()
                    .ok_or_else(|| CameraError::invalid_value(name, "expected float"))?
            }
            Property::PixelFormat => {
                state.pixel_format = as_text()?
                    .parse()
                    .map_err(|e: String| CameraError::invalid_value(name, e))?
            }
            Property::TriggerSelector => state.trigger_selector = as_text()?,
            Property::TriggerMode => state.trigger_mode = as_text()?,
            Property::TriggerSource => state.trigger_source = as_text()?,
            Property::DeviceLinkThroughputLimitMode => state.throughput_limit_mode = as_text()?,
            Property::Custom(custom) if custom == "ReverseX" => {
                state.reverse_x = value
                    .as_bool()
                    .ok_or_else(|| CameraError::invalid_value(name, "expected boolean"))?
            }
            _ => return Err(CameraError::write(name, "property cannot be written")),
        }
        Ok(())
    }

    /// When the next frame becomes available, or `None` if none will come
    fn next_due(&self, stream: &StreamState, state: &DeviceState) -> Option<Instant> {
        if !state.triggered() {
            return Some(stream.next_due);
        }
        if state.trigger_source == "Software" {
            return (stream.pending_triggers > 0).then(Instant::now);
        }
        self.config.line_trigger_interval_ms.map(|_| stream.next_due)
    }

    fn frame_period(&self, state: &DeviceState) -> Duration {
        match (state.triggered(), self.config.line_trigger_interval_ms) {
            (true, Some(ms)) => Duration::from_millis(ms),
            _ => Duration::from_millis(self.config.frame_interval_ms),
        }
    }

    fn render(state: &DeviceState, frame_id: u64) -> Frame {
        let width = state.width as usize;
        let height = state.height as usize;
        let format = state.pixel_format;
        let mut data = Vec::with_capacity(width * height * format.bytes_per_pixel());

        for y in 0..height {
            for x in 0..width {
                let column = if state.reverse_x { width - 1 - x } else { x };
                let level = (column + y) as u64 + frame_id;
                match format {
                    PixelFormat::Mono8 | PixelFormat::BayerRG8 => data.push(level as u8),
                    PixelFormat::Mono10 | PixelFormat::Mono12 | PixelFormat::Mono16 => {
                        let mask = (1u32 << format.bits_per_pixel()) - 1;
                        let sample = (level as u32 & mask) as u16;
                        data.extend_from_slice(&sample.to_le_bytes());
                    }
                    PixelFormat::Rgb8 => data.extend_from_slice(&[column as u8, y as u8, frame_id as u8]),
                    PixelFormat::Bgr8 => data.extend_from_slice(&[frame_id as u8, y as u8, column as u8]),
                }
            }
        }

        Frame::new(
            frame_id,
            SystemTime::now(),
            data,
            state.width as u32,
            state.height as u32,
            format,
        )
    }
}

impl DeviceSession for SimulatedSession {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn property_names(&self) -> Vec<String> {
        Self::PROPERTY_NAMES.iter().map(|n| n.to_string()).collect()
    }

    fn property_info(&self, name: &str) -> CameraResult<PropertyInfo> {
        let state = self.state.lock();
        self.info_locked(name, &state)
    }

    fn read(&self, name: &str) -> CameraResult<PropertyValue> {
        let state = self.state.lock();
        let info = self.info_locked(name, &state)?;
        if !info.access.is_readable() {
            return Err(CameraError::unreadable(name, "access denied"));
        }
        self.read_locked(name, &state)
    }

    fn write(&mut self, name: &str, value: &PropertyValue) -> CameraResult<()> {
        let mut state = self.state.lock();
        let info = self
            .info_locked(name, &state)
            .map_err(|e| CameraError::write(name, e.to_string()))?;

        if !info.access.is_writable() {
            return Err(CameraError::write(name, "property is not writable"));
        }

        let value = info.validate(value)?;
        Self::apply(&mut state, name, &value)?;
        drop(state);
        self.write_log.lock().push((name.to_string(), value.clone()));

        trace!("Simulated device {} accepted {} = {}", self.config.serial, name, value);
        Ok(())
    }

    fn execute(&mut self, command: &str) -> CameraResult<()> {
        if command != Property::TriggerSoftware.as_str() {
            return Err(CameraError::write(command, "unknown command"));
        }

        let state = self.state.lock();
        let armed = state.triggered() && state.trigger_source == "Software";
        match self.stream.as_mut() {
            Some(stream) if armed => {
                stream.pending_triggers += 1;
                Ok(())
            }
            Some(_) => Err(CameraError::write(command, "software trigger is not armed")),
            None => Err(CameraError::write(command, "acquisition is not running")),
        }
    }

    fn start_stream(&mut self) -> CameraResult<()> {
        if self.stream.is_some() {
            return Err(CameraError::write("AcquisitionStart", "acquisition already running"));
        }

        let period = {
            let state = self.state.lock();
            self.frame_period(&state)
        };

        self.stream = Some(StreamState {
            next_due: Instant::now() + period,
            pending_triggers: 0,
            frame_id: 0,
        });
        debug!("Simulated device {} streaming", self.config.serial);
        Ok(())
    }

    fn retrieve(&mut self, timeout: Duration) -> CameraResult<Option<Frame>> {
        let state = self.state.lock().clone();
        let period = self.frame_period(&state);

        let due = {
            let stream = self
                .stream
                .as_ref()
                .ok_or_else(|| CameraError::connection(&self.descriptor.id, "acquisition is not running"))?;
            self.next_due(stream, &state)
        };

        let now = Instant::now();
        let due = match due {
            Some(due) if due <= now + timeout => due,
            _ => {
                thread::sleep(timeout);
                return Ok(None);
            }
        };

        thread::sleep(due.saturating_duration_since(now));

        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        let frame_id = stream.frame_id;
        stream.frame_id += 1;
        if state.triggered() && state.trigger_source == "Software" {
            stream.pending_triggers = stream.pending_triggers.saturating_sub(1);
        } else {
            stream.next_due = due + period;
        }

        Ok(Some(Self::render(&state, frame_id)))
    }

    fn stop_stream(&mut self) -> CameraResult<()> {
        if self.stream.take().is_some() {
            debug!("Simulated device {} stopped streaming", self.config.serial);
        }
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.stream = None;
        self.claims.lock().remove(&self.config.serial);
        self.released = true;
        debug!("Simulated device {} released", self.config.serial);
    }
}

impl Drop for SimulatedSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SimulatedBackend {
        SimulatedBackend::new(vec![SimulatedDeviceConfig::new("SIM001").sensor(64, 48)])
    }

    fn session(backend: &SimulatedBackend) -> Box<dyn DeviceSession> {
        let descriptor = backend.enumerate().unwrap().remove(0);
        backend.connect(&descriptor).unwrap()
    }

    #[test]
    fn test_enumerate_describes_devices() {
        let backend = backend();
        let devices = backend.enumerate().unwrap();

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "sim://SIM001");
        assert_eq!(devices[0].serial, "SIM001");
        assert_eq!(devices[0].transport, "Simulated");
    }

    #[test]
    fn test_device_rejects_out_of_bounds_intermediate_state() {
        let backend = backend();
        let mut session = session(&backend);

        // Full width, so no room for an offset
        let err = session.write("OffsetX", &PropertyValue::Int(16)).unwrap_err();
        assert!(matches!(err, CameraError::InvalidValue { .. }));
        assert_eq!(session.read("OffsetX").unwrap(), PropertyValue::Int(0));

        session.write("Width", &PropertyValue::Int(32)).unwrap();
        session.write("OffsetX", &PropertyValue::Int(16)).unwrap();
        assert_eq!(
            session.property_info("Width").unwrap().range,
            Some(crate::property::Range::Int { min: 1, max: 48, inc: 1 })
        );
    }

    #[test]
    fn test_payload_follows_format_and_roi() {
        let backend = backend();
        let mut session = session(&backend);

        assert_eq!(session.read("PayloadSize").unwrap(), PropertyValue::Int(64 * 48));
        session.write("PixelFormat", &"Mono12".into()).unwrap();
        assert_eq!(session.read("PayloadSize").unwrap(), PropertyValue::Int(64 * 48 * 2));
        assert_eq!(session.read("PixelSize").unwrap(), PropertyValue::Str("Bpp12".into()));
    }

    #[test]
    fn test_locked_features_while_streaming() {
        let backend = backend();
        let mut session = session(&backend);

        session.start_stream().unwrap();
        assert!(matches!(
            session.write("Width", &PropertyValue::Int(32)),
            Err(CameraError::PropertyWrite { .. })
        ));
        session.write("ExposureTime", &PropertyValue::Float(1000.0)).unwrap();
        session.stop_stream().unwrap();
        session.write("Width", &PropertyValue::Int(32)).unwrap();
    }

    #[test]
    fn test_free_run_delivers_pattern_frames() {
        let backend = SimulatedBackend::new(vec![SimulatedDeviceConfig::new("SIM002")
            .sensor(8, 4)
            .frame_interval(Duration::from_millis(1))]);
        let mut session = session(&backend);

        session.start_stream().unwrap();
        let first = session.retrieve(Duration::from_millis(100)).unwrap().unwrap();
        let second = session.retrieve(Duration::from_millis(100)).unwrap().unwrap();

        assert_eq!(first.id, 0);
        assert_eq!(second.id, 1);
        assert!(first.validate_size());
        assert_eq!(first.data[0], 0);
        assert_eq!(second.data[0], 1);
    }

    #[test]
    fn test_write_log_is_kept_across_sessions_and_frames() {
        let backend = SimulatedBackend::new(vec![SimulatedDeviceConfig::new("SIM003")
            .sensor(8, 4)
            .frame_interval(Duration::from_millis(1))]);

        {
            let mut session = session(&backend);
            session.write("Width", &PropertyValue::Int(4)).unwrap();
        }

        let mut session = session(&backend);
        session.write("OffsetX", &PropertyValue::Int(2)).unwrap();
        session.start_stream().unwrap();
        for _ in 0..3 {
            let frame = session.retrieve(Duration::from_millis(100)).unwrap().unwrap();
            assert_eq!(frame.width, 4);
        }

        assert_eq!(
            backend.write_log("SIM003"),
            vec![
                ("Width".to_string(), PropertyValue::Int(4)),
                ("OffsetX".to_string(), PropertyValue::Int(2)),
            ]
        );
        backend.clear_write_log("SIM003");
        assert!(backend.write_log("SIM003").is_empty());
    }

    #[test]
    fn test_software_trigger_gates_frames() {
        let backend = backend();
        let mut session = session(&backend);

        session.write("TriggerMode", &"On".into()).unwrap();
        session.write("TriggerSource", &"Software".into()).unwrap();
        assert!(session.execute("TriggerSoftware").is_err());

        session.start_stream().unwrap();
        assert!(session.retrieve(Duration::from_millis(5)).unwrap().is_none());

        session.execute("TriggerSoftware").unwrap();
        assert!(session.retrieve(Duration::from_millis(5)).unwrap().is_some());
        assert!(session.retrieve(Duration::from_millis(5)).unwrap().is_none());
    }

    #[test]
    fn test_claims_are_released() {
        let backend = backend();
        let descriptor = backend.enumerate().unwrap().remove(0);

        let mut first = backend.connect(&descriptor).unwrap();
        assert!(backend.is_claimed("SIM001"));
        assert!(matches!(
            backend.connect(&descriptor),
            Err(CameraError::DeviceBusy { .. })
        ));

        first.release();
        assert!(!backend.is_claimed("SIM001"));
        drop(first);
        assert!(backend.connect(&descriptor).is_ok());
    }

    #[test]
    fn test_unreadable_and_unreachable_devices() {
        let backend = SimulatedBackend::new(vec![
            SimulatedDeviceConfig::new("SIM003").unreadable("DeviceTemperature"),
            SimulatedDeviceConfig::new("SIM004").unreachable(),
        ]);
        let devices = backend.enumerate().unwrap();

        let session = backend.connect(&devices[0]).unwrap();
        assert!(matches!(
            session.read("DeviceTemperature"),
            Err(CameraError::PropertyUnreadable { .. })
        ));
        assert!(matches!(
            backend.connect(&devices[1]),
            Err(CameraError::Connection { .. })
        ));
    }
}
