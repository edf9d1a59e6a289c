use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::acquisition::Acquisition;
use crate::backend::{CameraBackend, DeviceDescriptor, DeviceSession};
use crate::config::{CameraConfig, TriggerSettings};
use crate::error::{CameraError, CameraResult};
use crate::frame::PixelFormat;
use crate::property::{Property, PropertyEntry, PropertyInfo, PropertyKind, PropertyValue, Range};
use crate::roi::{self, Roi};

/// Lifecycle of a camera handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Closed,
    Open,
    Acquiring,
}

/// Blocking behaviour of `grab_frames`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrabOptions {
    /// Longest wait for one frame before `GrabTimeout`
    pub timeout: Duration,
    /// Granularity at which a blocked grab notices a close request
    pub poll_interval: Duration,
}

impl Default for GrabOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Cross-thread request to close a `CameraHandle`.
///
/// A grab blocked on the handle returns within one poll interval after
/// `request` and the handle releases the device.
///
/// One signal can be shared by several handles through
/// `CameraHandle::with_close_signal`; a single request then closes them all.
#[derive(Debug, Clone, Default)]
pub struct CloseSignal(Arc<AtomicBool>);

impl CloseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Exclusive, stateful façade over one opened device.
///
/// Dropping the handle closes it, so the device is released on every exit
/// path including errors in the middle of an acquisition.
pub struct CameraHandle {
    descriptor: DeviceDescriptor,
    pub(super) session: Option<Box<dyn DeviceSession>>,
    pub(super) state: CameraState,
    pub(super) grab: GrabOptions,
    close_requested: Arc<AtomicBool>,
}

impl CameraHandle {
    /// Open `descriptor` through `backend`
    pub fn open(backend: &dyn CameraBackend, descriptor: &DeviceDescriptor) -> CameraResult<Self> {
        info!("Opening camera {} via {} backend", descriptor, backend.name());

        let session = backend.connect(descriptor)?;

        info!("Camera {} open", descriptor.serial);
        Ok(Self {
            descriptor: descriptor.clone(),
            session: Some(session),
            state: CameraState::Open,
            grab: GrabOptions::default(),
            close_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_grab_options(mut self, grab: GrabOptions) -> Self {
        self.grab = grab;
        self
    }

    /// Close when `signal` is requested instead of on a private signal
    pub fn with_close_signal(mut self, signal: CloseSignal) -> Self {
        self.close_requested = signal.0;
        self
    }

    pub fn set_grab_options(&mut self, grab: GrabOptions) {
        self.grab = grab;
    }

    pub fn grab_options(&self) -> GrabOptions {
        self.grab
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> CameraState {
        if self.close_requested() {
            CameraState::Closed
        } else {
            self.state
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() != CameraState::Closed
    }

    pub fn close_signal(&self) -> CloseSignal {
        CloseSignal(Arc::clone(&self.close_requested))
    }

    pub(super) fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }

    fn session(&self) -> CameraResult<&dyn DeviceSession> {
        if self.close_requested() {
            return Err(CameraError::Closed);
        }
        self.session.as_deref().ok_or(CameraError::Closed)
    }

    pub(super) fn session_mut(&mut self) -> CameraResult<&mut Box<dyn DeviceSession>> {
        if self.close_requested() && self.session.is_some() {
            info!("Close requested for camera {}", self.descriptor.serial);
            self.close();
        }
        self.session.as_mut().ok_or(CameraError::Closed)
    }

    /// Names of every property the device exposes
    pub fn property_names(&self) -> CameraResult<Vec<String>> {
        Ok(self.session()?.property_names())
    }

    pub fn property_info(&self, name: impl AsRef<str>) -> CameraResult<PropertyInfo> {
        self.session()?.property_info(name.as_ref())
    }

    /// Textual description of a property
    pub fn describe(&self, name: impl AsRef<str>) -> CameraResult<String> {
        Ok(self.property_info(name)?.description)
    }

    pub fn get_property(&self, name: impl AsRef<str>) -> CameraResult<PropertyValue> {
        self.session()?.read(name.as_ref())
    }

    /// Validate `value` against the device-reported limits, then write it.
    ///
    /// Nothing reaches the device unless validation passes.
    pub fn set_property(
        &mut self,
        name: impl AsRef<str>,
        value: impl Into<PropertyValue>,
    ) -> CameraResult<()> {
        let name = name.as_ref();
        let value = value.into();
        let session = self.session_mut()?;

        let info = session.property_info(name).map_err(as_write_error)?;

        if info.kind == PropertyKind::Command {
            return Err(CameraError::write(name, "command properties must be executed"));
        }
        if !info.access.is_writable() {
            return Err(CameraError::write(name, "property is not writable"));
        }

        let value = info.validate(&value)?;
        debug!("Setting {} = {}", name, value);
        session.write(name, &value)
    }

    /// Parse `raw` according to the property's kind and write it
    pub fn set_property_str(&mut self, name: impl AsRef<str>, raw: &str) -> CameraResult<()> {
        let name = name.as_ref();
        let value = self
            .property_info(name)
            .map_err(as_write_error)?
            .parse_value(raw)?;
        self.set_property(name, value)
    }

    /// Run a command feature such as `TriggerSoftware`
    pub fn execute(&mut self, command: impl AsRef<str>) -> CameraResult<()> {
        let command = command.as_ref();
        debug!("Executing {}", command);
        self.session_mut()?.execute(command)
    }

    /// Every property with its description; unreadable values are `None`
    pub fn property_snapshot(&self) -> CameraResult<Vec<PropertyEntry>> {
        let session = self.session()?;

        Ok(session
            .property_names()
            .into_iter()
            .map(|name| {
                let description = session
                    .property_info(&name)
                    .map(|info| info.description)
                    .unwrap_or_default();
                let value = session.read(&name).ok();
                PropertyEntry {
                    name,
                    description,
                    value,
                }
            })
            .collect())
    }

    pub fn get_int(&self, name: impl AsRef<str>) -> CameraResult<i64> {
        let name = name.as_ref();
        self.get_property(name)?
            .as_i64()
            .ok_or_else(|| CameraError::unreadable(name, "value is not an integer"))
    }

    pub fn get_float(&self, name: impl AsRef<str>) -> CameraResult<f64> {
        let name = name.as_ref();
        self.get_property(name)?
            .as_f64()
            .ok_or_else(|| CameraError::unreadable(name, "value is not numeric"))
    }

    pub fn get_string(&self, name: impl AsRef<str>) -> CameraResult<String> {
        let name = name.as_ref();
        match self.get_property(name)? {
            PropertyValue::Str(value) => Ok(value),
            other => Err(CameraError::unreadable(
                name,
                format!("value {} is not text", other),
            )),
        }
    }

    pub fn width(&self) -> CameraResult<i64> {
        self.get_int(Property::Width)
    }

    pub fn height(&self) -> CameraResult<i64> {
        self.get_int(Property::Height)
    }

    /// (WidthMax, HeightMax)
    pub fn sensor_size(&self) -> CameraResult<(i64, i64)> {
        Ok((
            self.get_int(Property::WidthMax)?,
            self.get_int(Property::HeightMax)?,
        ))
    }

    pub fn roi(&self) -> CameraResult<Roi> {
        Ok(Roi::new(
            self.get_int(Property::OffsetX)?,
            self.get_int(Property::OffsetY)?,
            self.width()?,
            self.height()?,
        ))
    }

    /// Exposure time in microseconds
    pub fn exposure_time(&self) -> CameraResult<f64> {
        self.get_float(Property::ExposureTime)
    }

    pub fn set_exposure_time(&mut self, microseconds: f64) -> CameraResult<()> {
        self.set_property(Property::ExposureTime, microseconds)
    }

    pub fn pixel_format(&self) -> CameraResult<PixelFormat> {
        let name = self.get_string(Property::PixelFormat)?;
        name.parse::<PixelFormat>()
            .map_err(|e: String| CameraError::unreadable(Property::PixelFormat.as_str(), e))
    }

    pub fn set_pixel_format(&mut self, format: PixelFormat) -> CameraResult<()> {
        self.set_property(Property::PixelFormat, format.name())
    }

    /// Bytes per frame for the current settings
    pub fn payload_size(&self) -> CameraResult<i64> {
        self.get_int(Property::PayloadSize)
    }

    /// Move the sensor window without passing through an out-of-bounds state.
    ///
    /// Both axes are validated before anything is written, so a rejected
    /// request leaves the device untouched.
    pub fn set_roi(&mut self, roi: &Roi) -> CameraResult<()> {
        let max = self.sensor_size()?;
        let current = (self.width()?, self.height()?);
        let plan = roi::plan(roi, max, current)?;

        for (property, value) in plan.writes() {
            self.check_increment(&property, value)?;
        }

        debug!(
            "ROI {} on {}x{} sensor: X {:?}, Y {:?}",
            roi, max.0, max.1, plan.x.order, plan.y.order
        );

        for (property, value) in plan.writes() {
            self.set_property(&property, value)?;
        }

        info!("Camera {} ROI set to {}", self.descriptor.serial, roi);
        Ok(())
    }

    /// Reject values the device would refuse for step size alone
    fn check_increment(&self, property: &Property, value: i64) -> CameraResult<()> {
        if let Some(Range::Int { min, inc, .. }) = self.property_info(property)?.range {
            if value < min || (value - min) % inc != 0 {
                return Err(CameraError::invalid_value(
                    property.as_str(),
                    format!("{} does not match minimum {} and increment {}", value, min, inc),
                ));
            }
        }
        Ok(())
    }

    /// Arm a trigger: selector, then mode, then source
    pub fn configure_trigger(&mut self, trigger: &TriggerSettings) -> CameraResult<()> {
        self.set_property(Property::TriggerSelector, trigger.selector.as_str())?;
        self.set_property(Property::TriggerMode, "On")?;
        self.set_property(Property::TriggerSource, trigger.source.as_str())?;
        info!(
            "Camera {} waits for {} trigger on {}",
            self.descriptor.serial, trigger.selector, trigger.source
        );
        Ok(())
    }

    pub fn disable_trigger(&mut self, selector: &str) -> CameraResult<()> {
        self.set_property(Property::TriggerSelector, selector)?;
        self.set_property(Property::TriggerMode, "Off")
    }

    /// Apply configured settings in a fixed order: raw properties, pixel
    /// format, exposure, trigger, ROI
    pub fn apply_settings(&mut self, settings: &CameraConfig) -> CameraResult<()> {
        for setting in &settings.properties {
            self.set_property(&setting.name, setting.value.clone())?;
        }

        if let Some(format) = settings.pixel_format {
            self.set_pixel_format(format)?;
        }

        if let Some(exposure) = settings.exposure_time {
            self.set_exposure_time(exposure)?;
        }

        if let Some(trigger) = &settings.trigger {
            self.configure_trigger(trigger)?;
        }

        if settings.centered_roi {
            let (max_x, max_y) = self.sensor_size()?;
            self.set_roi(&Roi::centered(max_x, max_y))?;
        } else if let Some(roi) = &settings.roi {
            self.set_roi(roi)?;
        }

        Ok(())
    }

    /// Start an acquisition of `count` frames; `0` streams until stopped.
    ///
    /// The returned sequence borrows the handle, so no property can change
    /// while it runs. It cannot be restarted once finished.
    pub fn grab_frames(&mut self, count: u32) -> CameraResult<Acquisition<'_>> {
        let session = self.session_mut()?;
        session.start_stream()?;
        self.state = CameraState::Acquiring;

        if count == 0 {
            info!("Camera {} streaming continuously", self.descriptor.serial);
        } else {
            info!("Camera {} grabbing {} frame(s)", self.descriptor.serial, count);
        }

        Ok(Acquisition::new(self, count))
    }

    /// Release the device. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            if self.state == CameraState::Acquiring {
                if let Err(e) = session.stop_stream() {
                    warn!("Failed to stop acquisition on {}: {}", self.descriptor.serial, e);
                }
            }
            session.release();
            info!("Camera {} closed", self.descriptor.serial);
        }
        self.state = CameraState::Closed;
    }
}

/// A name the device cannot describe is a failed write, not a failed read
fn as_write_error(err: CameraError) -> CameraError {
    match err {
        CameraError::PropertyUnreadable { name, details } => CameraError::PropertyWrite { name, details },
        other => other,
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CameraHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraHandle")
            .field("descriptor", &self.descriptor)
            .field("state", &self.state())
            .field("grab", &self.grab)
            .finish()
    }
}
