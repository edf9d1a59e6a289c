use super::discovery::{discover, select_device};
use super::handle::{CameraHandle, GrabOptions};
use crate::backend::CameraBackend;
use crate::config::{CamctlConfig, CameraConfig, SelectionConfig};
use crate::error::{CamctlError, Result};

/// Discovers, selects, opens and configures a camera in one step
pub struct CameraHandleBuilder<'a> {
    backend: Option<&'a dyn CameraBackend>,
    selection: SelectionConfig,
    settings: CameraConfig,
    grab: GrabOptions,
}

impl<'a> CameraHandleBuilder<'a> {
    pub fn new() -> Self {
        Self {
            backend: None,
            selection: SelectionConfig::default(),
            settings: CameraConfig::default(),
            grab: GrabOptions::default(),
        }
    }

    /// Take selection, camera settings and grab options from a loaded configuration
    pub fn from_config(config: &CamctlConfig) -> Self {
        Self::new()
            .selection(config.selection.clone())
            .settings(config.camera.clone())
            .grab_options(config.acquisition.grab_options())
    }

    pub fn backend(mut self, backend: &'a dyn CameraBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn selection(mut self, selection: SelectionConfig) -> Self {
        self.selection = selection;
        self
    }

    pub fn settings(mut self, settings: CameraConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn grab_options(mut self, grab: GrabOptions) -> Self {
        self.grab = grab;
        self
    }

    /// Open the selected camera and apply the settings.
    ///
    /// If a setting is rejected the handle is dropped, which closes the device.
    pub fn open(self) -> Result<CameraHandle> {
        let backend = self
            .backend
            .ok_or_else(|| CamctlError::system("Camera backend must be specified"))?;

        let devices = discover(backend)?;
        let descriptor = select_device(&devices, &self.selection)?;

        let mut camera = CameraHandle::open(backend, &descriptor)?.with_grab_options(self.grab);
        camera.apply_settings(&self.settings)?;

        Ok(camera)
    }
}

impl Default for CameraHandleBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}
