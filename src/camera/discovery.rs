use tracing::{debug, info, warn};

use crate::backend::{CameraBackend, DeviceDescriptor};
use crate::config::SelectionConfig;
use crate::error::{CameraError, CameraResult};

/// Query every attached device. An empty bus is an error, not an empty list.
pub fn discover(backend: &dyn CameraBackend) -> CameraResult<Vec<DeviceDescriptor>> {
    let devices = backend.enumerate()?;

    if devices.is_empty() {
        warn!("No cameras found via {} backend", backend.name());
        return Err(CameraError::NoDeviceFound);
    }

    info!("Found {} camera(s) via {} backend", devices.len(), backend.name());
    for (index, device) in devices.iter().enumerate() {
        debug!("  {}: {}", index, device);
    }

    Ok(devices)
}

/// Pick one device: by serial, else by index, else the last one found
pub fn select_device(
    devices: &[DeviceDescriptor],
    selection: &SelectionConfig,
) -> CameraResult<DeviceDescriptor> {
    let selected = if let Some(serial) = &selection.serial {
        devices.iter().find(|d| &d.serial == serial)
    } else if let Some(index) = selection.index {
        devices.get(index)
    } else {
        devices.last()
    };

    selected.cloned().ok_or_else(|| {
        warn!("No discovered camera matches {:?}", selection);
        CameraError::NoDeviceFound
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SimulatedBackend, SimulatedDeviceConfig};

    fn backend() -> SimulatedBackend {
        SimulatedBackend::new(vec![
            SimulatedDeviceConfig::new("A1"),
            SimulatedDeviceConfig::new("B2"),
            SimulatedDeviceConfig::new("C3"),
        ])
    }

    #[test]
    fn test_discover_empty_bus_fails() {
        let backend = SimulatedBackend::new(Vec::new());
        assert_eq!(discover(&backend), Err(CameraError::NoDeviceFound));
    }

    #[test]
    fn test_default_selection_is_last_device() {
        let devices = discover(&backend()).unwrap();
        let selected = select_device(&devices, &SelectionConfig::default()).unwrap();
        assert_eq!(selected.serial, "C3");
    }

    #[test]
    fn test_selection_by_serial_and_index() {
        let devices = discover(&backend()).unwrap();

        let by_serial = SelectionConfig {
            serial: Some("A1".into()),
            index: Some(2),
        };
        assert_eq!(select_device(&devices, &by_serial).unwrap().serial, "A1");

        let by_index = SelectionConfig {
            serial: None,
            index: Some(1),
        };
        assert_eq!(select_device(&devices, &by_index).unwrap().serial, "B2");

        let missing = SelectionConfig {
            serial: Some("Z9".into()),
            index: None,
        };
        assert_eq!(
            select_device(&devices, &missing),
            Err(CameraError::NoDeviceFound)
        );
    }
}
