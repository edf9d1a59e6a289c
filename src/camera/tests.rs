use super::*;
use crate::backend::{CameraBackend, SimulatedBackend, SimulatedDeviceConfig};
use crate::config::{CameraConfig, PropertySetting, TriggerSettings};
use crate::error::{CamctlError, CameraError};
use crate::frame::PixelFormat;
use crate::property::{Property, PropertyValue};
use crate::roi::{Axis, Roi};
use std::thread;
use std::time::{Duration, Instant};

fn fast_grab() -> GrabOptions {
    GrabOptions {
        timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(5),
    }
}

fn small_device(serial: &str) -> SimulatedDeviceConfig {
    SimulatedDeviceConfig::new(serial)
        .sensor(64, 48)
        .frame_interval(Duration::from_millis(1))
}

fn open_first(backend: &SimulatedBackend) -> CameraHandle {
    let descriptor = discover(backend).unwrap().remove(0);
    CameraHandle::open(backend, &descriptor)
        .unwrap()
        .with_grab_options(fast_grab())
}

fn written(backend: &SimulatedBackend, serial: &str) -> Vec<(String, i64)> {
    backend
        .write_log(serial)
        .into_iter()
        .map(|(name, value)| (name, value.as_i64().unwrap_or(-1)))
        .collect()
}

#[test]
fn test_open_close_lifecycle() {
    let backend = SimulatedBackend::new(vec![small_device("SIM100")]);
    let mut camera = open_first(&backend);

    assert_eq!(camera.state(), CameraState::Open);
    assert!(backend.is_claimed("SIM100"));

    camera.close();
    assert_eq!(camera.state(), CameraState::Closed);
    assert!(!backend.is_claimed("SIM100"));

    // Idempotent
    camera.close();
    assert_eq!(camera.state(), CameraState::Closed);
    assert_eq!(camera.width(), Err(CameraError::Closed));
    assert!(matches!(camera.grab_frames(1), Err(CameraError::Closed)));
}

#[test]
fn test_second_open_is_busy_until_release() {
    let backend = SimulatedBackend::new(vec![small_device("SIM101")]);
    let descriptor = discover(&backend).unwrap().remove(0);

    let first = CameraHandle::open(&backend, &descriptor).unwrap();
    assert!(matches!(
        CameraHandle::open(&backend, &descriptor),
        Err(CameraError::DeviceBusy { .. })
    ));

    drop(first);
    assert!(CameraHandle::open(&backend, &descriptor).is_ok());
}

#[test]
fn test_unreachable_device_is_connection_error() {
    let backend = SimulatedBackend::new(vec![small_device("SIM102").unreachable()]);
    let descriptor = discover(&backend).unwrap().remove(0);

    assert!(matches!(
        CameraHandle::open(&backend, &descriptor),
        Err(CameraError::Connection { .. })
    ));
}

#[test]
fn test_property_access_and_validation() {
    let backend = SimulatedBackend::new(vec![small_device("SIM103")]);
    let mut camera = open_first(&backend);

    assert_eq!(camera.sensor_size().unwrap(), (64, 48));
    assert_eq!(
        camera.get_property("DeviceSerialNumber").unwrap(),
        PropertyValue::Str("SIM103".into())
    );

    camera.set_exposure_time(10000.0).unwrap();
    assert_eq!(camera.exposure_time().unwrap(), 10000.0);

    camera.set_pixel_format(PixelFormat::Mono12).unwrap();
    assert_eq!(camera.pixel_format().unwrap(), PixelFormat::Mono12);
    assert_eq!(
        camera.get_property(Property::PixelSize).unwrap(),
        PropertyValue::Str("Bpp12".into())
    );
    assert_eq!(camera.payload_size().unwrap(), 64 * 48 * 2);

    // Out of range: rejected before the device sees it, value unchanged
    backend.clear_write_log("SIM103");
    assert!(matches!(
        camera.set_property(Property::Width, 65i64),
        Err(CameraError::InvalidValue { .. })
    ));
    assert!(matches!(
        camera.set_property(Property::PixelFormat, "RGB8"),
        Err(CameraError::InvalidValue { .. })
    ));
    assert!(backend.write_log("SIM103").is_empty());
    assert_eq!(camera.width().unwrap(), 64);

    // Read-only, unknown and command properties are write errors
    assert!(matches!(
        camera.set_property(Property::WidthMax, 32i64),
        Err(CameraError::PropertyWrite { .. })
    ));
    assert!(matches!(
        camera.set_property("NoSuchFeature", 1i64),
        Err(CameraError::PropertyWrite { .. })
    ));
    assert!(matches!(
        camera.set_property_str("NoSuchFeature", "1"),
        Err(CameraError::PropertyWrite { .. })
    ));
    assert!(matches!(
        camera.set_property(Property::TriggerSoftware, true),
        Err(CameraError::PropertyWrite { .. })
    ));

    // Vendor-specific keys go through the same path
    camera.set_property_str("ReverseX", "true").unwrap();
    assert_eq!(camera.get_property("ReverseX").unwrap(), PropertyValue::Bool(true));
    assert_eq!(
        camera.describe(Property::ExposureTime).unwrap(),
        "Exposure time in microseconds"
    );
}

#[test]
fn test_unreadable_property_in_snapshot() {
    let backend = SimulatedBackend::new(vec![small_device("SIM104").unreadable("DeviceTemperature")]);
    let camera = open_first(&backend);

    assert!(matches!(
        camera.get_property("DeviceTemperature"),
        Err(CameraError::PropertyUnreadable { .. })
    ));

    let snapshot = camera.property_snapshot().unwrap();
    let temperature = snapshot
        .iter()
        .find(|entry| entry.name == "DeviceTemperature")
        .unwrap();
    assert!(temperature.value.is_none());
    assert!(temperature.to_string().ends_with("<NOT READABLE>"));

    let width = snapshot.iter().find(|entry| entry.name == "Width").unwrap();
    assert_eq!(width.value, Some(PropertyValue::Int(64)));
    assert_eq!(snapshot.len(), camera.property_names().unwrap().len());
}

#[test]
fn test_roi_example_writes_size_before_offset() {
    let backend = SimulatedBackend::new(vec![SimulatedDeviceConfig::new("SIM105").sensor(4096, 3000)]);
    let mut camera = open_first(&backend);

    camera.set_roi(&Roi::new(1024, 750, 2048, 1500)).unwrap();

    assert_eq!(
        written(&backend, "SIM105"),
        vec![
            ("Width".to_string(), 2048),
            ("OffsetX".to_string(), 1024),
            ("Height".to_string(), 1500),
            ("OffsetY".to_string(), 750),
        ]
    );
    assert_eq!(camera.roi().unwrap(), Roi::new(1024, 750, 2048, 1500));
    assert_eq!(camera.get_int(Property::Width).unwrap(), 2048);
    assert_eq!(camera.get_int(Property::OffsetX).unwrap(), 1024);
}

#[test]
fn test_roi_moves_back_with_offset_first() {
    let backend = SimulatedBackend::new(vec![SimulatedDeviceConfig::new("SIM106").sensor(4096, 3000)]);
    let mut camera = open_first(&backend);

    camera.set_roi(&Roi::new(3500, 2500, 512, 400)).unwrap();
    backend.clear_write_log("SIM106");

    camera.set_roi(&Roi::new(100, 0, 3996, 3000)).unwrap();
    assert_eq!(
        written(&backend, "SIM106"),
        vec![
            ("OffsetX".to_string(), 100),
            ("Width".to_string(), 3996),
            ("OffsetY".to_string(), 0),
            ("Height".to_string(), 3000),
        ]
    );
    assert_eq!(camera.roi().unwrap(), Roi::new(100, 0, 3996, 3000));
}

#[test]
fn test_valid_rois_read_back() {
    let backend = SimulatedBackend::new(vec![small_device("SIM107")]);
    let mut camera = open_first(&backend);

    for (offset_x, width) in [(0, 64), (16, 48), (63, 1), (0, 1), (32, 32), (10, 20)] {
        let roi = Roi::new(offset_x, 48 - width.min(48), width, width.min(48));
        camera.set_roi(&roi).unwrap();
        assert_eq!(camera.roi().unwrap(), roi);
    }
}

#[test]
fn test_invalid_roi_leaves_device_unchanged() {
    let backend = SimulatedBackend::new(vec![small_device("SIM108")]);
    let mut camera = open_first(&backend);

    camera.set_roi(&Roi::new(8, 8, 32, 32)).unwrap();
    backend.clear_write_log("SIM108");

    // X fits, Y does not: nothing may be written
    let err = camera.set_roi(&Roi::new(0, 40, 16, 16)).unwrap_err();
    assert_eq!(
        err,
        CameraError::InvalidRoi {
            axis: Axis::Y,
            offset: 40,
            extent: 16,
            max: 48
        }
    );
    assert!(matches!(
        camera.set_roi(&Roi::new(50, 0, 20, 10)),
        Err(CameraError::InvalidRoi { axis: Axis::X, .. })
    ));
    assert!(matches!(
        camera.set_roi(&Roi::new(i64::MAX, 0, 1, 1)),
        Err(CameraError::InvalidRoi { axis: Axis::X, offset: i64::MAX, .. })
    ));

    assert!(backend.write_log("SIM108").is_empty());
    assert_eq!(camera.roi().unwrap(), Roi::new(8, 8, 32, 32));
}

#[test]
fn test_roi_increment_checked_before_writing() {
    let mut device = small_device("SIM109");
    device.roi_increment = 4;
    let backend = SimulatedBackend::new(vec![device]);
    let mut camera = open_first(&backend);

    assert!(matches!(
        camera.set_roi(&Roi::new(0, 0, 30, 48)),
        Err(CameraError::InvalidValue { .. })
    ));
    assert!(backend.write_log("SIM109").is_empty());

    camera.set_roi(&Roi::new(4, 8, 32, 16)).unwrap();
    assert_eq!(camera.roi().unwrap(), Roi::new(4, 8, 32, 16));
}

#[test]
fn test_grab_three_frames() {
    let backend = SimulatedBackend::new(vec![small_device("SIM110")]);
    let mut camera = open_first(&backend);
    camera.set_roi(&Roi::new(0, 0, 16, 8)).unwrap();

    let mut acquisition = camera.grab_frames(3).unwrap();
    let frames: Vec<_> = acquisition.by_ref().collect::<Result<_, _>>().unwrap();

    assert_eq!(frames.len(), 3);
    assert_eq!(acquisition.delivered(), 3);
    assert!(acquisition.next().is_none());
    drop(acquisition);

    for (expected_id, frame) in frames.iter().enumerate() {
        assert_eq!(frame.id, expected_id as u64);
        assert_eq!(frame.shape(), (8, 16, 1));
        assert_eq!(frame.pixel_format, PixelFormat::Mono8);
        assert!(frame.validate_size());
    }

    assert_eq!(camera.state(), CameraState::Open);
    // Properties are writable again once the acquisition ended
    camera.set_property(Property::Width, 32i64).unwrap();
}

#[test]
fn test_new_acquisition_after_previous_one() {
    let backend = SimulatedBackend::new(vec![small_device("SIM111")]);
    let mut camera = open_first(&backend);

    assert_eq!(camera.grab_frames(2).unwrap().count(), 2);
    assert_eq!(camera.grab_frames(1).unwrap().count(), 1);
}

#[test]
fn test_continuous_acquisition_can_be_stopped() {
    let backend = SimulatedBackend::new(vec![small_device("SIM112")]);
    let mut camera = open_first(&backend);

    let mut acquisition = camera.grab_frames(0).unwrap();
    assert_eq!(acquisition.size_hint(), (0, None));
    for _ in 0..5 {
        assert!(acquisition.next().unwrap().is_ok());
    }
    acquisition.stop().unwrap();

    assert_eq!(camera.state(), CameraState::Open);
}

#[test]
fn test_grab_timeout_without_trigger() {
    let backend = SimulatedBackend::new(vec![small_device("SIM113")]);
    let mut camera = open_first(&backend).with_grab_options(GrabOptions {
        timeout: Duration::from_millis(30),
        poll_interval: Duration::from_millis(5),
    });
    camera.configure_trigger(&TriggerSettings::software()).unwrap();

    let mut acquisition = camera.grab_frames(1).unwrap();
    assert_eq!(
        acquisition.next(),
        Some(Err(CameraError::GrabTimeout {
            timeout: Duration::from_millis(30)
        }))
    );
    // A failed grab ends the sequence
    assert!(acquisition.next().is_none());
    drop(acquisition);

    assert_eq!(camera.state(), CameraState::Open);
}

#[test]
fn test_software_triggered_acquisition() {
    let backend = SimulatedBackend::new(vec![small_device("SIM114")]);
    let mut camera = open_first(&backend);
    camera.configure_trigger(&TriggerSettings::software()).unwrap();

    let mut acquisition = camera.grab_frames(2).unwrap();
    for _ in 0..2 {
        acquisition.trigger_software().unwrap();
        assert!(acquisition.next().unwrap().is_ok());
    }
    assert!(acquisition.next().is_none());
}

#[test]
fn test_line_triggered_acquisition() {
    let backend = SimulatedBackend::new(vec![
        small_device("SIM115").line_trigger_interval(Duration::from_millis(2))
    ]);
    let mut camera = open_first(&backend);
    camera.configure_trigger(&TriggerSettings::line1()).unwrap();

    assert_eq!(
        camera.get_property(Property::TriggerSource).unwrap(),
        PropertyValue::Str("Line1".into())
    );
    let frames: Vec<_> = camera.grab_frames(3).unwrap().collect();
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|frame| frame.is_ok()));
}

#[test]
fn test_close_mid_acquisition() {
    let backend = SimulatedBackend::new(vec![small_device("SIM116")]);
    let mut camera = open_first(&backend);

    let mut acquisition = camera.grab_frames(0).unwrap();
    assert!(acquisition.next().unwrap().is_ok());
    acquisition.close();

    assert_eq!(camera.state(), CameraState::Closed);
    assert!(!backend.is_claimed("SIM116"));
}

#[test]
fn test_close_signal_interrupts_blocked_grab() {
    let backend = SimulatedBackend::new(vec![small_device("SIM117")]);
    let mut camera = open_first(&backend).with_grab_options(GrabOptions {
        timeout: Duration::from_secs(10),
        poll_interval: Duration::from_millis(5),
    });
    // Armed for a software trigger that never comes
    camera.configure_trigger(&TriggerSettings::software()).unwrap();

    let signal = camera.close_signal();
    let closer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        signal.request();
    });

    let started = Instant::now();
    let mut acquisition = camera.grab_frames(5).unwrap();
    assert!(acquisition.next().is_none());
    drop(acquisition);
    closer.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(camera.state(), CameraState::Closed);
    assert!(!backend.is_claimed("SIM117"));
}

#[test]
fn test_shared_close_signal_closes_every_handle() {
    let backend = SimulatedBackend::new(vec![small_device("SIM130"), small_device("SIM131")]);
    let devices = discover(&backend).unwrap();
    let signal = CloseSignal::new();

    let mut first = CameraHandle::open(&backend, &devices[0])
        .unwrap()
        .with_close_signal(signal.clone());
    let second = CameraHandle::open(&backend, &devices[1])
        .unwrap()
        .with_close_signal(signal.clone());

    // Closing one handle does not raise the shared signal
    first.close();
    assert!(!signal.is_requested());
    assert!(second.is_open());

    signal.request();
    assert_eq!(second.state(), CameraState::Closed);
    assert!(matches!(second.width(), Err(CameraError::Closed)));
}

#[test]
fn test_error_mid_capture_still_releases_device() {
    let backend = SimulatedBackend::new(vec![small_device("SIM118")]);

    let result: Result<(), CameraError> = (|| {
        let mut camera = open_first(&backend);
        camera.configure_trigger(&TriggerSettings::software())?;
        for frame in camera.grab_frames(1)? {
            frame?;
        }
        Ok(())
    })();

    assert!(matches!(result, Err(CameraError::GrabTimeout { .. })));
    assert!(!backend.is_claimed("SIM118"));
}

#[test]
fn test_builder_applies_settings() {
    let backend = SimulatedBackend::new(vec![
        SimulatedDeviceConfig::new("FIRST").sensor(640, 480),
        SimulatedDeviceConfig::new("LAST").sensor(4096, 3000),
    ]);

    let settings = CameraConfig {
        properties: vec![PropertySetting {
            name: "DeviceLinkThroughputLimitMode".into(),
            value: "Off".into(),
        }],
        pixel_format: Some(PixelFormat::Mono12),
        exposure_time: Some(10000.0),
        centered_roi: true,
        roi: None,
        trigger: Some(TriggerSettings::line1()),
    };

    let camera = CameraHandleBuilder::new()
        .backend(&backend)
        .settings(settings)
        .grab_options(fast_grab())
        .open()
        .unwrap();

    assert_eq!(camera.descriptor().serial, "LAST");
    assert_eq!(camera.roi().unwrap(), Roi::new(1024, 750, 2048, 1500));
    assert_eq!(camera.pixel_format().unwrap(), PixelFormat::Mono12);
    assert_eq!(camera.exposure_time().unwrap(), 10000.0);
    assert_eq!(
        camera.get_property(Property::TriggerMode).unwrap(),
        PropertyValue::Str("On".into())
    );
    assert_eq!(
        camera.get_property("DeviceLinkThroughputLimitMode").unwrap(),
        PropertyValue::Str("Off".into())
    );
    assert_eq!(camera.grab_options(), fast_grab());
}

#[test]
fn test_builder_failure_releases_device() {
    let backend = SimulatedBackend::new(vec![small_device("SIM119")]);
    let settings = CameraConfig {
        roi: Some(Roi::new(0, 0, 128, 48)),
        ..CameraConfig::default()
    };

    let result = CameraHandleBuilder::new()
        .backend(&backend)
        .settings(settings)
        .open();

    assert!(matches!(
        result,
        Err(CamctlError::Camera(CameraError::InvalidRoi { axis: Axis::X, .. }))
    ));
    assert!(!backend.is_claimed("SIM119"));
}

#[test]
fn test_builder_validation() {
    let result = CameraHandleBuilder::new().open();

    if let Err(CamctlError::System { message }) = result {
        assert!(message.contains("Camera backend must be specified"));
    } else {
        panic!("Expected system error for missing backend");
    }
}

#[test]
fn test_handles_on_separate_threads() {
    let backend = SimulatedBackend::new(vec![small_device("T1"), small_device("T2")]);
    let devices = discover(&backend).unwrap();
    let backend: &dyn CameraBackend = &backend;

    let counts: Vec<usize> = thread::scope(|scope| {
        let workers: Vec<_> = devices
            .iter()
            .map(|descriptor| {
                scope.spawn(move || {
                    let mut camera = CameraHandle::open(backend, descriptor)
                        .unwrap()
                        .with_grab_options(fast_grab());
                    camera.set_roi(&Roi::new(0, 0, 8, 8)).unwrap();
                    let frames = camera.grab_frames(4).unwrap().count();
                    frames
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(counts, vec![4, 4]);
}
