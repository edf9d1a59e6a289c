use crossbeam::channel;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::backend::{CameraBackend, DeviceDescriptor};
use crate::camera::{Acquisition, CameraHandle, CloseSignal, GrabOptions};
use crate::config::CameraConfig;
use crate::error::{CamctlError, Result};
use crate::sink::{ChannelSink, FrameSink};

/// Frames per camera the fan-in channel buffers before workers block
const CHANNEL_DEPTH_PER_CAMERA: usize = 4;

/// Totals for one completed capture
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CaptureSummary {
    pub frames: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl CaptureSummary {
    pub fn frame_rate(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            self.frames as f64 / seconds
        } else {
            0.0
        }
    }
}

/// Outcome of one camera's part in `capture_all`
#[derive(Debug)]
pub struct CameraCapture {
    pub serial: String,
    pub outcome: Result<CaptureSummary>,
}

/// Grab `count` frames (`0` = until the handle is closed) into `sink`.
///
/// The stream is stopped before any error is returned.
pub fn run_capture(
    camera: &mut CameraHandle,
    count: u32,
    sink: &mut dyn FrameSink,
) -> Result<CaptureSummary> {
    let serial = camera.descriptor().serial.clone();
    let started = Instant::now();

    let mut acquisition = camera.grab_frames(count)?;
    let mut summary = drain(&serial, &mut acquisition, sink, |_| Ok(()))?;
    acquisition.stop()?;

    finish(&serial, sink, &mut summary, started)?;
    Ok(summary)
}

/// Like `run_capture`, but issues a `TriggerSoftware` command before each frame
pub fn run_software_triggered(
    camera: &mut CameraHandle,
    count: u32,
    sink: &mut dyn FrameSink,
) -> Result<CaptureSummary> {
    let serial = camera.descriptor().serial.clone();
    let started = Instant::now();

    let mut acquisition = camera.grab_frames(count)?;
    let mut summary = drain(&serial, &mut acquisition, sink, |acquisition| {
        acquisition.trigger_software().map_err(CamctlError::from)
    })?;
    acquisition.stop()?;

    finish(&serial, sink, &mut summary, started)?;
    Ok(summary)
}

fn drain<F>(
    serial: &str,
    acquisition: &mut Acquisition<'_>,
    sink: &mut dyn FrameSink,
    mut before_frame: F,
) -> Result<CaptureSummary>
where
    F: FnMut(&mut Acquisition<'_>) -> Result<()>,
{
    let mut summary = CaptureSummary::default();

    loop {
        if acquisition.is_finished() {
            break;
        }
        before_frame(acquisition)?;

        let Some(frame) = acquisition.next() else {
            break;
        };
        let frame = frame?;

        summary.frames += 1;
        summary.bytes += frame.data.len() as u64;
        sink.consume(serial, frame)?;
    }

    Ok(summary)
}

fn finish(
    serial: &str,
    sink: &mut dyn FrameSink,
    summary: &mut CaptureSummary,
    started: Instant,
) -> Result<()> {
    sink.finish()?;
    summary.elapsed = started.elapsed();

    info!(
        "Captured {} frame(s) ({} bytes) from {} in {:.2?} ({:.1} fps)",
        summary.frames,
        summary.bytes,
        serial,
        summary.elapsed,
        summary.frame_rate()
    );
    Ok(())
}

/// Open every camera in `devices` on its own thread and capture from all of
/// them at once.
///
/// Each thread owns its handle; frames are funnelled into `sink` on the
/// calling thread. A camera failing does not stop the others. An error from
/// `sink` disconnects every worker and is returned once they have ended.
/// Requesting `stop` closes every camera and ends the capture cleanly.
pub fn capture_all(
    backend: &dyn CameraBackend,
    devices: &[DeviceDescriptor],
    settings: &CameraConfig,
    grab: GrabOptions,
    count: u32,
    stop: &CloseSignal,
    sink: &mut dyn FrameSink,
) -> Result<Vec<CameraCapture>> {
    if devices.is_empty() {
        return Err(CamctlError::system("No cameras to capture from"));
    }

    info!("Capturing from {} camera(s)", devices.len());
    let (tx, rx) = channel::bounded(devices.len() * CHANNEL_DEPTH_PER_CAMERA);

    thread::scope(|scope| {
        let workers: Vec<_> = devices
            .iter()
            .map(|descriptor| {
                let mut forward = ChannelSink::new(tx.clone());
                let stop = stop.clone();
                scope.spawn(move || {
                    capture_one(backend, descriptor, settings, grab, count, stop, &mut forward)
                })
            })
            .collect();
        drop(tx);

        let mut forwarded = Ok(());
        for (serial, frame) in rx.iter() {
            if let Err(e) = sink.consume(&serial, frame) {
                error!("Frame sink failed, stopping all cameras: {}", e);
                forwarded = Err(e);
                break;
            }
        }
        drop(rx);

        let captures: Vec<CameraCapture> = workers
            .into_iter()
            .zip(devices)
            .map(|(worker, descriptor)| CameraCapture {
                serial: descriptor.serial.clone(),
                outcome: worker.join().unwrap_or_else(|_| {
                    Err(CamctlError::system(format!(
                        "Capture thread for {} panicked",
                        descriptor.serial
                    )))
                }),
            })
            .collect();

        for capture in &captures {
            if let Err(e) = &capture.outcome {
                warn!("Capture from {} failed: {}", capture.serial, e);
            }
        }

        forwarded?;
        sink.finish()?;
        Ok(captures)
    })
}

fn capture_one(
    backend: &dyn CameraBackend,
    descriptor: &DeviceDescriptor,
    settings: &CameraConfig,
    grab: GrabOptions,
    count: u32,
    stop: CloseSignal,
    sink: &mut dyn FrameSink,
) -> Result<CaptureSummary> {
    let mut camera = CameraHandle::open(backend, descriptor)?
        .with_grab_options(grab)
        .with_close_signal(stop);
    camera.apply_settings(settings)?;
    run_capture(&mut camera, count, sink)
}
