use std::iter::FusedIterator;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use super::handle::{CameraHandle, CameraState};
use crate::error::{CameraError, CameraResult};
use crate::frame::Frame;
use crate::property::Property;

/// A running acquisition: a lazy, single-use sequence of frames.
///
/// Ends after the requested number of frames, on the first error, on
/// `stop`/`close`, or when the handle's `CloseSignal` fires. Dropping it
/// stops the device stream and returns the handle to `Open`.
pub struct Acquisition<'a> {
    camera: &'a mut CameraHandle,
    remaining: Option<u32>,
    delivered: u64,
    finished: bool,
}

impl<'a> Acquisition<'a> {
    pub(super) fn new(camera: &'a mut CameraHandle, count: u32) -> Self {
        Self {
            camera,
            remaining: (count > 0).then_some(count),
            delivered: 0,
            finished: false,
        }
    }

    /// Frames yielded so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Issue a software trigger to the device being acquired from.
    ///
    /// A pending close request ends the acquisition instead.
    pub fn trigger_software(&mut self) -> CameraResult<()> {
        if self.finished {
            return Err(CameraError::write(
                Property::TriggerSoftware.as_str(),
                "acquisition has finished",
            ));
        }
        if self.camera.close_requested() {
            debug!("Trigger on {} skipped, camera closing", self.camera.descriptor().serial);
            self.finished = true;
            self.camera.close();
            return Ok(());
        }
        self.camera
            .session_mut()?
            .execute(Property::TriggerSoftware.as_str())
    }

    /// End the acquisition, keeping the camera open
    pub fn stop(mut self) -> CameraResult<()> {
        self.finish()
    }

    /// End the acquisition and close the camera
    pub fn close(mut self) {
        self.finished = true;
        self.camera.close();
    }

    fn finish(&mut self) -> CameraResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        if self.camera.state != CameraState::Acquiring {
            return Ok(());
        }
        self.camera.state = CameraState::Open;

        info!(
            "Acquisition on {} finished after {} frame(s)",
            self.camera.descriptor().serial,
            self.delivered
        );

        match self.camera.session.as_mut() {
            Some(session) => session.stop_stream(),
            None => Ok(()),
        }
    }

    fn finish_quietly(&mut self) {
        if let Err(e) = self.finish() {
            warn!(
                "Failed to stop acquisition on {}: {}",
                self.camera.descriptor().serial,
                e
            );
        }
    }
}

impl Iterator for Acquisition<'_> {
    type Item = CameraResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.remaining == Some(0) {
            self.finish_quietly();
            return None;
        }

        let grab = self.camera.grab;
        let deadline = Instant::now() + grab.timeout;

        loop {
            if self.camera.close_requested() {
                debug!("Acquisition on {} interrupted by close", self.camera.descriptor().serial);
                self.finished = true;
                self.camera.close();
                return None;
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "No frame from {} within {:?}",
                    self.camera.descriptor().serial,
                    grab.timeout
                );
                self.finish_quietly();
                return Some(Err(CameraError::GrabTimeout {
                    timeout: grab.timeout,
                }));
            }

            let Some(session) = self.camera.session.as_mut() else {
                self.finished = true;
                return None;
            };

            match session.retrieve((deadline - now).min(grab.poll_interval)) {
                Ok(Some(frame)) => {
                    self.delivered += 1;
                    if let Some(remaining) = self.remaining.as_mut() {
                        *remaining -= 1;
                    }

                    trace!(
                        "Frame {} ({}x{} {}, {} bytes)",
                        frame.id,
                        frame.width,
                        frame.height,
                        frame.pixel_format,
                        frame.data.len()
                    );

                    if self.remaining == Some(0) {
                        self.finish_quietly();
                    }
                    return Some(Ok(frame));
                }
                Ok(None) => continue,
                Err(e) => {
                    self.finish_quietly();
                    return Some(Err(e));
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            return (0, Some(0));
        }
        match self.remaining {
            Some(remaining) => (0, Some(remaining as usize)),
            None => (0, None),
        }
    }
}

impl FusedIterator for Acquisition<'_> {}

impl Drop for Acquisition<'_> {
    fn drop(&mut self) {
        self.finish_quietly();
    }
}
