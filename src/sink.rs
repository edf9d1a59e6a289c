use crossbeam::channel::Sender;
use tracing::info;

use crate::error::{CamctlError, Result};
use crate::frame::Frame;

#[cfg(feature = "image_output")]
pub use image_file::ImageFileSink;

/// Consumer of acquired frames.
///
/// `serial` names the camera the frame came from, so one sink can take
/// frames from several cameras.
pub trait FrameSink: Send {
    fn consume(&mut self, serial: &str, frame: Frame) -> Result<()>;

    /// Called once after the last frame of a capture
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps every frame in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    frames: Vec<(String, Frame)>,
    finished: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[(String, Frame)] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<(String, Frame)> {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl FrameSink for CollectingSink {
    fn consume(&mut self, serial: &str, frame: Frame) -> Result<()> {
        self.frames.push((serial.to_string(), frame));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// Logs each frame's shape and size and drops it
#[derive(Debug, Default)]
pub struct FrameLogSink {
    frames: u64,
    bytes: u64,
}

impl FrameLogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for FrameLogSink {
    fn consume(&mut self, serial: &str, frame: Frame) -> Result<()> {
        let (height, width, channels) = frame.shape();
        info!(
            "{} frame {}: {}x{}x{} {} ({} bytes)",
            serial,
            frame.id,
            height,
            width,
            channels,
            frame.pixel_format,
            frame.data.len()
        );
        self.frames += 1;
        self.bytes += frame.data.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        info!("Logged {} frame(s), {} bytes total", self.frames, self.bytes);
        Ok(())
    }
}

/// Forwards frames to a `crossbeam` channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<(String, Frame)>,
}

impl ChannelSink {
    pub fn new(sender: Sender<(String, Frame)>) -> Self {
        Self { sender }
    }
}

impl FrameSink for ChannelSink {
    fn consume(&mut self, serial: &str, frame: Frame) -> Result<()> {
        self.sender
            .send((serial.to_string(), frame))
            .map_err(|_| CamctlError::sink("frame receiver disconnected"))
    }
}

#[cfg(feature = "image_output")]
mod image_file {
    use chrono::{DateTime, Utc};
    use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma, RgbImage};
    use std::fs;
    use std::path::{Path, PathBuf};

    use tracing::{debug, info};

    use super::FrameSink;
    use crate::config::OutputConfig;
    use crate::error::{CamctlError, Result};
    use crate::frame::{Frame, PixelFormat};

    /// Writes every frame as a PNG file.
    ///
    /// Files are named `{prefix}_{serial}_{timestamp}_{id}.png`. Mono10 and
    /// Mono12 are scaled into 16-bit grayscale, BGR8 is reordered to RGB and
    /// Bayer mosaics are stored undemosaiced as 8-bit grayscale.
    #[derive(Debug)]
    pub struct ImageFileSink {
        directory: PathBuf,
        prefix: String,
        written: Vec<PathBuf>,
    }

    impl ImageFileSink {
        /// Create the sink, creating `directory` if needed
        pub fn new<P: Into<PathBuf>, S: Into<String>>(directory: P, prefix: S) -> Result<Self> {
            let directory = directory.into();
            fs::create_dir_all(&directory)?;
            info!("Saving frames to {}", directory.display());

            Ok(Self {
                directory,
                prefix: prefix.into(),
                written: Vec::new(),
            })
        }

        pub fn from_config(config: &OutputConfig) -> Result<Self> {
            Self::new(&config.directory, config.prefix.clone())
        }

        pub fn directory(&self) -> &Path {
            &self.directory
        }

        /// Paths written so far, in order
        pub fn written(&self) -> &[PathBuf] {
            &self.written
        }

        fn file_name(&self, serial: &str, frame: &Frame) -> String {
            let timestamp: DateTime<Utc> = frame.timestamp.into();
            format!(
                "{}_{}_{}_{:06}.png",
                self.prefix,
                serial,
                timestamp.format("%Y%m%d_%H%M%S_%3f"),
                frame.id
            )
        }
    }

    impl FrameSink for ImageFileSink {
        fn consume(&mut self, serial: &str, frame: Frame) -> Result<()> {
            let path = self.directory.join(self.file_name(serial, &frame));
            let image = to_image(frame)?;

            image.save_with_format(&path, ImageFormat::Png)?;
            debug!("Wrote {}", path.display());

            self.written.push(path);
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            info!(
                "Saved {} image(s) to {}",
                self.written.len(),
                self.directory.display()
            );
            Ok(())
        }
    }

    /// Convert a frame into an image the PNG encoder accepts
    pub(crate) fn to_image(frame: Frame) -> Result<DynamicImage> {
        if !frame.validate_size() {
            return Err(CamctlError::sink(format!(
                "frame {} has {} bytes, expected {} for {}x{} {}",
                frame.id,
                frame.data.len(),
                frame.expected_size(),
                frame.width,
                frame.height,
                frame.pixel_format
            )));
        }

        let (width, height, format) = (frame.width, frame.height, frame.pixel_format);
        let mismatch = || CamctlError::sink(format!("cannot encode {}x{} {}", width, height, format));

        let image = match format {
            PixelFormat::Mono8 | PixelFormat::BayerRG8 => {
                GrayImage::from_raw(width, height, frame.into_data()).map(DynamicImage::ImageLuma8)
            }
            PixelFormat::Mono10 | PixelFormat::Mono12 | PixelFormat::Mono16 => {
                let shift = 16 - format.bits_per_pixel();
                let samples = frame
                    .samples_u16()
                    .ok_or_else(mismatch)?
                    .into_iter()
                    .map(|sample| sample << shift)
                    .collect();
                ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(width, height, samples)
                    .map(DynamicImage::ImageLuma16)
            }
            PixelFormat::Rgb8 => {
                RgbImage::from_raw(width, height, frame.into_data()).map(DynamicImage::ImageRgb8)
            }
            PixelFormat::Bgr8 => {
                let mut data = frame.into_data();
                for pixel in data.chunks_exact_mut(3) {
                    pixel.swap(0, 2);
                }
                RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8)
            }
        };

        image.ok_or_else(mismatch)
    }
}
