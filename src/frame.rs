use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Pixel formats understood by the frame model, named as in GenICam SFNC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Mono8,
    Mono10,
    Mono12,
    Mono16,
    #[serde(rename = "RGB8")]
    Rgb8,
    #[serde(rename = "BGR8")]
    Bgr8,
    BayerRG8,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 7] = [
        PixelFormat::Mono8,
        PixelFormat::Mono10,
        PixelFormat::Mono12,
        PixelFormat::Mono16,
        PixelFormat::Rgb8,
        PixelFormat::Bgr8,
        PixelFormat::BayerRG8,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::Mono8 => "Mono8",
            PixelFormat::Mono10 => "Mono10",
            PixelFormat::Mono12 => "Mono12",
            PixelFormat::Mono16 => "Mono16",
            PixelFormat::Rgb8 => "RGB8",
            PixelFormat::Bgr8 => "BGR8",
            PixelFormat::BayerRG8 => "BayerRG8",
        }
    }

    /// Significant bits per pixel
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Mono8 | PixelFormat::BayerRG8 => 8,
            PixelFormat::Mono10 => 10,
            PixelFormat::Mono12 => 12,
            PixelFormat::Mono16 => 16,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 24,
        }
    }

    /// Bytes per pixel in unpacked storage
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Mono8 | PixelFormat::BayerRG8 => 1,
            PixelFormat::Mono10 | PixelFormat::Mono12 | PixelFormat::Mono16 => 2,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            _ => 1,
        }
    }

    /// Value of the `PixelSize` feature for this format
    pub fn pixel_size(&self) -> &'static str {
        match self.bits_per_pixel() {
            8 => "Bpp8",
            10 => "Bpp10",
            12 => "Bpp12",
            16 => "Bpp16",
            _ => "Bpp24",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PixelFormat::ALL
            .iter()
            .copied()
            .find(|format| format.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unsupported pixel format '{}'", s))
    }
}

/// One acquired image. The caller owns it once it is yielded.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Per-session frame counter
    pub id: u64,
    /// Timestamp when the frame was delivered
    pub timestamp: SystemTime,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Row-major pixel data, little-endian for multi-byte formats
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            width,
            height,
            pixel_format,
            data,
        }
    }

    /// Shape as (height, width, channels)
    pub fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.pixel_format.channels(),
        )
    }

    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.pixel_format.bytes_per_pixel()
    }

    /// Check the buffer length against the shape
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// Samples of a 10/12/16 bit format as `u16`; `None` for 8-bit formats
    pub fn samples_u16(&self) -> Option<Vec<u16>> {
        if self.pixel_format.bytes_per_pixel() != 2 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect(),
        )
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
