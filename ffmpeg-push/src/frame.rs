use std::fmt::{Display, Formatter};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StreamError;

pub const BYTES_PER_PIXEL: usize = 4;

/// Byte order of a 4-byte-per-pixel source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelLayout {
    /// Alpha first, as the host delivers char matrices.
    #[default]
    Argb,
    Bgra,
    Rgba,
}

/// One captured image, owned and immutable once built.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    data: Bytes,
    width: u32,
    height: u32,
    stride: usize,
    layout: PixelLayout,
    timestamp: f64,
}

impl VideoFrame {
    /// Copies `height` rows of `width * 4` bytes out of `pixels`, stepping
    /// `stride` bytes between rows. Padding past each row is kept, so the
    /// frame remembers the caller's stride.
    pub fn copy_from(
        pixels: &[u8],
        width: u32,
        height: u32,
        stride: usize,
        layout: PixelLayout,
    ) -> Result<Self, StreamError> {
        if width == 0 || height == 0 {
            return Err(StreamError::InvalidFrame(format!(
                "invalid video size {}x{}",
                width, height
            )));
        }
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        if stride < row_bytes {
            return Err(StreamError::InvalidFrame(format!(
                "stride {} shorter than row of {} bytes",
                stride, row_bytes
            )));
        }
        let needed = stride * (height as usize - 1) + row_bytes;
        if pixels.len() < needed {
            return Err(StreamError::InvalidFrame(format!(
                "buffer of {} bytes, need {}",
                pixels.len(),
                needed
            )));
        }

        let mut data = vec![0u8; stride * height as usize];
        for row in 0..height as usize {
            let offset = row * stride;
            data[offset..offset + row_bytes].copy_from_slice(&pixels[offset..offset + row_bytes]);
        }

        Ok(Self {
            data: Bytes::from(data),
            width,
            height,
            stride,
            layout,
            timestamp: 0.0,
        })
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    /// Capture time in seconds, informational only; encoding uses frame count.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Pixel bytes of `row`, without the stride padding.
    pub fn row(&self, row: usize) -> &[u8] {
        let offset = row * self.stride;
        &self.data[offset..offset + self.width as usize * BYTES_PER_PIXEL]
    }
}

impl Display for VideoFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "VideoFrame data_len: {}, width: {}, height: {}, stride: {}, layout: {:?}",
            self.data.len(),
            self.width,
            self.height,
            self.stride,
            self.layout
        )
    }
}
