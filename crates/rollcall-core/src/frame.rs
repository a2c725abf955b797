//! Frame type — decoded 8-bit luma images the pipeline operates on.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("frame buffer length {actual} does not match {width}x{height}")]
    InvalidLength {
        width: u32,
        height: u32,
        actual: usize,
    },
}

/// A decoded grayscale frame.
#[derive(Clone)]
pub struct Frame {
    /// Luma pixel data, row-major (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Decode an encoded image (PNG, JPEG, ...) into a luma frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let img = image::load_from_memory(bytes)?.to_luma8();
        let (width, height) = img.dimensions();
        Ok(Self {
            data: img.into_raw(),
            width,
            height,
        })
    }

    /// Wrap an already-decoded luma buffer.
    pub fn from_raw(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = (width as usize) * (height as usize);
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                width,
                height,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Pixel value at (x, y). Coordinates must be within bounds.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.data[(y as usize) * (self.width as usize) + (x as usize)]
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
