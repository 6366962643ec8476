//! Decoded thumbnail image.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::error::CacheError;

/// A decoded RGBA thumbnail.
///
/// Pixels are shared, so cloning is cheap and the same image can be handed
/// to every waiter of a coalesced request.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    pixels: Arc<Vec<u8>>,
}

impl DecodedImage {
    /// Wraps raw RGBA pixels. The buffer length is checked when encoding.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels: Arc::new(pixels),
        }
    }

    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    /// Solid-colour image, handy for placeholders and tests.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::from_rgba(RgbaImage::from_pixel(width, height, image::Rgba(rgba)))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Bytes this image occupies in the memory cache.
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }

    /// Encodes as PNG for the disk store.
    pub fn encode_png(&self) -> Result<Vec<u8>, CacheError> {
        let buffer = RgbaImage::from_raw(self.width, self.height, self.pixels.to_vec()).ok_or(
            CacheError::MalformedImage {
                width: self.width,
                height: self.height,
                len: self.pixels.len(),
            },
        )?;

        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(buffer).write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    /// Decodes bytes written by [`DecodedImage::encode_png`] (or any format the
    /// codec recognises).
    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self::from_rgba(image.to_rgba8()))
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}
