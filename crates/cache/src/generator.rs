//! Boundary to the thumbnail generation service.
//!
//! The coordinator treats generation as an opaque asynchronous service: it
//! hands over a [`GenerationRequest`] and receives exactly one callback with
//! the decoded thumbnail, or `None` when the content has none.

use std::path::PathBuf;

use image::ImageReader;

use crate::decoded::DecodedImage;
use crate::error::CacheError;
use crate::key::RequestKey;

/// Largest source edge accepted by [`ImageFileGenerator`].
pub const MAX_SOURCE_DIMENSION: u32 = 16_384;

/// Largest source pixel count accepted by [`ImageFileGenerator`].
pub const MAX_SOURCE_PIXELS: u64 = 100_000_000;

/// Everything the generation service needs to produce one thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub content_id: String,
    pub file_path: PathBuf,
    pub mime_type: String,
    pub icon_size_px: u32,
}

impl GenerationRequest {
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.content_id.clone(), self.icon_size_px)
    }
}

/// Single-shot completion for one generation call.
pub type GenerationCallback = Box<dyn FnOnce(Option<DecodedImage>) + Send + 'static>;

/// Produces thumbnails for files.
///
/// Implementations must invoke `callback` exactly once, on any thread, with an
/// image whose larger edge does not exceed `request.icon_size_px`, or with
/// `None` on failure or unsupported input. Retrying is not their concern.
pub trait ThumbnailGenerator: Send + Sync {
    fn generate(&self, request: GenerationRequest, callback: GenerationCallback);
}

/// Generator backed by the `image` crate.
///
/// Decodes the source file on the calling thread (a background worker in the
/// provider) and downscales it to fit the requested square.
#[derive(Debug, Clone, Default)]
pub struct ImageFileGenerator;

impl ImageFileGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Decode and downscale `request.file_path`.
    pub fn render(&self, request: &GenerationRequest) -> Result<DecodedImage, CacheError> {
        if !request.mime_type.starts_with("image/") {
            return Err(CacheError::UnsupportedMimeType(request.mime_type.clone()));
        }
        if request.icon_size_px == 0 {
            return Err(CacheError::InvalidSize(0));
        }

        let (width, height) = ImageReader::open(&request.file_path)?
            .with_guessed_format()?
            .into_dimensions()?;
        validate_dimensions(width, height)?;

        let source = ImageReader::open(&request.file_path)?
            .with_guessed_format()?
            .decode()?;

        let size = request.icon_size_px;
        let thumbnail = if width <= size && height <= size {
            source
        } else {
            source.thumbnail(size, size)
        };

        Ok(DecodedImage::from_rgba(thumbnail.to_rgba8()))
    }
}

impl ThumbnailGenerator for ImageFileGenerator {
    fn generate(&self, request: GenerationRequest, callback: GenerationCallback) {
        match self.render(&request) {
            Ok(image) => callback(Some(image)),
            Err(e) => {
                log::debug!(
                    "no thumbnail for {} ({}): {}",
                    request.content_id,
                    request.file_path.display(),
                    e
                );
                callback(None)
            }
        }
    }
}

fn validate_dimensions(width: u32, height: u32) -> Result<(), CacheError> {
    let pixels = width as u64 * height as u64;
    if width == 0
        || height == 0
        || width > MAX_SOURCE_DIMENSION
        || height > MAX_SOURCE_DIMENSION
        || pixels > MAX_SOURCE_PIXELS
    {
        return Err(CacheError::ImageTooLarge { width, height });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::path::Path;
    use std::sync::mpsc;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();
        path
    }

    fn request(path: PathBuf, mime: &str, size: u32) -> GenerationRequest {
        GenerationRequest {
            content_id: "photo".to_string(),
            file_path: path,
            mime_type: mime.to_string(),
            icon_size_px: size,
        }
    }

    fn generate(request: GenerationRequest) -> Option<DecodedImage> {
        let (tx, rx) = mpsc::channel();
        ImageFileGenerator::new().generate(
            request,
            Box::new(move |image| {
                tx.send(image).unwrap();
            }),
        );
        let result = rx.recv().unwrap();
        assert!(rx.try_recv().is_err(), "callback must fire exactly once");
        result
    }

    #[test]
    fn test_downscales_to_fit() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "wide.png", 400, 200);

        let image = generate(request(path, "image/png", 100)).unwrap();
        assert_eq!(image.width(), 100);
        assert_eq!(image.height(), 50);
    }

    #[test]
    fn test_small_source_is_not_upscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "tiny.png", 20, 30);

        let image = generate(request(path, "image/png", 100)).unwrap();
        assert_eq!((image.width(), image.height()), (20, 30));
    }

    #[test]
    fn test_missing_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(generate(request(dir.path().join("gone.png"), "image/png", 64)).is_none());
    }

    #[test]
    fn test_unsupported_mime_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "a.png", 10, 10);
        assert!(generate(request(path, "application/pdf", 64)).is_none());
    }

    #[test]
    fn test_corrupt_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        assert!(generate(request(path, "image/png", 64)).is_none());
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "a.png", 10, 10);
        assert!(matches!(
            ImageFileGenerator::new().render(&request(path, "image/png", 0)),
            Err(CacheError::InvalidSize(0))
        ));
    }

    #[test]
    fn test_validate_dimensions() {
        assert!(validate_dimensions(1024, 768).is_ok());
        assert!(validate_dimensions(0, 10).is_err());
        assert!(validate_dimensions(MAX_SOURCE_DIMENSION + 1, 1).is_err());
        assert!(validate_dimensions(15_000, 15_000).is_err());
    }
}
