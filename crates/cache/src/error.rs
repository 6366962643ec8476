//! Error type shared by the cache crate.

use std::io;

use crate::config::ConfigError;

/// Errors produced by the disk store, image codec and generator.
///
/// None of these reach callers of the provider: they are logged and turned
/// into a "no thumbnail" result.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("pixel buffer of {len} bytes does not match {width}x{height} RGBA")]
    MalformedImage { width: u32, height: u32, len: usize },

    #[error("unsupported mime type: {0}")]
    UnsupportedMimeType(String),

    #[error("source image too large: {width}x{height}")]
    ImageTooLarge { width: u32, height: u32 },

    #[error("invalid thumbnail size: {0}")]
    InvalidSize(u32),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
