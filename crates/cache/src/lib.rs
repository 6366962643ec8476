//! Thumbnail Cache Library
//!
//! Two-level thumbnail storage: an in-memory LRU of decoded images (with a
//! companion negative-result cache) and a size-bounded LRU store of encoded
//! thumbnails on disk. Also defines the boundary to the thumbnail generation
//! service and the configuration shared by the whole pipeline.

pub mod config;
pub mod decoded;
pub mod disk;
pub mod error;
pub mod generator;
pub mod key;
pub mod ram;

pub use config::{ConfigError, ThumbnailConfig};
pub use decoded::DecodedImage;
pub use disk::{DiskCacheStats, DiskThumbnailStore};
pub use error::CacheError;
pub use generator::{GenerationCallback, GenerationRequest, ImageFileGenerator, ThumbnailGenerator};
pub use key::RequestKey;
pub use ram::{MemoryCacheStats, NegativeCache, ThumbnailMemoryCache};
