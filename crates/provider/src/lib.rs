//! Thumbnail Provider Library
//!
//! The coordinator that UI code talks to. A [`ThumbnailProvider`] answers
//! thumbnail requests from its memory cache when it can, coalesces duplicate
//! requests onto one in-flight generation, keeps at most a configured number
//! of keys generating at once, and fans every result out to all waiters.
//!
//! The provider is single-threaded: all calls, including
//! [`ThumbnailProvider::run_until_idle`], must come from the context that owns
//! it. Disk and generation work runs on background workers and comes back
//! through a channel.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use thumbnail_cache::{ImageFileGenerator, ThumbnailConfig};
//! use thumbnail_provider::{CallbackRequest, ThumbnailProvider};
//!
//! let mut provider =
//!     ThumbnailProvider::new(ThumbnailConfig::default(), Arc::new(ImageFileGenerator::new()))?;
//!
//! let request = CallbackRequest::new("photo-1", "/photos/1.jpg", "image/jpeg", 96, |id, thumb| {
//!     println!("{}: {:?}", id, thumb.map(|t| (t.width(), t.height())));
//! });
//! provider.get_thumbnail(request.shared());
//!
//! while !provider.is_idle() {
//!     provider.wait_for_completion(Duration::from_millis(50));
//! }
//! # Ok::<(), thumbnail_cache::CacheError>(())
//! ```

mod pending;
mod provider;
mod request;

pub use provider::{ProviderStats, ThumbnailProvider};
pub use request::{CallbackRequest, SharedRequest, ThumbnailRequest};
