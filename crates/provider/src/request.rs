//! Caller-side thumbnail requests.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use thumbnail_cache::{DecodedImage, GenerationRequest, RequestKey};

/// A caller waiting for a thumbnail.
///
/// `on_thumbnail_retrieved` is called at most once per `get_thumbnail` call,
/// on the provider's context, with `None` when no thumbnail could be produced.
pub trait ThumbnailRequest {
    fn content_id(&self) -> &str;

    fn file_path(&self) -> &Path;

    fn mime_type(&self) -> &str;

    fn icon_size_px(&self) -> u32;

    fn on_thumbnail_retrieved(&self, content_id: &str, thumbnail: Option<DecodedImage>);

    /// An image the request can produce by itself, bypassing disk and
    /// generation. Consulted when the request is dispatched.
    fn supplied_thumbnail(&self) -> Option<DecodedImage> {
        None
    }
}

/// Requests are shared between the caller and the provider's waiter sets.
pub type SharedRequest = Rc<dyn ThumbnailRequest>;

pub(crate) fn key_of(request: &dyn ThumbnailRequest) -> RequestKey {
    RequestKey::new(request.content_id(), request.icon_size_px())
}

pub(crate) fn generation_request_of(request: &dyn ThumbnailRequest) -> GenerationRequest {
    GenerationRequest {
        content_id: request.content_id().to_owned(),
        file_path: request.file_path().to_path_buf(),
        mime_type: request.mime_type().to_owned(),
        icon_size_px: request.icon_size_px(),
    }
}

/// Identity, not equality: two distinct requests for the same key are two waiters.
pub(crate) fn same_request(a: &SharedRequest, b: &SharedRequest) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

type RetrievedCallback = Box<dyn Fn(&str, Option<DecodedImage>)>;

/// [`ThumbnailRequest`] backed by a closure.
pub struct CallbackRequest {
    content_id: String,
    file_path: PathBuf,
    mime_type: String,
    icon_size_px: u32,
    supplied: Option<DecodedImage>,
    callback: RetrievedCallback,
}

impl CallbackRequest {
    pub fn new<F>(
        content_id: impl Into<String>,
        file_path: impl AsRef<Path>,
        mime_type: impl Into<String>,
        icon_size_px: u32,
        callback: F,
    ) -> Self
    where
        F: Fn(&str, Option<DecodedImage>) + 'static,
    {
        Self {
            content_id: content_id.into(),
            file_path: file_path.as_ref().to_path_buf(),
            mime_type: mime_type.into(),
            icon_size_px,
            supplied: None,
            callback: Box::new(callback),
        }
    }

    pub fn with_supplied_thumbnail(mut self, thumbnail: DecodedImage) -> Self {
        self.supplied = Some(thumbnail);
        self
    }

    pub fn shared(self) -> SharedRequest {
        Rc::new(self)
    }
}

impl ThumbnailRequest for CallbackRequest {
    fn content_id(&self) -> &str {
        &self.content_id
    }

    fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn icon_size_px(&self) -> u32 {
        self.icon_size_px
    }

    fn on_thumbnail_retrieved(&self, content_id: &str, thumbnail: Option<DecodedImage>) {
        (self.callback)(content_id, thumbnail)
    }

    fn supplied_thumbnail(&self) -> Option<DecodedImage> {
        self.supplied.clone()
    }
}
