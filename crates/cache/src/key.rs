//! Request key shared by the memory cache, disk store and coordinator.

use std::fmt;

/// Identifies one thumbnail variant: a content id at a given icon size.
///
/// Two requests with equal keys are duplicates and share one generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
    content_id: String,
    icon_size_px: u32,
}

impl RequestKey {
    pub fn new(content_id: impl Into<String>, icon_size_px: u32) -> Self {
        Self {
            content_id: content_id.into(),
            icon_size_px,
        }
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    pub fn icon_size_px(&self) -> u32 {
        self.icon_size_px
    }

    /// File stem used by the disk store: hex-encoded content id, then the size.
    ///
    /// Content ids are opaque and may contain path separators, so they are
    /// never used verbatim as file names.
    pub fn file_stem(&self) -> String {
        let mut stem = String::with_capacity(self.content_id.len() * 2 + 8);
        for byte in self.content_id.bytes() {
            stem.push_str(&format!("{:02x}", byte));
        }
        stem.push('_');
        stem.push_str(&self.icon_size_px.to_string());
        stem
    }

    /// Inverse of [`RequestKey::file_stem`]. Returns `None` for foreign files.
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        let (hex, size) = stem.rsplit_once('_')?;
        if hex.is_empty() || hex.len() % 2 != 0 {
            return None;
        }

        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
            .collect::<Option<Vec<u8>>>()?;
        let content_id = String::from_utf8(bytes).ok()?;
        let icon_size_px = size.parse().ok()?;

        Some(Self {
            content_id,
            icon_size_px,
        })
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.content_id, self.icon_size_px)
    }
}
