//! In-memory thumbnail caches with LRU eviction
//!
//! [`ThumbnailMemoryCache`] holds decoded images bounded by total byte size.
//! [`NegativeCache`] remembers content ids whose last generation produced no
//! thumbnail, bounded by entry count.
//!
//! Both are owned by the coordinator and mutated from its single sequencing
//! context, so neither carries a lock.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::decoded::DecodedImage;
use crate::key::RequestKey;

/// Statistics about memory cache usage
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryCacheStats {
    /// Number of images currently in cache
    pub entry_count: usize,

    /// Total bytes used by cached images
    pub memory_used: usize,

    /// Maximum bytes allowed
    pub memory_limit: usize,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of images evicted due to memory pressure
    pub evictions: u64,
}

impl MemoryCacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Decoded thumbnails keyed by (content id, size), evicted least recently used
/// first once the byte budget is exceeded.
///
/// # Example
///
/// ```
/// use thumbnail_cache::{DecodedImage, RequestKey, ThumbnailMemoryCache};
///
/// let mut cache = ThumbnailMemoryCache::new(1024 * 1024);
/// let key = RequestKey::new("download-7", 64);
///
/// cache.put(key.clone(), DecodedImage::filled(64, 64, [0, 0, 0, 255]));
/// assert!(cache.get(&key).is_some());
/// ```
pub struct ThumbnailMemoryCache {
    entries: HashMap<RequestKey, DecodedImage>,

    /// Most recently used at back, least recently used at front
    lru_queue: VecDeque<RequestKey>,

    memory_used: usize,
    memory_limit: usize,
    stats: MemoryCacheStats,
}

impl ThumbnailMemoryCache {
    /// Create a cache bounded to `memory_limit` bytes of decoded pixels.
    ///
    /// A zero budget is a configuration error and is rejected upstream by
    /// `ThumbnailConfig::validate`.
    pub fn new(memory_limit: usize) -> Self {
        debug_assert!(memory_limit > 0, "memory cache budget must be positive");
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            memory_used: 0,
            memory_limit,
            stats: MemoryCacheStats {
                memory_limit,
                ..Default::default()
            },
        }
    }

    /// Move a key to the back of the LRU queue
    fn touch(&mut self, key: &RequestKey) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.clone());
    }

    fn evict_lru(&mut self) -> Option<DecodedImage> {
        let key = self.lru_queue.pop_front()?;
        let image = self.entries.remove(&key)?;
        self.memory_used = self.memory_used.saturating_sub(image.byte_size());
        self.stats.evictions += 1;
        log::trace!("memory cache evicted {}", key);
        Some(image)
    }

    fn evict_to_fit(&mut self, required_size: usize) {
        while self.memory_used + required_size > self.memory_limit && !self.entries.is_empty() {
            if self.evict_lru().is_none() {
                break;
            }
        }
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.memory_used = self.memory_used;
    }

    /// Store an image, replacing any previous value for the key.
    ///
    /// Returns `false` when the image alone exceeds the whole budget; such an
    /// image is not cached (and any previous value for the key is dropped).
    pub fn put(&mut self, key: RequestKey, image: DecodedImage) -> bool {
        if let Some(old) = self.entries.remove(&key) {
            self.memory_used = self.memory_used.saturating_sub(old.byte_size());
            self.lru_queue.retain(|k| k != &key);
        }

        let size = image.byte_size();
        if size > self.memory_limit {
            log::debug!(
                "thumbnail {} ({} bytes) exceeds memory budget of {} bytes",
                key,
                size,
                self.memory_limit
            );
            self.sync_stats();
            return false;
        }

        self.evict_to_fit(size);
        self.memory_used += size;
        self.touch(&key);
        self.entries.insert(key, image);
        self.sync_stats();
        true
    }

    /// Look up an image, marking it most recently used on a hit.
    pub fn get(&mut self, key: &RequestKey) -> Option<DecodedImage> {
        match self.entries.get(key).cloned() {
            Some(image) => {
                self.touch(key);
                self.stats.hits += 1;
                Some(image)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Check for a key without touching LRU order or statistics.
    pub fn contains(&self, key: &RequestKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &RequestKey) -> Option<DecodedImage> {
        let image = self.entries.remove(key)?;
        self.memory_used = self.memory_used.saturating_sub(image.byte_size());
        self.lru_queue.retain(|k| k != key);
        self.sync_stats();
        Some(image)
    }

    /// Drop every size cached for `content_id`. Returns how many were removed.
    pub fn remove_content(&mut self, content_id: &str) -> usize {
        let keys: Vec<RequestKey> = self
            .entries
            .keys()
            .filter(|k| k.content_id() == content_id)
            .cloned()
            .collect();
        for key in &keys {
            self.remove(key);
        }
        keys.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru_queue.clear();
        self.memory_used = 0;
        self.sync_stats();
    }

    pub fn stats(&self) -> MemoryCacheStats {
        self.stats
    }

    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Content ids whose last generation attempt yielded no thumbnail.
///
/// Keyed by content id alone: one failure at any size short-circuits every
/// size for that id until a later success clears the entry.
pub struct NegativeCache {
    entries: HashSet<String>,
    lru_queue: VecDeque<String>,
    capacity: usize,
    evictions: u64,
}

impl NegativeCache {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "negative cache capacity must be positive");
        Self {
            entries: HashSet::new(),
            lru_queue: VecDeque::new(),
            capacity: capacity.max(1),
            evictions: 0,
        }
    }

    fn touch(&mut self, content_id: &str) {
        self.lru_queue.retain(|id| id != content_id);
        self.lru_queue.push_back(content_id.to_owned());
    }

    pub fn insert(&mut self, content_id: &str) {
        if !self.entries.contains(content_id) {
            while self.entries.len() >= self.capacity {
                let Some(oldest) = self.lru_queue.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
                self.evictions += 1;
            }
            self.entries.insert(content_id.to_owned());
        }
        self.touch(content_id);
    }

    /// Hit test; a hit refreshes recency.
    pub fn contains(&mut self, content_id: &str) -> bool {
        if self.entries.contains(content_id) {
            self.touch(content_id);
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, content_id: &str) -> bool {
        if self.entries.remove(content_id) {
            self.lru_queue.retain(|id| id != content_id);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru_queue.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }
}
