//! Persistent thumbnail store with LRU eviction.
//!
//! Encoded thumbnails are written one file per (content id, size) under the
//! cache directory. An in-memory index tracks recency, the running byte total
//! and, per content id, which sizes are on disk. The index is guarded by its
//! own mutex because the store is used from background workers, never from
//! the coordinator's context.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::decoded::DecodedImage;
use crate::error::CacheError;
use crate::generator::{GenerationCallback, GenerationRequest, ThumbnailGenerator};
use crate::key::RequestKey;

const FILE_EXTENSION: &str = "thumb";

/// Statistics for monitoring disk store performance
#[derive(Debug, Clone, Default)]
pub struct DiskCacheStats {
    /// Number of successful lookups
    pub hits: u64,
    /// Number of failed lookups
    pub misses: u64,
    /// Number of entries evicted to stay within the byte budget
    pub evictions: u64,
    /// Number of entries on disk
    pub entry_count: usize,
    /// Running total of encoded bytes on disk
    pub disk_used: usize,
}

impl DiskCacheStats {
    /// Calculate hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate disk utilization (0.0 to 1.0)
    pub fn disk_utilization(&self, limit: usize) -> f64 {
        if limit == 0 {
            0.0
        } else {
            self.disk_used as f64 / limit as f64
        }
    }
}

struct DiskEntry {
    path: PathBuf,
    byte_size: usize,
}

struct StoreState {
    entries: HashMap<RequestKey, DiskEntry>,
    /// front = least recently used, back = most recently used
    lru_queue: VecDeque<RequestKey>,
    /// content id -> sizes currently on disk
    sizes_by_content: HashMap<String, BTreeSet<u32>>,
    stats: DiskCacheStats,
    disk_limit: usize,
    cache_dir: PathBuf,
}

impl StoreState {
    fn touch(&mut self, key: &RequestKey) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.clone());
    }

    fn attach(&mut self, key: RequestKey, entry: DiskEntry) {
        self.stats.disk_used += entry.byte_size;
        self.sizes_by_content
            .entry(key.content_id().to_owned())
            .or_default()
            .insert(key.icon_size_px());
        self.lru_queue.push_back(key.clone());
        self.entries.insert(key, entry);
        self.stats.entry_count = self.entries.len();
    }

    /// Drop an entry from the index without touching its file.
    fn detach(&mut self, key: &RequestKey) -> Option<DiskEntry> {
        let entry = self.entries.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        if let Some(sizes) = self.sizes_by_content.get_mut(key.content_id()) {
            sizes.remove(&key.icon_size_px());
            if sizes.is_empty() {
                self.sizes_by_content.remove(key.content_id());
            }
        }
        self.stats.disk_used = self.stats.disk_used.saturating_sub(entry.byte_size);
        self.stats.entry_count = self.entries.len();
        Some(entry)
    }

    fn delete(&mut self, key: &RequestKey) -> bool {
        match self.detach(key) {
            Some(entry) => {
                remove_file_quietly(&entry.path);
                true
            }
            None => false,
        }
    }

    /// Evict the least recently used entry other than `keep`.
    fn evict_lru(&mut self, keep: Option<&RequestKey>) -> bool {
        let victim = self
            .lru_queue
            .iter()
            .find(|k| Some(*k) != keep)
            .cloned();
        match victim {
            Some(key) => {
                self.delete(&key);
                self.stats.evictions += 1;
                log::debug!("disk store evicted {}", key);
                true
            }
            None => false,
        }
    }

    /// Evict until the running total is back within budget.
    ///
    /// `keep` protects the entry that was just written, so an entry larger
    /// than the whole budget survives its own insert and goes on the next one.
    fn trim(&mut self, keep: Option<&RequestKey>) {
        while self.stats.disk_used > self.disk_limit {
            if !self.evict_lru(keep) {
                break;
            }
        }
    }

    fn reset_index(&mut self) {
        self.entries.clear();
        self.lru_queue.clear();
        self.sizes_by_content.clear();
        self.stats.entry_count = 0;
        self.stats.disk_used = 0;
    }
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            log::warn!("failed to delete {}: {}", path.display(), e);
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Size-bounded LRU store of encoded thumbnails.
///
/// Cloning is cheap and every clone shares the same index, so a clone can be
/// moved into a generation callback and store the result when it arrives.
#[derive(Clone)]
pub struct DiskThumbnailStore {
    state: Arc<Mutex<StoreState>>,
}

impl DiskThumbnailStore {
    /// Open a store in `cache_dir` bounded to `disk_limit` bytes.
    ///
    /// The directory is created if needed. Existing files are not indexed
    /// until [`DiskThumbnailStore::load_from_disk`] is called.
    pub fn new<P: AsRef<Path>>(cache_dir: P, disk_limit: usize) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        fs::create_dir_all(&cache_dir)?;

        let state = StoreState {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            sizes_by_content: HashMap::new(),
            stats: DiskCacheStats::default(),
            disk_limit,
            cache_dir,
        };

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn path_for(cache_dir: &Path, key: &RequestKey) -> PathBuf {
        cache_dir.join(format!("{}.{}", key.file_stem(), FILE_EXTENSION))
    }

    /// Store encoded bytes for `key`, replacing any previous value.
    ///
    /// The previous value's size is subtracted before the new one is added.
    /// Entries are then evicted oldest first until the total fits the budget.
    pub fn put(&self, key: &RequestKey, bytes: &[u8]) -> Result<(), CacheError> {
        let mut state = self.lock();
        let path = Self::path_for(&state.cache_dir, key);

        state.detach(key);
        if let Err(e) = write_file(&path, bytes) {
            remove_file_quietly(&path);
            return Err(e.into());
        }

        state.attach(
            key.clone(),
            DiskEntry {
                path,
                byte_size: bytes.len(),
            },
        );
        state.trim(Some(key));
        Ok(())
    }

    /// Read the encoded bytes for `key`, marking it most recently used.
    ///
    /// A file that disappeared behind the store's back is treated as a miss
    /// and dropped from the index.
    pub fn get(&self, key: &RequestKey) -> Result<Option<Vec<u8>>, CacheError> {
        let mut state = self.lock();

        let Some(path) = state.entries.get(key).map(|entry| entry.path.clone()) else {
            state.stats.misses += 1;
            return Ok(None);
        };

        match fs::read(&path) {
            Ok(bytes) => {
                state.touch(key);
                state.stats.hits += 1;
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("thumbnail file for {} vanished: {}", key, path.display());
                state.detach(key);
                state.stats.misses += 1;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Encode `image` as PNG and store it under `key`.
    pub fn put_image(&self, key: &RequestKey, image: &DecodedImage) -> Result<(), CacheError> {
        let bytes = image.encode_png()?;
        self.put(key, &bytes)
    }

    /// Look up `request` on disk, falling back to `generator` on a miss.
    ///
    /// `callback` fires exactly once: with the decoded hit, with the freshly
    /// generated image (after it has been stored), or with `None` when
    /// generation fails or the disk cannot be read. Storage failures after a
    /// successful generation are logged and do not withhold the image.
    ///
    /// `live` is consulted before the lookup and again before a generated
    /// image is written. Once it returns `false` the store is left untouched:
    /// a request that is already dead gets `None`, and a generation that
    /// finishes afterwards is handed to `callback` without being stored.
    pub fn retrieve_thumbnail<F>(
        &self,
        request: GenerationRequest,
        generator: &dyn ThumbnailGenerator,
        live: F,
        callback: GenerationCallback,
    ) where
        F: Fn() -> bool + Send + 'static,
    {
        let key = request.key();
        if !live() {
            log::trace!("skipping retrieval of {} for a dead request", key);
            callback(None);
            return;
        }

        match self.get(&key) {
            Ok(Some(bytes)) => match DecodedImage::decode(&bytes) {
                Ok(image) => {
                    log::trace!("disk hit for {}", key);
                    callback(Some(image));
                    return;
                }
                Err(e) => {
                    log::warn!("discarding unreadable thumbnail {}: {}", key, e);
                    self.remove(&key);
                }
            },
            Ok(None) => {}
            Err(e) => {
                log::warn!("disk read failed for {}: {}", key, e);
                callback(None);
                return;
            }
        }

        let store = self.clone();
        generator.generate(
            request,
            Box::new(move |thumbnail| {
                match &thumbnail {
                    Some(_) if !live() => {
                        log::debug!("not storing thumbnail {} for a dead request", key);
                    }
                    Some(image) => {
                        if let Err(e) = store.put_image(&key, image) {
                            log::warn!("failed to store thumbnail {}: {}", key, e);
                        }
                    }
                    None => {}
                }
                callback(thumbnail);
            }),
        );
    }

    /// Check for a key without updating LRU order
    pub fn contains(&self, key: &RequestKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Sizes currently stored for `content_id`, ascending.
    pub fn sizes_for(&self, content_id: &str) -> Vec<u32> {
        self.lock()
            .sizes_by_content
            .get(content_id)
            .map(|sizes| sizes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove one entry. Returns whether it was present.
    pub fn remove(&self, key: &RequestKey) -> bool {
        self.lock().delete(key)
    }

    /// Remove every size variant stored for `content_id`.
    ///
    /// Returns the number of entries removed.
    pub fn remove_content(&self, content_id: &str) -> usize {
        let mut state = self.lock();
        let sizes: Vec<u32> = state
            .sizes_by_content
            .get(content_id)
            .map(|sizes| sizes.iter().copied().collect())
            .unwrap_or_default();

        let mut removed = 0;
        for size in sizes {
            if state.delete(&RequestKey::new(content_id, size)) {
                removed += 1;
            }
        }
        state.sizes_by_content.remove(content_id);
        removed
    }

    /// Delete every entry
    pub fn clear(&self) {
        let mut state = self.lock();
        for (_key, entry) in state.entries.drain() {
            remove_file_quietly(&entry.path);
        }
        state.reset_index();
    }

    pub fn stats(&self) -> DiskCacheStats {
        self.lock().stats.clone()
    }

    pub fn disk_limit(&self) -> usize {
        self.lock().disk_limit
    }

    pub fn disk_used(&self) -> usize {
        self.lock().stats.disk_used
    }

    pub fn entry_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Update the byte budget, evicting immediately if usage now exceeds it.
    pub fn set_disk_limit(&self, new_limit: usize) {
        let mut state = self.lock();
        state.disk_limit = new_limit;
        state.trim(None);
    }

    /// Rebuild the index from files already in the cache directory.
    ///
    /// Files are ordered by modification time so the oldest become the first
    /// eviction candidates. Files that do not follow the store's naming scheme
    /// are left alone. Returns the number of entries indexed.
    pub fn load_from_disk(&self) -> Result<usize, CacheError> {
        let mut state = self.lock();
        state.reset_index();

        let mut found = Vec::new();
        for dir_entry in fs::read_dir(&state.cache_dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();

            if path.extension().and_then(|s| s.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(RequestKey::from_file_stem)
            else {
                continue;
            };

            let metadata = dir_entry.metadata()?;
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let entry = DiskEntry {
                path,
                byte_size: metadata.len() as usize,
            };
            found.push((modified, key, entry));
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));
        let count = found.len();
        for (_modified, key, entry) in found {
            state.attach(key, entry);
        }
        state.trim(None);

        log::info!(
            "indexed {} thumbnails ({} bytes) from {}",
            state.entries.len(),
            state.stats.disk_used,
            state.cache_dir.display()
        );
        Ok(count)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.lock().cache_dir.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const KIB: usize = 1024;

    fn create_test_store(limit: usize) -> (DiskThumbnailStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskThumbnailStore::new(dir.path(), limit).unwrap();
        (store, dir)
    }

    fn key(id: &str, size: u32) -> RequestKey {
        RequestKey::new(id, size)
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|_| rand::random::<u8>()).collect()
    }

    /// Generator that answers synchronously and counts calls.
    struct FixedGenerator {
        image: Option<DecodedImage>,
        calls: AtomicUsize,
    }

    impl FixedGenerator {
        fn new(image: Option<DecodedImage>) -> Self {
            Self {
                image,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ThumbnailGenerator for FixedGenerator {
        fn generate(&self, _request: GenerationRequest, callback: GenerationCallback) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            callback(self.image.clone());
        }
    }

    fn generation_request(id: &str, size: u32) -> GenerationRequest {
        GenerationRequest {
            content_id: id.to_string(),
            file_path: PathBuf::from("/media/source.png"),
            mime_type: "image/png".to_string(),
            icon_size_px: size,
        }
    }

    fn retrieve(
        store: &DiskThumbnailStore,
        generator: &FixedGenerator,
        request: GenerationRequest,
    ) -> Option<DecodedImage> {
        let (tx, rx) = std::sync::mpsc::channel();
        store.retrieve_thumbnail(
            request,
            generator,
            || true,
            Box::new(move |image| {
                tx.send(image).unwrap();
            }),
        );
        rx.recv().unwrap()
    }

    #[test]
    fn test_basic_put_get() {
        let (store, _dir) = create_test_store(10 * KIB);
        let bytes = payload(KIB);

        store.put(&key("a", 64), &bytes).unwrap();

        assert_eq!(store.get(&key("a", 64)).unwrap(), Some(bytes));
        assert_eq!(store.disk_used(), KIB);
        assert_eq!(store.entry_count(), 1);
    }

    #[test]
    fn test_miss() {
        let (store, _dir) = create_test_store(10 * KIB);
        assert!(store.get(&key("nope", 64)).unwrap().is_none());

        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_fourth_insert_evicts_exactly_one() {
        let (store, _dir) = create_test_store(10 * KIB);

        for id in ["a", "b", "c", "d"] {
            store.put(&key(id, 64), &payload(3 * KIB)).unwrap();
        }

        assert_eq!(store.entry_count(), 3);
        assert_eq!(store.stats().evictions, 1);
        assert!(store.disk_used() <= 10 * KIB);
        assert_eq!(store.disk_used(), 9 * KIB);
        assert!(!store.contains(&key("a", 64)));
    }

    #[test]
    fn test_lru_evicts_oldest() {
        let (store, _dir) = create_test_store(10 * KIB);
        store.put(&key("a", 64), &payload(4 * KIB)).unwrap();
        store.put(&key("b", 64), &payload(4 * KIB)).unwrap();
        store.put(&key("c", 64), &payload(4 * KIB)).unwrap();

        assert!(!store.contains(&key("a", 64)));
        assert!(store.contains(&key("b", 64)));
        assert!(store.contains(&key("c", 64)));
    }

    #[test]
    fn test_read_refreshes_recency() {
        let (store, _dir) = create_test_store(10 * KIB);
        store.put(&key("a", 64), &payload(4 * KIB)).unwrap();
        store.put(&key("b", 64), &payload(4 * KIB)).unwrap();

        store.get(&key("a", 64)).unwrap();
        store.put(&key("c", 64), &payload(4 * KIB)).unwrap();

        assert!(store.contains(&key("a", 64)));
        assert!(!store.contains(&key("b", 64)));
        assert!(store.contains(&key("c", 64)));
    }

    #[test]
    fn test_repeated_insert_updates_value_and_accounting() {
        let (store, _dir) = create_test_store(10 * KIB);
        let v1 = payload(3 * KIB);
        let v2 = payload(KIB);

        store.put(&key("a", 64), &v1).unwrap();
        store.put(&key("a", 64), &v2).unwrap();

        assert_eq!(store.entry_count(), 1);
        assert_eq!(store.disk_used(), KIB);
        assert_eq!(store.get(&key("a", 64)).unwrap(), Some(v2));
        assert_eq!(store.sizes_for("a"), vec![64]);
    }

    #[test]
    fn test_oversized_entry_survives_until_next_insert() {
        let (store, _dir) = create_test_store(10 * KIB);
        store.put(&key("small", 64), &payload(2 * KIB)).unwrap();
        store.put(&key("huge", 64), &payload(12 * KIB)).unwrap();

        assert!(!store.contains(&key("small", 64)));
        assert!(store.contains(&key("huge", 64)));
        assert_eq!(store.disk_used(), 12 * KIB);

        store.put(&key("next", 64), &payload(KIB)).unwrap();

        assert!(!store.contains(&key("huge", 64)));
        assert!(store.contains(&key("next", 64)));
        assert_eq!(store.disk_used(), KIB);
    }

    #[test]
    fn test_remove_content_clears_every_size() {
        let (store, _dir) = create_test_store(10 * KIB);
        store.put(&key("id", 50), &payload(KIB)).unwrap();
        store.put(&key("id", 70), &payload(KIB)).unwrap();
        store.put(&key("other", 50), &payload(KIB)).unwrap();
        assert_eq!(store.sizes_for("id"), vec![50, 70]);

        assert_eq!(store.remove_content("id"), 2);

        assert!(!store.contains(&key("id", 50)));
        assert!(!store.contains(&key("id", 70)));
        assert!(store.sizes_for("id").is_empty());
        assert!(store.contains(&key("other", 50)));
        assert_eq!(store.disk_used(), KIB);
    }

    #[test]
    fn test_remove_content_unknown_id() {
        let (store, _dir) = create_test_store(10 * KIB);
        assert_eq!(store.remove_content("ghost"), 0);
    }

    #[test]
    fn test_eviction_updates_size_index() {
        let (store, _dir) = create_test_store(5 * KIB);
        store.put(&key("id", 50), &payload(3 * KIB)).unwrap();
        store.put(&key("id", 70), &payload(3 * KIB)).unwrap();

        assert_eq!(store.sizes_for("id"), vec![70]);
    }

    #[test]
    fn test_clear() {
        let (store, dir) = create_test_store(10 * KIB);
        store.put(&key("a", 64), &payload(KIB)).unwrap();
        store.put(&key("b", 64), &payload(KIB)).unwrap();

        store.clear();

        assert_eq!(store.entry_count(), 0);
        assert_eq!(store.disk_used(), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_set_disk_limit_trims() {
        let (store, _dir) = create_test_store(10 * KIB);
        store.put(&key("a", 64), &payload(3 * KIB)).unwrap();
        store.put(&key("b", 64), &payload(3 * KIB)).unwrap();

        store.set_disk_limit(4 * KIB);

        assert_eq!(store.entry_count(), 1);
        assert!(store.contains(&key("b", 64)));
    }

    #[test]
    fn test_vanished_file_is_a_miss() {
        let (store, dir) = create_test_store(10 * KIB);
        store.put(&key("a", 64), &payload(KIB)).unwrap();
        for entry in fs::read_dir(dir.path()).unwrap() {
            fs::remove_file(entry.unwrap().path()).unwrap();
        }

        assert!(store.get(&key("a", 64)).unwrap().is_none());
        assert_eq!(store.entry_count(), 0);
        assert_eq!(store.disk_used(), 0);
    }

    #[test]
    fn test_load_from_disk() {
        let (store, dir) = create_test_store(10 * KIB);
        let bytes = payload(KIB);
        store.put(&key("a", 50), &bytes).unwrap();
        store.put(&key("a", 70), &payload(KIB)).unwrap();
        fs::write(dir.path().join("README.txt"), b"ignored").unwrap();

        let reopened = DiskThumbnailStore::new(dir.path(), 10 * KIB).unwrap();
        assert_eq!(reopened.load_from_disk().unwrap(), 2);

        assert_eq!(reopened.entry_count(), 2);
        assert_eq!(reopened.disk_used(), 2 * KIB);
        assert_eq!(reopened.sizes_for("a"), vec![50, 70]);
        assert_eq!(reopened.get(&key("a", 50)).unwrap(), Some(bytes));
    }

    #[test]
    fn test_retrieve_hit_skips_generator() {
        let (store, _dir) = create_test_store(100 * KIB);
        let image = DecodedImage::filled(16, 16, [1, 2, 3, 255]);
        store.put_image(&key("a", 16), &image).unwrap();
        let generator = FixedGenerator::new(None);

        let result = retrieve(&store, &generator, generation_request("a", 16));

        assert_eq!(result, Some(image));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_retrieve_miss_generates_and_stores() {
        let (store, _dir) = create_test_store(100 * KIB);
        let image = DecodedImage::filled(16, 16, [9, 9, 9, 255]);
        let generator = FixedGenerator::new(Some(image.clone()));

        let result = retrieve(&store, &generator, generation_request("a", 16));

        assert_eq!(result, Some(image));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert!(store.contains(&key("a", 16)));
        assert_eq!(store.sizes_for("a"), vec![16]);
    }

    #[test]
    fn test_retrieve_failure_stores_nothing() {
        let (store, _dir) = create_test_store(100 * KIB);
        let generator = FixedGenerator::new(None);

        assert!(retrieve(&store, &generator, generation_request("a", 16)).is_none());
        assert_eq!(store.entry_count(), 0);
    }

    #[test]
    fn test_retrieve_regenerates_corrupt_entry() {
        let (store, _dir) = create_test_store(100 * KIB);
        store.put(&key("a", 16), b"garbage").unwrap();
        let image = DecodedImage::filled(16, 16, [4, 4, 4, 255]);
        let generator = FixedGenerator::new(Some(image.clone()));

        assert_eq!(retrieve(&store, &generator, generation_request("a", 16)), Some(image));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    /// Reports its result only after the request has been marked dead.
    struct DyingGenerator {
        live: Arc<AtomicBool>,
        image: DecodedImage,
    }

    impl ThumbnailGenerator for DyingGenerator {
        fn generate(&self, _request: GenerationRequest, callback: GenerationCallback) {
            self.live.store(false, Ordering::SeqCst);
            callback(Some(self.image.clone()));
        }
    }

    #[test]
    fn test_retrieve_dead_request_skips_lookup() {
        let (store, _dir) = create_test_store(100 * KIB);
        let generator = FixedGenerator::new(Some(DecodedImage::filled(4, 4, [0, 0, 0, 255])));
        let (tx, rx) = std::sync::mpsc::channel();

        store.retrieve_thumbnail(
            generation_request("a", 16),
            &generator,
            || false,
            Box::new(move |image| tx.send(image).unwrap()),
        );

        assert!(rx.recv().unwrap().is_none());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.entry_count(), 0);
    }

    #[test]
    fn test_retrieve_does_not_store_after_request_dies() {
        let (store, dir) = create_test_store(100 * KIB);
        let live = Arc::new(AtomicBool::new(true));
        let image = DecodedImage::filled(16, 16, [5, 5, 5, 255]);
        let generator = DyingGenerator {
            live: live.clone(),
            image: image.clone(),
        };
        let (tx, rx) = std::sync::mpsc::channel();

        store.retrieve_thumbnail(
            generation_request("a", 16),
            &generator,
            move || live.load(Ordering::SeqCst),
            Box::new(move |image| tx.send(image).unwrap()),
        );

        assert_eq!(rx.recv().unwrap(), Some(image));
        assert_eq!(store.entry_count(), 0);
        assert_eq!(store.disk_used(), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_disk_utilization() {
        let (store, _dir) = create_test_store(10 * KIB);
        store.put(&key("a", 64), &payload(5 * KIB)).unwrap();

        let utilization = store.stats().disk_utilization(store.disk_limit());
        assert!((utilization - 0.5).abs() < f64::EPSILON);
    }
}
