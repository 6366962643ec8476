//! Request coordinator.
//!
//! All state lives on the owning context. Background workers only touch the
//! disk store and the generator; their results come back as [`Completion`]s
//! on a channel and are applied by [`ThumbnailProvider::run_until_idle`].

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use thumbnail_cache::{
    CacheError, DecodedImage, DiskThumbnailStore, GenerationRequest, MemoryCacheStats,
    NegativeCache, RequestKey, ThumbnailConfig, ThumbnailGenerator, ThumbnailMemoryCache,
};
use thumbnail_scheduler::{
    run_job, CancellationToken, Job, JobExecutor, JobPriority, JobScheduler, JobType, WorkerPool,
    WorkerPoolConfig,
};

use crate::pending::PendingQueue;
use crate::request::{generation_request_of, key_of, same_request, SharedRequest};

/// Result of one disk retrieval, posted back to the owning context.
#[derive(Debug)]
struct Completion {
    key: RequestKey,
    thumbnail: Option<DecodedImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    ProcessQueue,
}

/// Counters for the coordinator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderStats {
    /// Requests accepted by `get_thumbnail`
    pub requests: u64,
    /// Requests ignored for having no content id
    pub rejected: u64,
    /// Requests that joined an in-flight generation
    pub coalesced: u64,
    /// Requests answered from the memory cache
    pub memory_hits: u64,
    /// Requests answered `None` from the negative cache
    pub negative_hits: u64,
    /// Keys handed to the disk/generation stage
    pub dispatched: u64,
    /// Retrieval results applied
    pub completed: u64,
    /// Completions that produced no thumbnail
    pub failures: u64,
    /// Pending requests withdrawn by `cancel_retrieval`
    pub canceled: u64,
    /// Keys currently waiting for a slot
    pub pending: usize,
    /// Keys currently being retrieved
    pub in_flight: usize,
}

/// Coordinates thumbnail requests across the memory cache, the negative
/// cache, and the disk/generation stage.
///
/// Not `Send`: create it on the context that will call it and drive it from
/// there with [`run_until_idle`](Self::run_until_idle) or
/// [`wait_for_completion`](Self::wait_for_completion).
pub struct ThumbnailProvider {
    config: ThumbnailConfig,
    memory_cache: ThumbnailMemoryCache,
    negative_cache: NegativeCache,

    pending: PendingQueue<SharedRequest>,
    in_progress: HashMap<RequestKey, Vec<SharedRequest>>,
    tasks: VecDeque<Task>,
    /// A `ProcessQueue` task is already in `tasks`.
    process_scheduled: bool,

    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,

    disk: DiskThumbnailStore,
    scheduler: Arc<JobScheduler>,
    executor: JobExecutor,
    /// `None` runs disk jobs inline on the owning context.
    workers: Option<WorkerPool>,
    alive: CancellationToken,

    stats: ProviderStats,
    destroyed: bool,
}

impl ThumbnailProvider {
    /// Open the disk store at `config.disk_cache_dir`, index whatever it
    /// already holds, and start the worker pool.
    pub fn new(
        config: ThumbnailConfig,
        generator: Arc<dyn ThumbnailGenerator>,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        let disk = DiskThumbnailStore::new(&config.disk_cache_dir, config.disk_cache_bytes)?;
        match disk.load_from_disk() {
            Ok(count) => log::info!(
                "indexed {} cached thumbnails in {}",
                count,
                config.disk_cache_dir.display()
            ),
            Err(e) => log::warn!(
                "could not index thumbnail cache {}: {}",
                config.disk_cache_dir.display(),
                e
            ),
        }
        Self::with_disk_store(config, disk, generator)
    }

    /// Build a provider around an existing disk store.
    pub fn with_disk_store(
        config: ThumbnailConfig,
        disk: DiskThumbnailStore,
        generator: Arc<dyn ThumbnailGenerator>,
    ) -> Result<Self, CacheError> {
        config.validate()?;

        let (completion_tx, completion_rx) = mpsc::channel();
        let alive = CancellationToken::new();
        let scheduler = Arc::new(JobScheduler::new());
        let executor = disk_executor(disk.clone(), generator, completion_tx.clone(), alive.clone());

        let workers = if config.worker_threads == 0 {
            None
        } else {
            let pool_config =
                WorkerPoolConfig::new(config.worker_threads).with_thread_name("thumbnail-disk");
            Some(WorkerPool::new(scheduler.clone(), executor.clone(), pool_config)?)
        };

        log::debug!(
            "thumbnail provider ready: {} concurrent, {} workers, {} byte memory budget",
            config.max_concurrent_requests,
            config.worker_threads,
            config.memory_cache_bytes
        );

        Ok(Self {
            memory_cache: ThumbnailMemoryCache::new(config.memory_cache_bytes),
            negative_cache: NegativeCache::new(config.negative_cache_entries),
            pending: PendingQueue::new(),
            in_progress: HashMap::new(),
            tasks: VecDeque::new(),
            process_scheduled: false,
            completion_tx,
            completion_rx,
            disk,
            scheduler,
            executor,
            workers,
            alive,
            stats: ProviderStats::default(),
            destroyed: false,
            config,
        })
    }

    /// Ask for a thumbnail.
    ///
    /// Memory hits and known failures are answered before this returns.
    /// Everything else is queued and answered from a later
    /// [`run_until_idle`](Self::run_until_idle).
    pub fn get_thumbnail(&mut self, request: SharedRequest) {
        if self.destroyed {
            log::warn!("thumbnail request for {} after destroy", request.content_id());
            return;
        }
        if request.content_id().is_empty() {
            self.stats.rejected += 1;
            log::debug!("ignoring thumbnail request without a content id");
            return;
        }

        self.stats.requests += 1;
        let key = key_of(request.as_ref());

        if let Some(waiters) = self.in_progress.get_mut(&key) {
            if !waiters.iter().any(|w| same_request(w, &request)) {
                waiters.push(request);
            }
            self.stats.coalesced += 1;
            log::trace!("joined in-flight retrieval for {}", key);
            return;
        }

        if self.negative_cache.contains(key.content_id()) {
            self.stats.negative_hits += 1;
            log::trace!("negative cache hit for {}", key);
            deliver(&request, key.content_id(), None);
            return;
        }

        if let Some(image) = self.memory_cache.get(&key) {
            self.stats.memory_hits += 1;
            deliver(&request, key.content_id(), Some(image));
            return;
        }

        if !self.pending.any_waiter(&key, |w| same_request(w, &request)) {
            self.pending.push(key, request);
        }
        self.post(Task::ProcessQueue);
    }

    /// Withdraw a request that is still waiting for a slot.
    ///
    /// Returns `false` once its key is being retrieved; the request will be
    /// answered with the rest of that key's waiters.
    pub fn cancel_retrieval(&mut self, request: &SharedRequest) -> bool {
        let key = key_of(request.as_ref());
        if self.in_progress.contains_key(&key) {
            log::trace!("{} already in flight, not canceling", key);
            return false;
        }

        let removed = self.pending.remove_waiter(&key, |w| same_request(w, request));
        if removed {
            self.stats.canceled += 1;
            log::debug!("canceled pending request for {}", key);
        }
        removed
    }

    /// Delete every cached size of `content_id` from disk.
    ///
    /// Runs as a low-priority job behind queued retrievals. The memory cache
    /// and the negative cache are left alone.
    pub fn remove_thumbnails_from_disk(&mut self, content_id: &str) {
        if self.destroyed || content_id.is_empty() {
            return;
        }
        self.scheduler.submit(
            JobPriority::Maintenance,
            JobType::RemoveThumbnails {
                content_id: content_id.to_owned(),
            },
        );
        self.run_inline_jobs();
    }

    /// Apply queued work and every completion that has already arrived.
    ///
    /// Returns the number of tasks and completions processed.
    pub fn run_until_idle(&mut self) -> usize {
        let mut processed = 0;
        loop {
            if let Some(task) = self.tasks.pop_front() {
                match task {
                    Task::ProcessQueue => {
                        self.process_scheduled = false;
                        self.process_next_request();
                    }
                }
                processed += 1;
                continue;
            }

            match self.completion_rx.try_recv() {
                Ok(completion) => {
                    self.on_thumbnail_retrieved(completion);
                    processed += 1;
                }
                Err(_) => break,
            }
        }
        processed
    }

    /// Run queued work, then block up to `timeout` for the next completion.
    ///
    /// Returns whether anything was processed. Does not block when nothing is
    /// in flight.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> bool {
        if self.destroyed {
            return false;
        }
        if self.run_until_idle() > 0 {
            return true;
        }
        if self.in_progress.is_empty() {
            return false;
        }

        match self.completion_rx.recv_timeout(timeout) {
            Ok(completion) => {
                self.on_thumbnail_retrieved(completion);
                self.run_until_idle();
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("completion channel closed");
                false
            }
        }
    }

    /// Nothing pending, nothing in flight, no queued tasks.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_progress.is_empty() && self.tasks.is_empty()
    }

    /// Stop all work. Queued and in-flight requests are dropped without a
    /// callback and results arriving afterwards are discarded.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.alive.cancel();

        let canceled_jobs = self.scheduler.cancel_all();
        if let Some(workers) = self.workers.take() {
            workers.shutdown();
        }

        let dropped = self.pending.waiter_count()
            + self.in_progress.values().map(Vec::len).sum::<usize>();
        self.pending.clear();
        self.in_progress.clear();
        self.tasks.clear();
        self.process_scheduled = false;
        self.memory_cache.clear();
        self.negative_cache.clear();
        while self.completion_rx.try_recv().is_ok() {}

        log::info!(
            "thumbnail provider destroyed: {} waiters dropped, {} jobs canceled",
            dropped,
            canceled_jobs
        );
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn stats(&self) -> ProviderStats {
        ProviderStats {
            pending: self.pending.len(),
            in_flight: self.in_progress.len(),
            ..self.stats
        }
    }

    pub fn memory_cache_stats(&self) -> MemoryCacheStats {
        self.memory_cache.stats()
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.config
    }

    pub fn disk_store(&self) -> &DiskThumbnailStore {
        &self.disk
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_progress.len()
    }

    /// Queue `task` unless an identical one is already waiting.
    fn post(&mut self, task: Task) {
        match task {
            Task::ProcessQueue if self.process_scheduled => return,
            Task::ProcessQueue => self.process_scheduled = true,
        }
        self.tasks.push_back(task);
    }

    /// Take the head of the pending queue and answer it from memory or
    /// dispatch it, if a slot is free.
    fn process_next_request(&mut self) {
        let Some(key) = self.pending.front_key().cloned() else {
            return;
        };

        // An earlier completion may have filled the cache since this was queued.
        if self.memory_cache.contains(&key) {
            let waiters = self.pending.take(&key).unwrap_or_default();
            if let Some(image) = self.memory_cache.get(&key) {
                self.stats.memory_hits += waiters.len() as u64;
                for waiter in &waiters {
                    deliver(waiter, key.content_id(), Some(image.clone()));
                }
            }
            self.post(Task::ProcessQueue);
            return;
        }

        if self.in_progress.len() >= self.config.max_concurrent_requests {
            log::trace!(
                "{} retrievals in flight, {} waiting",
                self.in_progress.len(),
                self.pending.len()
            );
            return;
        }

        let waiters = self.pending.take(&key).unwrap_or_default();
        let Some(lead) = waiters.first().cloned() else {
            self.post(Task::ProcessQueue);
            return;
        };
        debug_assert!(!self.in_progress.contains_key(&key), "{key} dispatched twice");
        self.in_progress.insert(key.clone(), waiters);
        self.dispatch(key, &lead);
        self.post(Task::ProcessQueue);
    }

    fn dispatch(&mut self, key: RequestKey, lead: &SharedRequest) {
        self.stats.dispatched += 1;

        if let Some(image) = lead.supplied_thumbnail() {
            log::debug!("{} supplied its own thumbnail", key);
            // The receiver lives in `self`, so this cannot fail.
            let _ = self.completion_tx.send(Completion {
                key,
                thumbnail: Some(image),
            });
            return;
        }

        log::debug!("retrieving thumbnail {}", key);
        let GenerationRequest {
            content_id,
            file_path,
            mime_type,
            icon_size_px,
        } = generation_request_of(lead.as_ref());
        self.scheduler.submit(
            JobPriority::Retrieval,
            JobType::RetrieveThumbnail {
                content_id,
                file_path,
                mime_type,
                icon_size_px,
            },
        );
        self.run_inline_jobs();
    }

    fn run_inline_jobs(&self) {
        if self.workers.is_some() {
            return;
        }
        while let Some(job) = self.scheduler.next_job() {
            run_job(&self.scheduler, &self.executor, job);
        }
    }

    /// Apply a retrieval result and answer everyone waiting on its key.
    fn on_thumbnail_retrieved(&mut self, completion: Completion) {
        let Completion { key, thumbnail } = completion;
        self.stats.completed += 1;

        // get_thumbnail joins in-flight keys, so a key is never both pending
        // and in progress. Release builds still fold any stragglers in.
        debug_assert!(
            !(self.in_progress.contains_key(&key) && self.pending.contains(&key)),
            "{key} is both pending and in flight"
        );
        let mut waiters = self.in_progress.remove(&key).unwrap_or_default();
        if let Some(stragglers) = self.pending.take(&key) {
            waiters.extend(stragglers);
        }

        if waiters.is_empty() {
            log::debug!("no one waiting for {}", key);
            self.post(Task::ProcessQueue);
            return;
        }

        let content_id = key.content_id();
        match thumbnail {
            Some(image) => {
                self.memory_cache.put(key.clone(), image.clone());
                self.negative_cache.remove(content_id);
                for waiter in &waiters {
                    deliver(waiter, content_id, Some(image.clone()));
                }
            }
            None => {
                self.stats.failures += 1;
                log::debug!("no thumbnail for {}", key);
                self.memory_cache.remove_content(content_id);
                self.negative_cache.insert(content_id);
                for waiter in &waiters {
                    deliver(waiter, content_id, None);
                }
            }
        }

        self.post(Task::ProcessQueue);
    }
}

impl Drop for ThumbnailProvider {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn deliver(request: &SharedRequest, content_id: &str, thumbnail: Option<DecodedImage>) {
    request.on_thumbnail_retrieved(content_id, thumbnail);
}

/// Whether a job's results may still touch the cache.
///
/// Dead once the provider is destroyed or the job's own token is cancelled.
#[derive(Clone)]
struct Liveness {
    provider: CancellationToken,
    job: CancellationToken,
}

impl Liveness {
    fn is_live(&self) -> bool {
        !self.provider.is_cancelled() && !self.job.is_cancelled()
    }
}

/// Job body shared by the worker pool and inline execution.
fn disk_executor(
    disk: DiskThumbnailStore,
    generator: Arc<dyn ThumbnailGenerator>,
    completions: Sender<Completion>,
    alive: CancellationToken,
) -> JobExecutor {
    Arc::new(move |job: &Job, token: &CancellationToken| {
        let liveness = Liveness {
            provider: alive.clone(),
            job: token.clone(),
        };
        if !liveness.is_live() {
            log::debug!("skipping job {} after destroy", job.id);
            return;
        }

        match &job.job_type {
            JobType::RetrieveThumbnail {
                content_id,
                file_path,
                mime_type,
                icon_size_px,
            } => {
                let request = GenerationRequest {
                    content_id: content_id.clone(),
                    file_path: file_path.clone(),
                    mime_type: mime_type.clone(),
                    icon_size_px: *icon_size_px,
                };
                let key = request.key();
                let completions = completions.clone();
                let store_liveness = liveness.clone();

                disk.retrieve_thumbnail(
                    request,
                    generator.as_ref(),
                    move || store_liveness.is_live(),
                    Box::new(move |thumbnail| {
                        if !liveness.is_live() {
                            log::debug!("dropping thumbnail {} after destroy", key);
                            return;
                        }
                        if let Err(mpsc::SendError(lost)) =
                            completions.send(Completion { key, thumbnail })
                        {
                            log::debug!("provider gone, dropping thumbnail {}", lost.key);
                        }
                    }),
                );
            }
            JobType::RemoveThumbnails { content_id } => {
                let removed = disk.remove_content(content_id);
                log::debug!("removed {} cached thumbnails for {}", removed, content_id);
            }
        }
    })
}
