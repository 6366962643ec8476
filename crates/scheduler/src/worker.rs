//! Background worker pool.
//!
//! Workers pull jobs from the [`JobScheduler`], skip the ones whose token was
//! cancelled, run the rest through a shared [`JobExecutor`] and mark them
//! complete. Disk reads, writes and thumbnail generation all happen here so
//! the coordinator's context never blocks on I/O.

use std::io;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use crate::{CancellationToken, Job, JobScheduler};

/// Callback that performs one job.
///
/// Receives the job and its cancellation token. May be invoked concurrently
/// from several workers.
pub type JobExecutor = Arc<dyn Fn(&Job, &CancellationToken) + Send + Sync>;

/// Run one dequeued job to completion on the current thread.
///
/// Shared by the worker loop and by callers that execute jobs inline.
pub fn run_job(scheduler: &JobScheduler, executor: &JobExecutor, job: Job) {
    let job_id = job.id;
    let token = scheduler.get_cancellation_token(job_id).unwrap_or_default();

    if token.is_cancelled() {
        log::debug!("skipping cancelled job {}", job_id);
    } else {
        executor(&job, &token);
    }

    scheduler.complete_job(job_id);
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads to spawn
    pub num_workers: usize,

    /// Longest a worker waits for a job before re-checking for shutdown
    pub poll_interval: Duration,

    /// Thread name prefix; workers are named `<prefix>-<index>`
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new(
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        )
    }
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            poll_interval: Duration::from_millis(100),
            thread_name: "thumbnail-worker".to_string(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Pool of threads executing scheduled jobs.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use thumbnail_scheduler::{
///     CancellationToken, Job, JobPriority, JobScheduler, JobType, WorkerPool, WorkerPoolConfig,
/// };
///
/// let scheduler = Arc::new(JobScheduler::new());
/// let executor = Arc::new(|job: &Job, token: &CancellationToken| {
///     if let JobType::RemoveThumbnails { content_id } = &job.job_type {
///         if !token.is_cancelled() {
///             println!("removing {}", content_id);
///         }
///     }
/// });
///
/// let pool = WorkerPool::new(scheduler.clone(), executor, WorkerPoolConfig::new(2)).unwrap();
/// scheduler.submit(
///     JobPriority::Maintenance,
///     JobType::RemoveThumbnails { content_id: "a".to_string() },
/// );
/// pool.shutdown();
/// ```
pub struct WorkerPool {
    num_workers: usize,
    shutdown: Arc<AtomicBool>,
    scheduler: Arc<JobScheduler>,
}

impl WorkerPool {
    /// Spawn `config.num_workers` threads pulling from `scheduler`.
    pub fn new(
        scheduler: Arc<JobScheduler>,
        executor: JobExecutor,
        config: WorkerPoolConfig,
    ) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));

        for id in 0..config.num_workers {
            let spawned = Worker::spawn(
                format!("{}-{}", config.thread_name, id),
                scheduler.clone(),
                executor.clone(),
                shutdown.clone(),
                config.poll_interval,
            );
            if let Err(e) = spawned {
                // Stop the ones already running before reporting
                shutdown.store(true, Ordering::Release);
                scheduler.wake_workers();
                return Err(e);
            }
        }

        Ok(Self {
            num_workers: config.num_workers,
            shutdown,
            scheduler,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Signal shutdown without waiting. Idle workers exit at once, busy ones
    /// after their current job.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);
        self.scheduler.wake_workers();
    }
}

struct Worker;

impl Worker {
    fn spawn(
        name: String,
        scheduler: Arc<JobScheduler>,
        executor: JobExecutor,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> io::Result<()> {
        // Detached; shutdown never joins.
        thread::Builder::new()
            .name(name)
            .spawn(move || Self::run(scheduler, executor, shutdown, poll_interval))?;
        Ok(())
    }

    fn run(
        scheduler: Arc<JobScheduler>,
        executor: JobExecutor,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) {
        while !shutdown.load(Ordering::Acquire) {
            if let Some(job) = scheduler.next_job_timeout(poll_interval) {
                run_job(&scheduler, &executor, job);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobPriority, JobType};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Instant;

    fn remove(id: &str) -> JobType {
        JobType::RemoveThumbnails {
            content_id: id.to_string(),
        }
    }

    fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    fn fast_config(workers: usize) -> WorkerPoolConfig {
        WorkerPoolConfig::new(workers).with_poll_interval(Duration::from_millis(10))
    }

    #[test]
    fn test_config_builder() {
        let config = WorkerPoolConfig::new(3)
            .with_poll_interval(Duration::from_millis(50))
            .with_thread_name("disk");
        assert_eq!(config.num_workers, 3);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.thread_name, "disk");
        assert!(WorkerPoolConfig::default().num_workers > 0);
    }

    #[test]
    fn test_pool_executes_jobs() {
        let scheduler = Arc::new(JobScheduler::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let executor: JobExecutor = Arc::new(move |_job: &Job, _token: &CancellationToken| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let pool = WorkerPool::new(scheduler.clone(), executor, fast_config(2)).unwrap();
        assert_eq!(pool.num_workers(), 2);

        for i in 0..10 {
            scheduler.submit(JobPriority::Maintenance, remove(&i.to_string()));
        }

        assert!(wait_until(Duration::from_secs(5), || counter.load(Ordering::SeqCst) == 10));
        assert!(wait_until(Duration::from_secs(5), || scheduler.stats().jobs_completed == 10));
        pool.shutdown();
    }

    #[test]
    fn test_cancelled_job_is_skipped() {
        let scheduler = Arc::new(JobScheduler::new());
        let ran = Arc::new(Mutex::new(Vec::new()));
        let log = ran.clone();
        let executor: JobExecutor = Arc::new(move |job: &Job, _token: &CancellationToken| {
            log.lock().unwrap().push(job.job_type.content_id().to_string());
        });

        let (skipped, _) = scheduler.submit(JobPriority::Maintenance, remove("skip"));
        scheduler.submit(JobPriority::Maintenance, remove("run"));
        scheduler.get_cancellation_token(skipped).unwrap().cancel();

        let job = scheduler.next_job().unwrap();
        run_job(&scheduler, &executor, job);
        let job = scheduler.next_job().unwrap();
        run_job(&scheduler, &executor, job);

        assert_eq!(*ran.lock().unwrap(), vec!["run".to_string()]);
        assert_eq!(scheduler.stats().jobs_completed, 2);
    }

    #[test]
    fn test_shutdown_stops_workers() {
        let scheduler = Arc::new(JobScheduler::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let executor: JobExecutor = Arc::new(move |_job: &Job, _token: &CancellationToken| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let pool = WorkerPool::new(scheduler.clone(), executor, fast_config(3)).unwrap();

        pool.shutdown();
        thread::sleep(Duration::from_millis(200));
        scheduler.submit(JobPriority::Maintenance, remove("late"));
        thread::sleep(Duration::from_millis(100));

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(scheduler.has_pending_jobs());
    }
}
