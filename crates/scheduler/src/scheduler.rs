//! Job scheduler
//!
//! Ties the priority queue to the cancellation registry and keeps lifecycle
//! statistics for submitted jobs.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::cancel::{CancellationRegistry, CancellationToken};
use crate::priority::{Job, JobId, JobPriority, JobType, PriorityQueue};

/// Job scheduler statistics
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Total jobs submitted
    pub jobs_submitted: u64,

    /// Total jobs completed (including ones skipped after cancellation)
    pub jobs_completed: u64,

    /// Total jobs removed from the queue before running
    pub jobs_cancelled: u64,

    /// Current queue size
    pub queue_size: usize,
}

impl SchedulerStats {
    /// Jobs submitted but neither completed nor cancelled
    pub fn pending_jobs(&self) -> u64 {
        self.jobs_submitted
            .saturating_sub(self.jobs_completed)
            .saturating_sub(self.jobs_cancelled)
    }
}

/// Thread-safe job scheduler.
///
/// Every submitted job gets a cancellation token that stays registered until
/// the job completes or is removed from the queue.
pub struct JobScheduler {
    queue: PriorityQueue,
    stats: Mutex<SchedulerStats>,
    cancellation: CancellationRegistry,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            stats: Mutex::new(SchedulerStats::default()),
            cancellation: CancellationRegistry::new(),
        }
    }

    fn lock_stats(&self) -> MutexGuard<'_, SchedulerStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a job. Returns its id and cancellation token.
    pub fn submit(&self, priority: JobPriority, job_type: JobType) -> (JobId, CancellationToken) {
        let job_id = self.queue.push(priority, job_type);
        let token = self.cancellation.register(job_id);
        self.lock_stats().jobs_submitted += 1;
        (job_id, token)
    }

    /// Take the next job without waiting.
    pub fn next_job(&self) -> Option<Job> {
        self.queue.pop()
    }

    /// Take the next job, waiting up to `timeout` for one.
    pub fn next_job_timeout(&self, timeout: Duration) -> Option<Job> {
        self.queue.pop_timeout(timeout)
    }

    pub fn complete_job(&self, job_id: JobId) {
        self.lock_stats().jobs_completed += 1;
        self.cancellation.unregister(job_id);
    }

    /// Cancel every queued and running job. Returns the number of tokens cancelled.
    pub fn cancel_all(&self) -> usize {
        let cancelled = self.cancellation.cancel_all();
        let removed = self.queue.remove_if(|_| true);

        if !removed.is_empty() {
            self.lock_stats().jobs_cancelled += removed.len() as u64;
            for job_id in removed {
                self.cancellation.unregister(job_id);
            }
        }
        self.queue.wake_all();
        cancelled
    }

    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Wake idle workers without queueing anything.
    pub fn wake_workers(&self) {
        self.queue.wake_all();
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut stats = self.lock_stats().clone();
        stats.queue_size = self.queue.len();
        stats
    }

    /// Token for a queued or running job, `None` once it has completed.
    pub fn get_cancellation_token(&self, job_id: JobId) -> Option<CancellationToken> {
        self.cancellation.get(job_id)
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}
