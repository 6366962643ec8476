//! Priority-ordered job queue
//!
//! Jobs are dequeued by priority, then in submission order within the same
//! priority. Workers block on the queue with a timeout instead of spinning.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Job priority levels
///
/// Higher values are executed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPriority {
    /// Disk housekeeping nobody is waiting on
    Maintenance = 0,

    /// Thumbnail lookups with callers waiting for the result
    Retrieval = 1,
}

/// Unique job identifier
pub type JobId = u64;

/// Work a job carries out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobType {
    /// Look up a thumbnail on disk, generating it on a miss
    RetrieveThumbnail {
        content_id: String,
        file_path: PathBuf,
        mime_type: String,
        icon_size_px: u32,
    },

    /// Delete every stored size of a content id
    RemoveThumbnails { content_id: String },
}

impl JobType {
    pub fn content_id(&self) -> &str {
        match self {
            JobType::RetrieveThumbnail { content_id, .. } => content_id,
            JobType::RemoveThumbnails { content_id } => content_id,
        }
    }
}

/// A scheduled job
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub priority: JobPriority,
    pub job_type: JobType,

    /// Submission order, for FIFO within a priority level
    insertion_order: u64,
}

impl Job {
    pub fn new(id: JobId, priority: JobPriority, job_type: JobType, insertion_order: u64) -> Self {
        Self {
            id,
            priority,
            job_type,
            insertion_order,
        }
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            // BinaryHeap is a max heap: earlier submissions must compare greater
            Ordering::Equal => other.insertion_order.cmp(&self.insertion_order),
            other => other,
        }
    }
}

struct QueueState {
    heap: BinaryHeap<Job>,
    next_job_id: JobId,
    insertion_counter: u64,
}

/// Thread-safe priority queue of jobs.
pub(crate) struct PriorityQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl PriorityQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_job_id: 1,
                insertion_counter: 0,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push a job and wake one waiting worker. Returns the assigned id.
    pub(crate) fn push(&self, priority: JobPriority, job_type: JobType) -> JobId {
        let mut state = self.lock();
        let job_id = state.next_job_id;
        state.next_job_id += 1;

        let insertion_order = state.insertion_counter;
        state.insertion_counter += 1;

        state
            .heap
            .push(Job::new(job_id, priority, job_type, insertion_order));
        drop(state);

        self.available.notify_one();
        job_id
    }

    pub(crate) fn pop(&self) -> Option<Job> {
        self.lock().heap.pop()
    }

    /// Pop the next job, waiting up to `timeout` for one to arrive.
    ///
    /// Returns early (possibly with `None`) on any wake-up so callers can
    /// re-check their shutdown flag.
    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<Job> {
        let mut state = self.lock();
        if state.heap.is_empty() {
            state = self
                .available
                .wait_timeout(state, timeout)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        state.heap.pop()
    }

    /// Wake every waiting worker, e.g. so they notice a shutdown.
    pub(crate) fn wake_all(&self) {
        self.available.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    /// Remove all jobs matching a predicate. Returns the removed ids.
    pub(crate) fn remove_if<F>(&self, predicate: F) -> Vec<JobId>
    where
        F: Fn(&Job) -> bool,
    {
        let mut state = self.lock();
        let (removed, remaining): (Vec<Job>, Vec<Job>) =
            state.heap.drain().partition(|job| predicate(job));
        state.heap = remaining.into_iter().collect();
        removed.into_iter().map(|job| job.id).collect()
    }
}
