//! Thumbnail Scheduler Library
//!
//! Background job execution for the thumbnail pipeline.
//!
//! Disk lookups, generation and disk maintenance are blocking work that must
//! stay off the coordinator's context. They are submitted to a
//! [`JobScheduler`] and executed by a [`WorkerPool`]. Retrieval jobs run
//! before maintenance jobs, FIFO within each level.
//!
//! # Example
//!
//! ```
//! use thumbnail_scheduler::{JobPriority, JobScheduler, JobType};
//!
//! let scheduler = JobScheduler::new();
//!
//! let (job_id, token) = scheduler.submit(
//!     JobPriority::Maintenance,
//!     JobType::RemoveThumbnails {
//!         content_id: "download-3".to_string(),
//!     },
//! );
//!
//! if let Some(job) = scheduler.next_job() {
//!     assert_eq!(job.id, job_id);
//!     // Worker checks token.is_cancelled() before doing the work
//!     assert!(!token.is_cancelled());
//!     scheduler.complete_job(job.id);
//! }
//! ```

mod cancel;
mod priority;
mod scheduler;
mod worker;

pub use cancel::{CancellationRegistry, CancellationToken};
pub use priority::{Job, JobId, JobPriority, JobType};
pub use scheduler::{JobScheduler, SchedulerStats};
pub use worker::{run_job, JobExecutor, WorkerPool, WorkerPoolConfig};
