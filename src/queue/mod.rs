//! In-process job queue: a fixed pool of workers draining a FIFO of
//! submitted jobs, with per-job status tracked in an in-memory registry.
//!
//! Submission is non-blocking and fire-and-forget; callers observe
//! progress by polling [`QueueManager::get`] / [`QueueManager::list`].
//! There is no retry and no persistence: a failed job is final, and the
//! registry lives only as long as the process.

mod handler;
mod job;
mod manager;
mod worker;

pub use handler::JobHandler;
pub use job::{Job, JobStatus};
pub use manager::QueueManager;
pub use worker::NO_HANDLER_ERROR;
