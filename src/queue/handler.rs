//! The queue's single extension point.

use async_trait::async_trait;

use crate::queue::Job;

/// Business logic executed for each dequeued job.
///
/// Implementations are shared across all workers and must be safe to call
/// concurrently. Returning `Err` fails the job; the error's display string
/// is recorded verbatim on the job record. Failures are contained per job
/// and never affect other jobs or the worker pool.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute one job and return its result mapping.
    async fn handle(&self, job: &Job) -> anyhow::Result<serde_json::Value>;
}
