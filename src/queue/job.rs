//! Job record and status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;

/// Status of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the queue for a worker.
    Queued,
    /// A worker is executing the job's handler.
    Processing,
    /// Handler finished and returned a result.
    Completed,
    /// Handler failed; the error message is recorded on the job.
    Failed,
}

impl JobStatus {
    /// Check if this status allows transitioning to another status.
    /// Transitions are strictly forward; terminal states allow none.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Queued, Processing) | (Processing, Completed) | (Processing, Failed)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One unit of queued asynchronous work.
///
/// The identity fields (`id`, `job_type`, `payload`, `created_at`) are set
/// at submission and never change. Status, outcome, and `updated_at` are
/// mutated only by the worker that dequeues the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID.
    pub id: Uuid,
    /// Tag identifying which handler semantics apply.
    #[serde(rename = "type")]
    pub job_type: String,
    /// Caller-supplied data for the handler. Opaque to the queue; the
    /// handler layer defines and validates its own typed shape.
    pub payload: serde_json::Value,
    /// Current status.
    pub status: JobStatus,
    /// Handler result, set only on success.
    pub result: Option<serde_json::Value>,
    /// Handler error message, set only on failure.
    pub error: Option<String>,
    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every status transition.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job in `Queued` state.
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.into(),
            payload,
            status: JobStatus::Queued,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition_to(&mut self, target: JobStatus) -> Result<(), QueueError> {
        if !self.status.can_transition_to(target) {
            return Err(QueueError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the job as picked up by a worker.
    pub(crate) fn mark_processing(&mut self) -> Result<(), QueueError> {
        self.transition_to(JobStatus::Processing)
    }

    /// Record a successful outcome.
    pub(crate) fn complete(&mut self, result: serde_json::Value) -> Result<(), QueueError> {
        self.transition_to(JobStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    /// Record a failed outcome.
    pub(crate) fn fail(&mut self, error: impl Into<String>) -> Result<(), QueueError> {
        self.transition_to(JobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}
