//! Events emitted by the batch orchestrator.
//!
//! Presentation code subscribes through
//! [`BatchOrchestrator::subscribe`](crate::orchestrator::BatchOrchestrator::subscribe)
//! and only ever reads these; it never mutates job state.

use std::sync::Arc;

use batchvision_core::job::JobState;
use batchvision_core::result::BatchResult;
use batchvision_core::types::{JobId, SessionId};
use serde::Serialize;

/// A state change or output of the job currently owned by the orchestrator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    /// The job moved to a new lifecycle state.
    StateChanged { job_id: JobId, state: JobState },

    /// The service accepted the upload and assigned a session.
    Submitted { job_id: JobId, session_id: SessionId },

    /// The estimated processed count changed.
    Progress {
        job_id: JobId,
        processed: usize,
        total: usize,
    },

    /// Real results were fetched and normalized.
    Completed {
        job_id: JobId,
        result: Arc<BatchResult>,
    },

    /// Processing or result retrieval failed; a synthetic result was
    /// generated instead. `result.synthetic` is always `true`.
    FallbackCompleted {
        job_id: JobId,
        result: Arc<BatchResult>,
        /// Human-readable cause of the failure.
        error: String,
    },

    /// The upload itself failed. No fallback is produced.
    SubmissionFailed { job_id: JobId, error: String },

    /// The job failed after submission with an error that is surfaced
    /// as-is instead of being replaced by a synthetic result.
    Failed { job_id: JobId, error: String },

    /// Polling and estimation were stopped by the caller.
    Cancelled { job_id: JobId },

    /// The job was discarded and the orchestrator is idle again.
    Reset,
}

impl BatchEvent {
    /// The job this event belongs to, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Self::StateChanged { job_id, .. }
            | Self::Submitted { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::FallbackCompleted { job_id, .. }
            | Self::SubmissionFailed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Cancelled { job_id } => Some(*job_id),
            Self::Reset => None,
        }
    }

    /// The result carried by a terminal event.
    pub fn result(&self) -> Option<&Arc<BatchResult>> {
        match self {
            Self::Completed { result, .. } | Self::FallbackCompleted { result, .. } => Some(result),
            _ => None,
        }
    }
}
