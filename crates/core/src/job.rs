//! The Job: one user-initiated submission and its lifecycle state.

use std::sync::Arc;

use crate::error::BatchError;
use crate::options::ProcessOptions;
use crate::progress::ProgressState;
use crate::types::{JobId, SessionId, Timestamp};

/// One binary image payload with the name it is displayed under.
///
/// The bytes are shared so that the synthetic fallback can reuse them as
/// stand-ins without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Orchestrator lifecycle state.
///
/// `Idle -> Submitting -> Polling -> Fetching -> Completed`, with
/// `Failed` reachable from `Submitting`, `Polling` and `Fetching`, and
/// `Cancelled` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Idle,
    Submitting,
    Polling,
    Fetching,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// No further automatic transition occurs from a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether background work (poller, estimator, fetch) may be running.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Submitting | Self::Polling | Self::Fetching)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Polling => "polling",
            Self::Fetching => "fetching",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One submission, owned exclusively by the orchestrator.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    /// Assigned by the service once the upload succeeds.
    pub session_id: Option<SessionId>,
    pub input_files: Vec<InputFile>,
    pub options: ProcessOptions,
    pub state: JobState,
    pub progress: ProgressState,
    pub created_at: Timestamp,
}

impl Job {
    /// Create a job for the given files.
    ///
    /// Rejects an empty file set with [`BatchError::Validation`].
    pub fn new(input_files: Vec<InputFile>, options: ProcessOptions) -> Result<Self, BatchError> {
        if input_files.is_empty() {
            return Err(BatchError::Validation(
                "at least one image is required".to_string(),
            ));
        }
        let total = input_files.len();
        Ok(Self {
            id: uuid::Uuid::new_v4(),
            session_id: None,
            input_files,
            options,
            state: JobState::Idle,
            progress: ProgressState::new(total),
            created_at: chrono::Utc::now(),
        })
    }

    pub fn total_files(&self) -> usize {
        self.input_files.len()
    }
}
