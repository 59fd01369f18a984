/// Failure taxonomy for a batch job.
///
/// Whether a failure ends in the synthetic fallback depends on the phase in
/// which it occurs; see [`BatchError::triggers_fallback`]. Transport errors
/// while polling are never surfaced as `BatchError` at all.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BatchError {
    /// The request was rejected locally before any network call.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The network call could not complete or returned a non-2xx status.
    #[error("Transport error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Transport {
        /// HTTP status code, when the server answered at all.
        status: Option<u16>,
        message: String,
    },

    /// The service reported an explicit `error` status for the session.
    #[error("Server processing failed: {0}")]
    ServerProcessing(String),

    /// The results payload did not have the expected shape.
    #[error("Malformed result: {0}")]
    MalformedResult(String),

    /// The configured poll ceiling was reached without a terminal status.
    #[error("No terminal status after {attempts} poll attempts")]
    PollLimitExceeded { attempts: u32 },

    /// The job was cancelled or reset while the operation was in flight.
    #[error("Job was cancelled")]
    Cancelled,
}

impl BatchError {
    /// Shorthand for a transport failure without an HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Whether a failure of this kind after submission ends in the
    /// synthetic fallback instead of being surfaced as-is.
    ///
    /// Submission failures never reach the fallback regardless of kind;
    /// the orchestrator only consults this after a session id exists.
    pub fn triggers_fallback(&self) -> bool {
        match self {
            Self::Transport { .. }
            | Self::ServerProcessing(_)
            | Self::MalformedResult(_)
            | Self::PollLimitExceeded { .. } => true,
            Self::Validation(_) | Self::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_message_includes_status_when_known() {
        let err = BatchError::Transport {
            status: Some(502),
            message: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "Transport error (502): bad gateway");
    }

    #[test]
    fn transport_message_without_status() {
        let err = BatchError::transport("connection refused");
        assert_eq!(err.to_string(), "Transport error: connection refused");
    }

    #[test]
    fn validation_and_cancel_never_fall_back() {
        assert!(!BatchError::Validation("empty".into()).triggers_fallback());
        assert!(!BatchError::Cancelled.triggers_fallback());
        assert!(BatchError::ServerProcessing("boom".into()).triggers_fallback());
        assert!(BatchError::PollLimitExceeded { attempts: 3 }.triggers_fallback());
    }
}
