//! Fixed-interval status polling for a submitted session.
//!
//! [`StatusPoller::run`] ticks on a fixed period and issues one
//! `get_status` request per tick until the service reports `done` or
//! `error`, the optional attempt ceiling is reached, or the
//! [`CancellationToken`] is triggered.
//!
//! Requests never overlap: the loop awaits each in-flight call before
//! waiting for the next tick. Cancellation is cooperative. It is checked
//! before each request and again after the in-flight request resolves,
//! in which case that response is discarded.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::{BatchTransport, RemoteStatus};
use crate::config::DEFAULT_POLL_INTERVAL;

/// Tunable parameters for the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Delay before the first request and between subsequent ones.
    pub interval: Duration,
    /// Upper bound on status requests. `None` polls indefinitely.
    pub max_attempts: Option<u32>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

/// Lifecycle of one poller: `Idle -> Active -> {Succeeded, Failed, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Active,
    Succeeded,
    Failed,
    Cancelled,
}

/// How a polling loop ended. `attempts` counts status requests issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The service reported `done`; results can be fetched.
    Done { attempts: u32 },
    /// The service reported `error`.
    ServerError { attempts: u32 },
    /// The attempt ceiling was reached without a terminal status.
    Exhausted { attempts: u32 },
    /// Cancelled from outside.
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    pub fn attempts(self) -> u32 {
        match self {
            Self::Done { attempts }
            | Self::ServerError { attempts }
            | Self::Exhausted { attempts }
            | Self::Cancelled { attempts } => attempts,
        }
    }

    /// Terminal poller state this outcome corresponds to.
    pub fn state(self) -> PollerState {
        match self {
            Self::Done { .. } => PollerState::Succeeded,
            Self::ServerError { .. } | Self::Exhausted { .. } => PollerState::Failed,
            Self::Cancelled { .. } => PollerState::Cancelled,
        }
    }
}

/// Polls one session's status until a terminal outcome.
#[derive(Debug)]
pub struct StatusPoller {
    config: PollerConfig,
    state: PollerState,
    attempts: u32,
}

impl StatusPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            config,
            state: PollerState::Idle,
            attempts: 0,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Status requests issued so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Run the polling loop to completion.
    ///
    /// Transport failures are logged and treated as `pending`; only an
    /// explicit `error` status, the attempt ceiling or cancellation end the
    /// loop without success.
    pub async fn run(
        &mut self,
        transport: &dyn BatchTransport,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        self.state = PollerState::Active;

        let period = self.config.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(session_id, attempts = self.attempts, "Polling cancelled");
                    return self.finish(PollOutcome::Cancelled { attempts: self.attempts });
                }
                _ = ticker.tick() => {}
            }

            if let Some(max) = self.config.max_attempts {
                if self.attempts >= max {
                    tracing::warn!(session_id, attempts = self.attempts, "Poll attempt ceiling reached");
                    return self.finish(PollOutcome::Exhausted { attempts: self.attempts });
                }
            }

            self.attempts += 1;
            let attempt = self.attempts;
            let result = transport.get_status(session_id).await;

            if cancel.is_cancelled() {
                tracing::debug!(session_id, attempt, "Discarding status received after cancellation");
                return self.finish(PollOutcome::Cancelled { attempts: attempt });
            }

            match result {
                Ok(RemoteStatus::Done) => {
                    tracing::info!(session_id, attempt, "Session finished processing");
                    return self.finish(PollOutcome::Done { attempts: attempt });
                }
                Ok(RemoteStatus::Error) => {
                    tracing::warn!(session_id, attempt, "Service reported processing error");
                    return self.finish(PollOutcome::ServerError { attempts: attempt });
                }
                Ok(RemoteStatus::Pending) => {
                    tracing::trace!(session_id, attempt, "Session still pending");
                }
                Err(e) => {
                    tracing::warn!(
                        session_id,
                        attempt,
                        error = %e,
                        "Status request failed, treating as pending",
                    );
                }
            }
        }
    }

    fn finish(&mut self, outcome: PollOutcome) -> PollOutcome {
        self.state = outcome.state();
        outcome
    }
}
