use std::time::Duration;

use crate::estimator::EstimatorConfig;
use crate::poller::PollerConfig;

/// Default service location when `BATCHVISION_API_URL` is not set.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Default period between status requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default period between simulated progress steps.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(800);

/// Default period between liveness probes.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Client configuration loaded from environment variables.
///
/// [`Default`] is the standard timing: 1 s polling, 0.8 s
/// progress steps, 30 s health probes, no poll ceiling, no request timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base location of the processing service.
    pub api_url: String,
    pub poll_interval: Duration,
    pub progress_interval: Duration,
    pub health_interval: Duration,
    /// Give up polling after this many status requests. `None` polls until
    /// a terminal status or cancellation.
    pub max_poll_attempts: Option<u32>,
    /// Per-request HTTP timeout. `None` leaves requests unbounded.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            health_interval: DEFAULT_HEALTH_INTERVAL,
            max_poll_attempts: None,
            request_timeout: None,
        }
    }
}

/// A configuration value could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                  |
    /// |------------------------|--------------------------|
    /// | `BATCHVISION_API_URL`  | `http://127.0.0.1:8000`  |
    /// | `POLL_INTERVAL_MS`     | `1000`                   |
    /// | `PROGRESS_INTERVAL_MS` | `800`                    |
    /// | `HEALTH_INTERVAL_SECS` | `30`                     |
    /// | `MAX_POLL_ATTEMPTS`    | unset (unbounded)        |
    /// | `REQUEST_TIMEOUT_SECS` | unset (no timeout)       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from an arbitrary
    /// key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = lookup("BATCHVISION_API_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.api_url);

        let poll_interval = parse_positive(&lookup, "POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);

        let progress_interval = parse_positive(&lookup, "PROGRESS_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.progress_interval);

        let health_interval = parse_positive(&lookup, "HEALTH_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.health_interval);

        let max_poll_attempts = parse_positive(&lookup, "MAX_POLL_ATTEMPTS")?
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX));

        let request_timeout = parse_positive(&lookup, "REQUEST_TIMEOUT_SECS")?.map(Duration::from_secs);

        Ok(Self {
            api_url,
            poll_interval,
            progress_interval,
            health_interval,
            max_poll_attempts,
            request_timeout,
        })
    }

    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            interval: self.poll_interval,
            max_attempts: self.max_poll_attempts,
        }
    }

    pub fn estimator(&self) -> EstimatorConfig {
        EstimatorConfig {
            interval: self.progress_interval,
        }
    }
}

fn parse_positive<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<u64>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(ConfigError::Invalid {
            var,
            expected: "a positive integer",
            value: raw,
        }),
    }
}
