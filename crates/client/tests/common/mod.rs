//! Shared helpers for client integration tests.
//!
//! [`ScriptedTransport`] replays a fixed sequence of status answers and
//! counts every call, so tests can assert exactly which requests a job made.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use batchvision_client::api::{ApiError, BatchTransport, HealthReport, RawResults, RemoteStatus};
use batchvision_client::estimator::EstimatorConfig;
use batchvision_client::orchestrator::{BatchOrchestrator, OrchestratorConfig};
use batchvision_client::poller::PollerConfig;
use batchvision_core::job::InputFile;
use batchvision_core::options::ProcessOptions;
use batchvision_core::types::SessionId;
use serde_json::{json, Value};

pub const BASE_URL: &str = "http://svc";
pub const SESSION_ID: &str = "sess-1";

/// One scripted answer to `GET /status/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusStep {
    Pending,
    Done,
    Error,
    /// The request fails with a 503.
    Unavailable,
}

#[derive(Debug, Clone)]
pub enum SubmitBehavior {
    Accept(String),
    Reject(u16),
}

#[derive(Debug, Clone)]
pub enum ResultsBehavior {
    Body(Value),
    Reject(u16),
    /// The request is refused locally, before reaching the service.
    Invalid,
}

pub struct ScriptedTransport {
    submit: SubmitBehavior,
    results: ResultsBehavior,
    /// Remaining status answers; `Pending` once exhausted.
    statuses: Mutex<VecDeque<StatusStep>>,
    /// Simulated latency of each request.
    submit_delay: Duration,
    status_delay: Duration,
    results_delay: Duration,
    submit_calls: AtomicU32,
    status_calls: AtomicU32,
    results_calls: AtomicU32,
}

impl ScriptedTransport {
    pub fn new(statuses: impl IntoIterator<Item = StatusStep>) -> Self {
        Self {
            submit: SubmitBehavior::Accept(SESSION_ID.to_string()),
            results: ResultsBehavior::Body(results_body(0)),
            statuses: Mutex::new(statuses.into_iter().collect()),
            submit_delay: Duration::ZERO,
            status_delay: Duration::ZERO,
            results_delay: Duration::ZERO,
            submit_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            results_calls: AtomicU32::new(0),
        }
    }

    pub fn with_submit(mut self, submit: SubmitBehavior) -> Self {
        self.submit = submit;
        self
    }

    pub fn with_results(mut self, results: ResultsBehavior) -> Self {
        self.results = results;
        self
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    pub fn with_results_delay(mut self, delay: Duration) -> Self {
        self.results_delay = delay;
        self
    }

    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn results_calls(&self) -> u32 {
        self.results_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchTransport for ScriptedTransport {
    async fn submit_batch(
        &self,
        files: &[InputFile],
        _options: &ProcessOptions,
    ) -> Result<SessionId, ApiError> {
        if files.is_empty() {
            return Err(ApiError::Validation("at least one image is required".into()));
        }
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        match &self.submit {
            SubmitBehavior::Accept(session_id) => Ok(session_id.clone()),
            SubmitBehavior::Reject(status) => Err(ApiError::Status {
                status: *status,
                body: "upload rejected".into(),
            }),
        }
    }

    async fn get_status(&self, _session_id: &str) -> Result<RemoteStatus, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if !self.status_delay.is_zero() {
            tokio::time::sleep(self.status_delay).await;
        }
        let step = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StatusStep::Pending);
        match step {
            StatusStep::Pending => Ok(RemoteStatus::Pending),
            StatusStep::Done => Ok(RemoteStatus::Done),
            StatusStep::Error => Ok(RemoteStatus::Error),
            StatusStep::Unavailable => Err(ApiError::Status {
                status: 503,
                body: "unavailable".into(),
            }),
        }
    }

    async fn get_results(&self, _session_id: &str) -> Result<RawResults, ApiError> {
        self.results_calls.fetch_add(1, Ordering::SeqCst);
        if !self.results_delay.is_zero() {
            tokio::time::sleep(self.results_delay).await;
        }
        match &self.results {
            ResultsBehavior::Body(body) => Ok(serde_json::from_value(body.clone())?),
            ResultsBehavior::Reject(status) => Err(ApiError::Status {
                status: *status,
                body: "results unavailable".into(),
            }),
            ResultsBehavior::Invalid => Err(ApiError::Validation("session id rejected".into())),
        }
    }

    async fn health(&self) -> Result<HealthReport, ApiError> {
        Ok(HealthReport {
            status: Some("ok".into()),
        })
    }

    fn base_url(&self) -> &str {
        BASE_URL
    }
}

/// A well-formed results body with `items` records.
pub fn results_body(items: usize) -> Value {
    let results: Vec<Value> = (0..items)
        .map(|i| {
            json!({
                "original": format!("/static/uploads/img{i}.png"),
                "processed": format!("/static/outputs/img{i}_seg.png"),
                "noise_type": "gaussian",
                "processing_time_sequential": 0.9,
                "processing_time_parallel": 0.3,
                "speedup": 3.0,
            })
        })
        .collect();
    json!({
        "results": results,
        "metrics": {
            "serial_time_sec": 0.9 * items as f64,
            "parallel_time_sec": 0.3 * items as f64,
            "speedup": 3.0,
        },
        "thread_count": 8,
    })
}

pub fn images(count: usize) -> Vec<InputFile> {
    (0..count)
        .map(|i| InputFile::new(format!("img{i}.png"), vec![0x89, b'P', b'N', b'G', i as u8]))
        .collect()
}

/// Poll every second and tick progress every 800 ms.
pub fn orchestrator(transport: Arc<ScriptedTransport>) -> BatchOrchestrator {
    orchestrator_with(transport, OrchestratorConfig::default())
}

pub fn orchestrator_with(
    transport: Arc<ScriptedTransport>,
    config: OrchestratorConfig,
) -> BatchOrchestrator {
    BatchOrchestrator::new(transport, config)
}

pub fn with_poll_ceiling(max_attempts: u32) -> OrchestratorConfig {
    OrchestratorConfig {
        poller: PollerConfig {
            max_attempts: Some(max_attempts),
            ..PollerConfig::default()
        },
        ..OrchestratorConfig::default()
    }
}

/// Millisecond timers for tests that run on the real clock.
pub fn fast_timers() -> OrchestratorConfig {
    OrchestratorConfig {
        poller: PollerConfig {
            interval: Duration::from_millis(1),
            max_attempts: None,
        },
        estimator: EstimatorConfig {
            interval: Duration::from_millis(1),
        },
    }
}
