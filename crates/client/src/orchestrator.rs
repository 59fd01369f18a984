//! Batch job orchestration.
//!
//! [`BatchOrchestrator`] owns at most one [`Job`] at a time. A submission
//! uploads the files, then hands the job to a driver task that starts the
//! [`StatusPoller`] and the progress estimator and is the only writer of job
//! state from then on. Both timer tasks report to the driver over a single
//! channel; the driver applies progress ticks, reacts to the poll outcome,
//! fetches and normalizes results, and falls back to a synthetic result when
//! polling or fetching fails.
//!
//! Observers read immutable [`JobSnapshot`]s from a `watch` channel and
//! [`BatchEvent`]s from a `broadcast` channel.

use std::sync::Arc;

use batchvision_core::error::BatchError;
use batchvision_core::fallback;
use batchvision_core::job::{InputFile, Job, JobState};
use batchvision_core::options::ProcessOptions;
use batchvision_core::progress;
use batchvision_core::result::BatchResult;
use batchvision_core::types::{JobId, SessionId, Timestamp};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::BatchTransport;
use crate::config::ClientConfig;
use crate::estimator::{self, EstimatorConfig};
use crate::events::BatchEvent;
use crate::normalize::normalize_results;
use crate::poller::{PollOutcome, PollerConfig, StatusPoller};

/// Broadcast channel capacity for orchestrator events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the channel the poller and estimator report through.
const SIGNAL_CHANNEL_CAPACITY: usize = 32;

/// Message used when the service reports an explicit `error` status.
const SERVER_ERROR_MESSAGE: &str = "Processing failed on server.";

/// Timing configuration for the tasks a job starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub poller: PollerConfig,
    pub estimator: EstimatorConfig,
}

impl From<&ClientConfig> for OrchestratorConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            poller: config.poller(),
            estimator: config.estimator(),
        }
    }
}

/// Read-only view of the current job, published on every change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobSnapshot {
    pub job_id: Option<JobId>,
    pub session_id: Option<SessionId>,
    pub state: JobState,
    /// Estimated processed count; equals `total` only once completed.
    pub processed: usize,
    pub total: usize,
    pub created_at: Option<Timestamp>,
    /// Real or synthetic result once the job is terminal.
    pub result: Option<Arc<BatchResult>>,
    /// Cause of the most recent failure, if any.
    pub error: Option<String>,
}

impl JobSnapshot {
    fn of(job: &Job) -> Self {
        Self {
            job_id: Some(job.id),
            session_id: job.session_id.clone(),
            state: job.state,
            processed: job.progress.estimated_count(),
            total: job.progress.total(),
            created_at: Some(job.created_at),
            result: None,
            error: None,
        }
    }

    /// Completion percentage in `0..=100`.
    pub fn percent(&self) -> u8 {
        progress::percent_of(self.processed, self.total)
    }

    /// Whether the result shown is the synthetic fallback.
    pub fn is_synthetic(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.synthetic)
    }
}

/// What the poller and estimator report to the driver.
#[derive(Debug)]
enum JobSignal {
    ProgressTick,
    Polled(PollOutcome),
}

/// The job currently owned by the orchestrator.
struct ActiveJob {
    job_id: JobId,
    cancel: CancellationToken,
    /// Present once the upload succeeded and the driver was spawned.
    driver: Option<JoinHandle<()>>,
}

/// Publishes snapshots and events. Shared by the orchestrator and its
/// driver task; only one of them publishes for a job at any time.
#[derive(Clone)]
struct Publisher {
    events: broadcast::Sender<BatchEvent>,
    snapshot: Arc<watch::Sender<JobSnapshot>>,
}

impl Publisher {
    fn emit(&self, event: BatchEvent) {
        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.events.send(event);
    }

    fn transition(&self, job: &mut Job, state: JobState) {
        let from = job.state;
        job.state = state;
        tracing::info!(
            job_id = %job.id,
            session_id = job.session_id.as_deref().unwrap_or("-"),
            from = from.label(),
            to = state.label(),
            "Job state changed",
        );
        self.snapshot.send_modify(|s| {
            s.state = state;
            s.session_id = job.session_id.clone();
        });
        self.emit(BatchEvent::StateChanged {
            job_id: job.id,
            state,
        });
    }

    /// Publish a terminal state together with its result in one snapshot
    /// update, so progress, state and result never disagree.
    fn finish(
        &self,
        job: &mut Job,
        state: JobState,
        result: Arc<BatchResult>,
        error: Option<String>,
    ) {
        let from = job.state;
        job.state = state;
        tracing::info!(
            job_id = %job.id,
            from = from.label(),
            to = state.label(),
            synthetic = result.synthetic,
            "Job finished",
        );
        let processed = job.progress.estimated_count();
        let total = job.progress.total();
        self.snapshot.send_modify(|s| {
            s.state = state;
            s.processed = processed;
            s.result = Some(result);
            s.error = error;
        });
        if job.progress.is_completed() {
            self.emit(BatchEvent::Progress {
                job_id: job.id,
                processed,
                total,
            });
        }
        self.emit(BatchEvent::StateChanged {
            job_id: job.id,
            state,
        });
    }

    /// Publish `Failed` with its cause and no result.
    fn fail(&self, job: &mut Job, message: String) {
        let from = job.state;
        job.state = JobState::Failed;
        tracing::info!(
            job_id = %job.id,
            from = from.label(),
            to = JobState::Failed.label(),
            "Job finished",
        );
        self.snapshot.send_modify(|s| {
            s.state = JobState::Failed;
            s.session_id = job.session_id.clone();
            s.error = Some(message);
        });
        self.emit(BatchEvent::StateChanged {
            job_id: job.id,
            state: JobState::Failed,
        });
    }

    fn progress(&self, job: &Job) {
        let processed = job.progress.estimated_count();
        let total = job.progress.total();
        self.snapshot.send_modify(|s| s.processed = processed);
        self.emit(BatchEvent::Progress {
            job_id: job.id,
            processed,
            total,
        });
    }
}

/// Owns the current batch job and drives it to a terminal state.
pub struct BatchOrchestrator {
    transport: Arc<dyn BatchTransport>,
    config: OrchestratorConfig,
    publisher: Publisher,
    active: Mutex<Option<ActiveJob>>,
    /// Master cancellation token; every job token is a child of it.
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    pub fn new(transport: Arc<dyn BatchTransport>, config: OrchestratorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (snapshot, _) = watch::channel(JobSnapshot::default());
        Self {
            transport,
            config,
            publisher: Publisher {
                events,
                snapshot: Arc::new(snapshot),
            },
            active: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to orchestrator events.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.publisher.events.subscribe()
    }

    /// Receive a fresh [`JobSnapshot`] on every change.
    pub fn watch(&self) -> watch::Receiver<JobSnapshot> {
        self.publisher.snapshot.subscribe()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> JobSnapshot {
        self.publisher.snapshot.borrow().clone()
    }

    pub fn state(&self) -> JobState {
        self.publisher.snapshot.borrow().state
    }

    /// Submit a new batch, replacing any current job.
    ///
    /// Returns the new job id once the service has accepted the upload and
    /// polling has started. Validation failures are returned before any
    /// network call. An upload failure moves the job to `Failed` and is
    /// returned as-is; no fallback is produced for it.
    pub async fn submit(
        &self,
        files: Vec<InputFile>,
        options: ProcessOptions,
    ) -> Result<JobId, BatchError> {
        let mut job = Job::new(files, options)?;
        let job_id = job.id;
        let cancel = self.cancel.child_token();

        {
            let mut active = self.active.lock().await;
            if let Some(previous) = active.take() {
                tracing::info!(job_id = %previous.job_id, "Replacing current job");
                stop(previous).await;
            }
            *active = Some(ActiveJob {
                job_id,
                cancel: cancel.clone(),
                driver: None,
            });
            self.publisher.snapshot.send_replace(JobSnapshot::of(&job));
            self.publisher.transition(&mut job, JobState::Submitting);
        }

        tracing::info!(job_id = %job_id, files = job.total_files(), "Submitting batch");

        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BatchError::Cancelled),
            result = self.transport.submit_batch(&job.input_files, &job.options) => {
                result.map_err(BatchError::from)
            }
        };

        let mut active = self.active.lock().await;
        let current = match active.as_mut() {
            Some(a) if a.job_id == job_id && !a.cancel.is_cancelled() => a,
            _ => {
                tracing::debug!(job_id = %job_id, "Job was replaced or reset during upload");
                return Err(BatchError::Cancelled);
            }
        };

        let session_id = match submitted {
            Ok(session_id) => session_id,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Batch submission failed");
                let message = e.to_string();
                self.publisher.fail(&mut job, message.clone());
                self.publisher.emit(BatchEvent::SubmissionFailed {
                    job_id,
                    error: message,
                });
                return Err(e);
            }
        };

        tracing::info!(job_id = %job_id, session_id = %session_id, "Batch accepted");
        job.session_id = Some(session_id.clone());
        self.publisher.emit(BatchEvent::Submitted {
            job_id,
            session_id,
        });
        self.publisher.transition(&mut job, JobState::Polling);

        let driver = Driver {
            transport: Arc::clone(&self.transport),
            config: self.config,
            publisher: self.publisher.clone(),
            cancel: cancel.clone(),
        };
        current.driver = Some(tokio::spawn(driver.run(job)));

        Ok(job_id)
    }

    /// Stop polling and estimation for the current job, keeping it with
    /// state `Cancelled` and its last estimated count.
    ///
    /// Returns `false` if there was no job in progress.
    pub async fn cancel(&self) -> bool {
        let mut active = self.active.lock().await;
        let Some(current) = active.as_mut() else {
            return false;
        };
        if !self.state().is_active() {
            return false;
        }

        current.cancel.cancel();
        if let Some(driver) = current.driver.take() {
            join_driver(current.job_id, driver).await;
        }

        let job_id = current.job_id;
        // The driver may have reached a terminal state before it saw the token.
        let cancelled = self.publisher.snapshot.send_if_modified(|s| {
            if s.state.is_active() {
                s.state = JobState::Cancelled;
                true
            } else {
                false
            }
        });
        if !cancelled {
            tracing::debug!(job_id = %job_id, state = self.state().label(), "Job finished before cancel");
            return false;
        }

        tracing::info!(job_id = %job_id, "Job cancelled");
        self.publisher.emit(BatchEvent::StateChanged {
            job_id,
            state: JobState::Cancelled,
        });
        self.publisher.emit(BatchEvent::Cancelled { job_id });
        true
    }

    /// Stop all work for the current job, discard it and return to `Idle`.
    /// Safe to call in any state.
    pub async fn reset(&self) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            tracing::info!(job_id = %previous.job_id, "Resetting job");
            stop(previous).await;
        }
        self.publisher.snapshot.send_replace(JobSnapshot::default());
        self.publisher.emit(BatchEvent::Reset);
    }

    /// Wait until `job_id` reaches a terminal state, or is replaced or
    /// discarded. Returns the snapshot observed at that point.
    pub async fn wait_for(&self, job_id: JobId) -> JobSnapshot {
        let mut rx = self.watch();
        let result = rx
            .wait_for(|s| s.job_id != Some(job_id) || s.state.is_terminal())
            .await
            .map(|s| s.clone());
        result.unwrap_or_else(|_| self.snapshot())
    }

    /// Cancel every job and make the orchestrator inert.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down batch orchestrator");
        self.cancel.cancel();
        self.reset().await;
    }
}

/// Cancel a job and wait for its driver to exit.
async fn stop(job: ActiveJob) {
    job.cancel.cancel();
    if let Some(driver) = job.driver {
        join_driver(job.job_id, driver).await;
    }
}

async fn join_driver(job_id: JobId, driver: JoinHandle<()>) {
    if let Err(e) = driver.await {
        tracing::error!(job_id = %job_id, error = %e, "Job driver task failed");
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Runs one accepted job from `Polling` to a terminal state.
struct Driver {
    transport: Arc<dyn BatchTransport>,
    config: OrchestratorConfig,
    publisher: Publisher,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(self, mut job: Job) {
        let Some(session_id) = job.session_id.clone() else {
            tracing::error!(job_id = %job.id, "Driver started without a session id");
            return;
        };

        let (tx, mut rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);

        let estimator_cancel = self.cancel.child_token();
        estimator::spawn(
            self.config.estimator,
            tx.clone(),
            estimator_cancel.clone(),
            || JobSignal::ProgressTick,
        );

        tokio::spawn(poll(
            Arc::clone(&self.transport),
            session_id.clone(),
            self.config.poller,
            self.cancel.clone(),
            tx,
        ));

        let outcome = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                signal = rx.recv() => match signal {
                    Some(JobSignal::ProgressTick) => self.apply_tick(&mut job),
                    Some(JobSignal::Polled(outcome)) => break outcome,
                    None => return,
                },
            }
        };

        tracing::debug!(
            job_id = %job.id,
            attempts = outcome.attempts(),
            "Polling finished",
        );

        let fetched = match outcome {
            PollOutcome::Done { .. } => {
                self.publisher.transition(&mut job, JobState::Fetching);
                let Some(result) = self.fetch(&mut job, &session_id, &mut rx).await else {
                    return;
                };
                result
            }
            PollOutcome::ServerError { .. } => {
                Err(BatchError::ServerProcessing(SERVER_ERROR_MESSAGE.to_string()))
            }
            PollOutcome::Exhausted { attempts } => Err(BatchError::PollLimitExceeded { attempts }),
            PollOutcome::Cancelled { .. } => return,
        };

        estimator_cancel.cancel();

        match fetched {
            Ok(result) => self.complete(&mut job, result),
            Err(e) if e.triggers_fallback() => self.degrade(&mut job, &session_id, e),
            Err(e) => self.fail(&mut job, e),
        }
    }

    /// Apply one estimator tick to the job's progress.
    fn apply_tick(&self, job: &mut Job) {
        if job.progress.advance() {
            self.publisher.progress(job);
        }
    }

    /// Fetch and normalize results while still applying progress ticks.
    /// Returns `None` if the job was cancelled meanwhile.
    async fn fetch(
        &self,
        job: &mut Job,
        session_id: &str,
        rx: &mut mpsc::Receiver<JobSignal>,
    ) -> Option<Result<BatchResult, BatchError>> {
        let request = self.transport.get_results(session_id);
        tokio::pin!(request);

        let raw = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                raw = &mut request => break raw,
                Some(JobSignal::ProgressTick) = rx.recv() => self.apply_tick(job),
            }
        };

        let result = raw.map_err(BatchError::from).and_then(|raw| {
            normalize_results(&raw, self.transport.base_url(), session_id, job.total_files())
        });
        Some(result)
    }

    /// Success path: force progress to 100% and publish the result.
    fn complete(&self, job: &mut Job, result: BatchResult) {
        job.progress.complete();
        let result = Arc::new(result);
        tracing::info!(
            job_id = %job.id,
            session_id = %result.session_id,
            items = result.len(),
            speedup = result.metrics.speedup,
            "Batch completed",
        );
        self.publisher.finish(job, JobState::Completed, Arc::clone(&result), None);
        self.publisher.emit(BatchEvent::Completed {
            job_id: job.id,
            result,
        });
    }

    /// Failure that is surfaced as-is, without a synthetic result.
    fn fail(&self, job: &mut Job, error: BatchError) {
        tracing::error!(job_id = %job.id, error = %error, "Batch failed");
        let message = error.to_string();
        self.publisher.fail(job, message.clone());
        self.publisher.emit(BatchEvent::Failed {
            job_id: job.id,
            error: message,
        });
    }

    /// Failure path after submission: publish a synthetic result.
    fn degrade(&self, job: &mut Job, session_id: &str, error: BatchError) {
        tracing::warn!(
            job_id = %job.id,
            session_id,
            error = %error,
            "Batch failed, generating synthetic result",
        );
        let result = Arc::new(fallback::synthesize(
            session_id.to_string(),
            &job.input_files,
        ));
        let message = error.to_string();
        self.publisher
            .finish(job, JobState::Failed, Arc::clone(&result), Some(message.clone()));
        self.publisher.emit(BatchEvent::FallbackCompleted {
            job_id: job.id,
            result,
            error: message,
        });
    }
}

async fn poll(
    transport: Arc<dyn BatchTransport>,
    session_id: SessionId,
    config: PollerConfig,
    cancel: CancellationToken,
    tx: mpsc::Sender<JobSignal>,
) {
    let mut poller = StatusPoller::new(config);
    let outcome = poller.run(transport.as_ref(), &session_id, &cancel).await;
    tracing::trace!(
        session_id = %session_id,
        attempts = poller.attempts(),
        state = ?poller.state(),
        "Status poller stopped",
    );
    // The driver may already be gone (cancelled); nothing to report then.
    let _ = tx.send(JobSignal::Polled(outcome)).await;
}
