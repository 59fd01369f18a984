//! Periodic service liveness checks.
//!
//! [`HealthProbe`] calls the transport's health endpoint once on start and
//! then on a fixed interval, publishing the result on a `watch` channel.
//! A manual [`HealthProbe::refresh`] triggers an extra check without
//! waiting for the next tick.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::BatchTransport;

/// Last known reachability of the processing service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// A check is in flight and no answer has arrived yet.
    #[default]
    Checking,
    Connected,
    Disconnected,
}

impl Connectivity {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

pub struct HealthProbe {
    transport: Arc<dyn BatchTransport>,
    interval: Duration,
    status: watch::Sender<Connectivity>,
    refresh: Notify,
}

impl HealthProbe {
    pub fn new(transport: Arc<dyn BatchTransport>, interval: Duration) -> Arc<Self> {
        let (status, _) = watch::channel(Connectivity::default());
        Arc::new(Self {
            transport,
            interval,
            status,
            refresh: Notify::new(),
        })
    }

    /// Receive every connectivity change.
    pub fn watch(&self) -> watch::Receiver<Connectivity> {
        self.status.subscribe()
    }

    pub fn current(&self) -> Connectivity {
        *self.status.borrow()
    }

    /// Request an immediate check from the running loop.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    /// Run one check and publish its result.
    pub async fn check(&self) -> Connectivity {
        self.status.send_replace(Connectivity::Checking);

        let connectivity = match self.transport.health().await {
            Ok(report) => {
                tracing::debug!(
                    api_url = self.transport.base_url(),
                    status = report.status.as_deref().unwrap_or("-"),
                    "Service is reachable",
                );
                Connectivity::Connected
            }
            Err(e) => {
                tracing::warn!(
                    api_url = self.transport.base_url(),
                    error = %e,
                    "Service health check failed",
                );
                Connectivity::Disconnected
            }
        };

        self.status.send_replace(connectivity);
        connectivity
    }

    /// Check on start, then every interval or on refresh, until `cancel`
    /// fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Health probe started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Health probe stopping");
                    break;
                }
                _ = self.refresh.notified() => {
                    tracing::debug!("Manual health refresh");
                    self.check().await;
                    ticker.reset();
                }
                _ = ticker.tick() => {
                    self.check().await;
                }
            }
        }
    }

    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(cancel))
    }
}
