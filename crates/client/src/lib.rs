//! Client-side orchestration for remote batch image processing.
//!
//! Provides the HTTP transport for the processing service, a fixed-interval
//! status poller, a simulated progress estimator, result normalization, and
//! the [`orchestrator::BatchOrchestrator`] state machine that ties them
//! together and publishes [`events::BatchEvent`]s for presentation code.

pub mod api;
pub mod config;
pub mod estimator;
pub mod events;
pub mod health;
pub mod normalize;
pub mod orchestrator;
pub mod poller;
