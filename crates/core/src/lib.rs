//! Domain types and pure logic for batch image-processing jobs.
//!
//! Nothing in this crate performs I/O or owns a timer. The client crate
//! drives these types from its transport, poller and estimator tasks.

pub mod error;
pub mod fallback;
pub mod job;
pub mod options;
pub mod progress;
pub mod result;
pub mod types;
