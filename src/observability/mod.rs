//! # Observability
//!
//! Prometheus metrics for the controller. Logging goes through `tracing`
//! directly and is configured in [`crate::runtime::initialization`].

pub mod metrics;
