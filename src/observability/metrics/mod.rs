//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text rendering
//! - `controller_metrics` - Per-resource reconciliation metrics, requeues, parsing errors
//! - `processing_metrics` - Repository checks and git operations

pub mod controller_metrics;
pub mod processing_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use processing_metrics::*;
pub use registry::*;
