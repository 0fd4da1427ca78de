//! # Controller
//!
//! Reconciliation logic, error backoff and the HTTP probe/metrics server.

pub mod backoff;
pub mod reconciler;
pub mod server;
