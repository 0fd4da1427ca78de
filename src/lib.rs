//! Image Update Controller Library
//!
//! Watches container repositories for new tags and writes them into GitOps
//! repositories, recording progress on `ImageUpdateConfig` resources.
//! Tests are included in the module files and under `tests/`.

pub mod config;
pub mod constants;
pub mod controller;
pub mod credentials;
pub mod crd;
pub mod document;
pub mod git;
pub mod observability;
pub mod provider;
pub mod runtime;

// Re-export CRD types for convenience
pub use crd::*;
