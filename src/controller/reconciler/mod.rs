//! # Reconciler
//!
//! Convergence of `ImageUpdateConfig` resources toward the latest container tag.
//!
//! ## Sub-modules
//!
//! - `types` - Reconciler context, collaborator traits and errors
//! - `reconcile` - The reconciliation pass state machine
//! - `conditions` - Condition-set updates
//! - `validation` - Duration parsing and descriptor checks
//! - `status` - Kubernetes-backed descriptor source and status sink

pub mod conditions;
pub mod reconcile;
pub mod status;
pub mod types;
pub mod validation;

pub use conditions::upsert_condition;
pub use reconcile::{reconcile, reconcile_at, remaining_interval};
pub use status::KubeStore;
pub use types::*;
pub use validation::{check_interval_or_default, parse_kubernetes_duration, validate_descriptor};
