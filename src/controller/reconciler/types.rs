//! # Reconciler Types
//!
//! The reconciler context, its collaborator seams and the error taxonomy of a pass.

use crate::config::ControllerConfig;
use crate::controller::backoff::BackoffState;
use crate::crd::{ImageUpdateConfigStatus, ResourceDescriptor, ResourceIdentity};
use crate::document::MutationError;
use crate::git::{GitError, GitPorcelain};
use crate::provider::TagResolver;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Descriptor lookup failure other than "not found"
#[derive(Debug, Error)]
#[error("failed to fetch resource {identity}: {source}")]
pub struct FetchError {
    pub identity: String,
    #[source]
    pub source: BoxError,
}

impl FetchError {
    pub fn new(identity: &ResourceIdentity, source: impl Into<BoxError>) -> Self {
        Self {
            identity: identity.to_string(),
            source: source.into(),
        }
    }
}

/// Status sink failures
#[derive(Debug, Error)]
pub enum StatusError {
    /// The status changed since it was read
    #[error("status of {identity} was modified concurrently")]
    Conflict { identity: String },
    #[error("failed to access status of {identity}: {source}")]
    Backend {
        identity: String,
        #[source]
        source: BoxError,
    },
}

impl StatusError {
    pub fn backend(identity: &ResourceIdentity, source: impl Into<BoxError>) -> Self {
        StatusError::Backend {
            identity: identity.to_string(),
            source: source.into(),
        }
    }
}

/// Descriptor validation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Failure of the converge sub-sequence (validate, checkout, mutate, commit, push)
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
}

impl UpdateError {
    /// Label for the errors metric
    pub fn metric_label(&self) -> &'static str {
        match self {
            UpdateError::Validation(_) => "validation",
            UpdateError::Git(_) => "git",
            UpdateError::Mutation(_) => "yaml",
        }
    }
}

/// Errors that end a pass without a status-driven reschedule
///
/// Everything else is classified onto the `Ready` condition instead.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Status write raced another writer; the whole pass should be retried
    #[error("status write conflict for {identity}, retrying the pass")]
    Conflict { identity: String },
    #[error(transparent)]
    Status(StatusError),
}

impl From<StatusError> for ReconcilerError {
    fn from(error: StatusError) -> Self {
        match error {
            StatusError::Conflict { identity } => ReconcilerError::Conflict { identity },
            other => ReconcilerError::Status(other),
        }
    }
}

/// Status as read from the sink together with its concurrency token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    pub status: ImageUpdateConfigStatus,
    /// Opaque revision; a write carrying a stale revision fails with a conflict
    pub revision: Option<String>,
}

/// Outcome of a pass that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Call again after the given delay
    Requeue(Duration),
    /// Terminal skip: deleted or disabled
    Done,
}

impl PassOutcome {
    pub fn reschedule_after(&self) -> Option<Duration> {
        match self {
            PassOutcome::Requeue(after) => Some(*after),
            PassOutcome::Done => None,
        }
    }
}

/// Loads descriptor snapshots by identity
#[async_trait]
pub trait DescriptorSource: Send + Sync {
    /// `Ok(None)` means the descriptor no longer exists
    async fn fetch(
        &self,
        identity: &ResourceIdentity,
    ) -> Result<Option<ResourceDescriptor>, FetchError>;
}

/// Reads and writes reconciliation status with optimistic concurrency
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn read(&self, identity: &ResourceIdentity) -> Result<StatusSnapshot, StatusError>;

    /// Write `snapshot.status`, failing with [`StatusError::Conflict`] when
    /// `snapshot.revision` is stale
    async fn write(
        &self,
        identity: &ResourceIdentity,
        snapshot: &StatusSnapshot,
    ) -> Result<(), StatusError>;
}

/// Reconciler context shared by every pass
pub struct Reconciler {
    pub(crate) descriptors: Arc<dyn DescriptorSource>,
    pub(crate) status: Arc<dyn StatusSink>,
    pub(crate) resolver: Arc<dyn TagResolver>,
    pub(crate) git: Arc<dyn GitPorcelain>,
    pub config: ControllerConfig,
    /// Error backoff per resource, driven by the error policy
    pub backoff_states: Mutex<HashMap<ResourceIdentity, BackoffState>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        descriptors: Arc<dyn DescriptorSource>,
        status: Arc<dyn StatusSink>,
        resolver: Arc<dyn TagResolver>,
        git: Arc<dyn GitPorcelain>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            descriptors,
            status,
            resolver,
            git,
            config,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Advance the error backoff of a resource; returns (seconds, error count)
    pub fn next_error_backoff(&self, identity: &ResourceIdentity) -> Option<(u64, u32)> {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(identity.clone()).or_insert_with(|| {
                    BackoffState::new(
                        self.config.error_backoff_min_minutes,
                        self.config.error_backoff_max_minutes,
                    )
                });
                state.increment_error();
                Some((state.backoff.next_backoff_seconds(), state.error_count))
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}", e);
                None
            }
        }
    }

    /// Forget accumulated errors after a pass that did not fail
    pub fn reset_backoff(&self, identity: &ResourceIdentity) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                states.remove(identity);
            }
            Err(e) => warn!("Failed to lock backoff_states: {}", e),
        }
    }

    #[cfg(test)]
    pub(crate) fn has_backoff_state(&self, identity: &ResourceIdentity) -> bool {
        self.backoff_states
            .lock()
            .map(|states| states.contains_key(identity))
            .unwrap_or(false)
    }
}
