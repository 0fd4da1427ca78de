//! # Error Policy
//!
//! Requeue decisions for passes that ended in an error.
//!
//! - status write conflicts retry the whole pass after a short fixed delay
//! - everything else uses per-resource Fibonacci backoff, so one failing
//!   resource never slows down the others

use crate::constants;
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::{ImageUpdateConfig, ResourceIdentity};
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Delay before the next attempt after `error`
pub fn requeue_delay(error: &ReconcilerError, identity: &ResourceIdentity, ctx: &Reconciler) -> Duration {
    if let ReconcilerError::Conflict { .. } = error {
        observability::metrics::increment_requeues_total("conflict");
        return ctx.config.conflict_requeue();
    }

    let (backoff_seconds, error_count) = ctx.next_error_backoff(identity).unwrap_or_else(|| {
        warn!("Backoff state unavailable, using default backoff");
        (constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, 0)
    });

    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::seconds(i64::try_from(backoff_seconds).unwrap_or(i64::MAX));
    info!(
        resource = %identity,
        "Retrying with Fibonacci backoff: {}s (error count: {}, next attempt: {})",
        backoff_seconds,
        error_count,
        next_trigger_time.to_rfc3339()
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Duration::from_secs(backoff_seconds)
}

/// `error_policy` for the kube-runtime controller
pub fn handle_reconciliation_error(
    obj: Arc<ImageUpdateConfig>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let identity = ResourceIdentity::of(&obj);

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = %identity.name,
        resource.namespace = %identity.namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    match error {
        ReconcilerError::Conflict { .. } => warn!("Reconciliation conflict for {}: {}", identity, error),
        _ => error!("Reconciliation error for {}: {}", identity, error),
    }

    Action::requeue(requeue_delay(error, &identity, &ctx))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::controller::reconciler::{
        DescriptorSource, FetchError, StatusError, StatusSink, StatusSnapshot,
    };
    use crate::crd::{RepositoryConfig, ResourceDescriptor};
    use crate::git::{CommitOutcome, GitError, GitPorcelain, WorkingCopy};
    use crate::provider::{ResolveError, TagResolver};
    use async_trait::async_trait;

    struct Unused;

    #[async_trait]
    impl DescriptorSource for Unused {
        async fn fetch(&self, _: &ResourceIdentity) -> Result<Option<ResourceDescriptor>, FetchError> {
            Ok(None)
        }
    }

    #[async_trait]
    impl StatusSink for Unused {
        async fn read(&self, _: &ResourceIdentity) -> Result<StatusSnapshot, StatusError> {
            Ok(StatusSnapshot::default())
        }
        async fn write(&self, _: &ResourceIdentity, _: &StatusSnapshot) -> Result<(), StatusError> {
            Ok(())
        }
    }

    #[async_trait]
    impl TagResolver for Unused {
        async fn resolve_latest(&self, _: &str, _: &RepositoryConfig) -> Result<String, ResolveError> {
            Err(ResolveError::Transient("unused".to_string()))
        }
    }

    #[async_trait]
    impl GitPorcelain for Unused {
        async fn checkout(&self, _: &str, _: &crate::crd::GitConfig) -> Result<WorkingCopy, GitError> {
            Err(GitError::Credentials("unused".to_string()))
        }
        async fn commit_and_push(&self, _: &WorkingCopy, _: &str) -> Result<CommitOutcome, GitError> {
            Ok(CommitOutcome::NothingToCommit)
        }
    }

    pub(crate) fn reconciler() -> Reconciler {
        let unused = Arc::new(Unused);
        Reconciler::new(
            Arc::<Unused>::clone(&unused),
            Arc::<Unused>::clone(&unused),
            Arc::<Unused>::clone(&unused),
            unused,
            ControllerConfig::default(),
        )
    }

    #[test]
    fn test_conflict_uses_fixed_delay() {
        let ctx = reconciler();
        let identity = ResourceIdentity::new("default", "nginx");
        let error = ReconcilerError::Conflict {
            identity: identity.to_string(),
        };
        assert_eq!(requeue_delay(&error, &identity, &ctx), Duration::from_secs(5));
        assert!(!ctx.has_backoff_state(&identity));
    }

    #[test]
    fn test_other_errors_use_fibonacci_backoff() {
        let ctx = reconciler();
        let identity = ResourceIdentity::new("default", "nginx");
        let error = ReconcilerError::Status(StatusError::backend(&identity, "boom"));
        let delays: Vec<u64> = (0..4)
            .map(|_| requeue_delay(&error, &identity, &ctx).as_secs())
            .collect();
        assert_eq!(delays, vec![60, 60, 120, 180]);

        ctx.reset_backoff(&identity);
        assert_eq!(requeue_delay(&error, &identity, &ctx).as_secs(), 60);
    }

    #[test]
    fn test_backoff_is_per_resource() {
        let ctx = reconciler();
        let a = ResourceIdentity::new("default", "a");
        let b = ResourceIdentity::new("default", "b");
        let error = ReconcilerError::Status(StatusError::backend(&a, "boom"));
        for _ in 0..3 {
            requeue_delay(&error, &a, &ctx);
        }
        assert_eq!(requeue_delay(&error, &b, &ctx).as_secs(), 60);
    }
}
