//! # Watch Loop
//!
//! Drives reconciliation with a `kube_runtime::Controller`.
//!
//! The controller's scheduler runs at most one pass per resource at a time and
//! coalesces events that arrive while a pass is in flight. The loop stops on
//! SIGTERM/SIGINT after in-flight passes finish.

use crate::controller::reconciler::{reconcile, PassOutcome, Reconciler, ReconcilerError};
use crate::controller::server::ServerState;
use crate::crd::{ImageUpdateConfig, ResourceIdentity};
use crate::observability;
use crate::runtime::error_policy::handle_reconciliation_error;
use anyhow::Result;
use futures::StreamExt;
use kube::api::DynamicObject;
use kube::Api;
use kube_runtime::controller::{self, Action, Controller};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Map a pass outcome to a controller action
pub fn action_for(outcome: PassOutcome) -> Action {
    match outcome.reschedule_after() {
        Some(after) => Action::requeue(after),
        None => Action::await_change(),
    }
}

/// Identity of an object reference reported by the controller
pub fn identity_of_ref(obj_ref: &ObjectRef<DynamicObject>) -> ResourceIdentity {
    ResourceIdentity::new(
        obj_ref.namespace.as_deref().unwrap_or("default"),
        obj_ref.name.as_str(),
    )
}

/// Drop per-resource metrics and backoff of a resource that left the store
///
/// The controller does not call the reconciler for deleted objects; it
/// reports them as `ObjectNotFound` instead.
pub fn release_deleted(reconciler: &Reconciler, obj_ref: &ObjectRef<DynamicObject>) {
    let identity = identity_of_ref(obj_ref);
    info!(resource = %identity, "Resource deleted, releasing bookkeeping");
    observability::metrics::forget_resource(&identity);
    reconciler.reset_backoff(&identity);
}

async fn reconcile_resource(
    obj: Arc<ImageUpdateConfig>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let identity = ResourceIdentity::of(&obj);
    let outcome = reconcile(&ctx, &identity).await?;
    ctx.reset_backoff(&identity);
    if let PassOutcome::Requeue(after) = outcome {
        observability::metrics::increment_requeues_total("interval");
        debug!(resource = %identity, "Next pass in {}s", after.as_secs());
    }
    Ok(action_for(outcome))
}

/// Run the controller until a shutdown signal arrives
pub async fn run_watch_loop(
    configs: Api<ImageUpdateConfig>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    info!("Watching ImageUpdateConfig resources");

    let bookkeeping = Arc::clone(&reconciler);
    Controller::new(configs, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile_resource, handle_reconciliation_error, reconciler)
        .for_each(|result| {
            let bookkeeping = Arc::clone(&bookkeeping);
            async move {
                match result {
                    Ok((object, _action)) => {
                        debug!(
                            "Reconciled {}/{}",
                            object.namespace.as_deref().unwrap_or("default"),
                            object.name
                        );
                    }
                    Err(controller::Error::ObjectNotFound(obj_ref)) => {
                        release_deleted(&bookkeeping, &obj_ref);
                    }
                    // Reconcile errors are already handled by the error policy
                    Err(controller::Error::ReconcilerFailed(_, _)) => {}
                    Err(e) => warn!("Controller stream error: {}", e),
                }
            }
        })
        .await;

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Controller shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error_policy::tests::reconciler;
    use std::time::Duration;

    fn deleted_ref(namespace: &str, name: &str) -> ObjectRef<DynamicObject> {
        ObjectRef::<ImageUpdateConfig>::new(name).within(namespace).erase()
    }

    #[test]
    fn test_action_for_outcome() {
        assert_eq!(
            action_for(PassOutcome::Requeue(Duration::from_secs(120))),
            Action::requeue(Duration::from_secs(120))
        );
        assert_eq!(action_for(PassOutcome::Done), Action::await_change());
    }

    #[test]
    fn test_identity_of_ref() {
        assert_eq!(
            identity_of_ref(&deleted_ref("prod", "web")),
            ResourceIdentity::new("prod", "web")
        );
    }

    #[test]
    fn test_release_deleted_drops_backoff_of_that_resource_only() {
        let ctx = reconciler();
        let deleted = ResourceIdentity::new("prod", "web");
        let other = ResourceIdentity::new("prod", "api");
        ctx.next_error_backoff(&deleted);
        ctx.next_error_backoff(&other);

        release_deleted(&ctx, &deleted_ref("prod", "web"));

        assert!(!ctx.has_backoff_state(&deleted));
        assert!(ctx.has_backoff_state(&other));
    }

    #[test]
    fn test_release_deleted_forgets_metric_series() {
        let ctx = reconciler();
        let deleted = ResourceIdentity::new("cleanup", "web");
        observability::metrics::increment_errors(&deleted, "repository");
        assert!(observability::metrics::is_tracked(&deleted));

        release_deleted(&ctx, &deleted_ref("cleanup", "web"));

        assert!(!observability::metrics::is_tracked(&deleted));
    }
}
