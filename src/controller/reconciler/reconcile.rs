//! # Reconcile
//!
//! One reconciliation pass for one `ImageUpdateConfig`.
//!
//! A pass walks these states in order and may stop early at any of them:
//!
//! 1. **Fetch** - load the descriptor; gone means deleted (release bookkeeping, stop)
//! 2. **Disabled** - stop without rescheduling
//! 3. **Interval** - not due yet: reschedule for the remaining time, no I/O, no status write
//! 4. **Stamp** - record `lastChecked` and `observedGeneration`
//! 5. **Resolve** - ask the tag resolver for the latest tag (`RepositoryError` on failure)
//! 6. **Converge** - when the tag differs from `currentTag`: checkout, rewrite every
//!    target in order, commit and push (`UpdateError` on failure)
//! 7. **Commit** - record `currentTag` and `lastUpdate`
//! 8. **Ready** - mark `Ready=True` and persist
//!
//! Every failure after the stamp still persists status and reschedules at the
//! check interval. Status is written once per pass, so a cancelled pass never
//! leaves a partial status behind.

use super::conditions::upsert_condition;
use super::types::{
    PassOutcome, Reconciler, ReconcilerError, StatusError, StatusSnapshot, UpdateError,
};
use super::validation::{check_interval_or_default, validate_descriptor};
use crate::constants::{
    CONDITION_READY, MESSAGE_SYNCHRONIZED, REASON_REPOSITORY_ERROR, REASON_SYNCHRONIZED,
    REASON_UPDATE_ERROR,
};
use crate::crd::{Condition, ConditionStatus, ResourceDescriptor, ResourceIdentity};
use crate::document;
use crate::git::{render_commit_message, CommitOutcome, WorkingCopy};
use crate::observability::metrics;
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

/// How a pass ended, for metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassResult {
    Success,
    /// A failure was classified onto the Ready condition
    Failed,
    Skipped,
    Deleted,
}

impl PassResult {
    fn label(self) -> Option<&'static str> {
        match self {
            PassResult::Success => Some("success"),
            PassResult::Failed => Some("error"),
            PassResult::Skipped => Some("skipped"),
            PassResult::Deleted => None,
        }
    }
}

/// Run one pass for `identity` at the current time
pub async fn reconcile(
    reconciler: &Reconciler,
    identity: &ResourceIdentity,
) -> Result<PassOutcome, ReconcilerError> {
    reconcile_at(reconciler, identity, Utc::now()).await
}

/// Run one pass for `identity` as if the current time were `now`
pub async fn reconcile_at(
    reconciler: &Reconciler,
    identity: &ResourceIdentity,
    now: DateTime<Utc>,
) -> Result<PassOutcome, ReconcilerError> {
    let span = info_span!(
        "reconcile",
        resource.namespace = %identity.namespace,
        resource.name = %identity.name
    );
    let start = Instant::now();
    let result = run_pass(reconciler, identity, now).instrument(span).await;
    let elapsed = start.elapsed().as_secs_f64();

    match &result {
        Ok((_, pass)) => {
            if let Some(label) = pass.label() {
                metrics::observe_reconciliation(identity, label, elapsed);
            }
        }
        Err(_) => metrics::observe_reconciliation(identity, "error", elapsed),
    }
    result.map(|(outcome, _)| outcome)
}

async fn run_pass(
    reconciler: &Reconciler,
    identity: &ResourceIdentity,
    now: DateTime<Utc>,
) -> Result<(PassOutcome, PassResult), ReconcilerError> {
    // Fetch
    let Some(descriptor) = reconciler.descriptors.fetch(identity).await? else {
        info!(resource = %identity, "Resource deleted, releasing bookkeeping");
        metrics::forget_resource(identity);
        reconciler.reset_backoff(identity);
        return Ok((PassOutcome::Done, PassResult::Deleted));
    };

    // Disabled
    if descriptor.spec.disabled {
        debug!(resource = %identity, "Resource is disabled, skipping");
        return Ok((PassOutcome::Done, PassResult::Skipped));
    }

    // Interval
    let interval = check_interval_or_default(&descriptor.spec.check_interval);
    let mut snapshot = reconciler.status.read(identity).await?;
    if let Some(remaining) =
        remaining_interval(snapshot.status.last_checked.as_deref(), interval, now)
    {
        debug!(
            resource = %identity,
            remaining_secs = remaining.as_secs(),
            "Check interval not elapsed, rescheduling"
        );
        return Ok((PassOutcome::Requeue(remaining), PassResult::Skipped));
    }

    // Stamp
    snapshot.status.last_checked = Some(timestamp(now));
    snapshot.status.observed_generation = descriptor.generation;

    // Resolve
    let repository = &descriptor.spec.repository;
    let resolve_start = Instant::now();
    let resolved = reconciler
        .resolver
        .resolve_latest(&identity.namespace, repository)
        .await;
    metrics::observe_repository_check(
        repository.kind(),
        repository.repository_name(),
        if resolved.is_ok() { "success" } else { "error" },
        resolve_start.elapsed().as_secs_f64(),
    );
    metrics::set_last_check_timestamp(identity, repository.repository_name(), now);

    let latest = match resolved {
        Ok(tag) => tag,
        Err(e) => {
            warn!(
                resource = %identity,
                repository = %repository.repository_name(),
                error = %e,
                "Failed to check repository"
            );
            metrics::increment_errors(identity, "repository");
            set_ready(
                identity,
                &mut snapshot,
                ConditionStatus::False,
                REASON_REPOSITORY_ERROR,
                format!("Failed to check repository: {e}"),
                now,
            );
            persist(reconciler, identity, &snapshot).await?;
            return Ok((PassOutcome::Requeue(interval), PassResult::Failed));
        }
    };

    // Converge
    snapshot.status.latest_tag = Some(latest.clone());
    let previous = snapshot.status.current_tag.clone();
    if previous.as_deref() == Some(latest.as_str()) {
        debug!(resource = %identity, tag = %latest, "Already at latest tag");
    } else {
        info!(
            resource = %identity,
            current_tag = previous.as_deref().unwrap_or("none"),
            latest_tag = %latest,
            "New tag found, updating repository"
        );
        if let Err(e) = converge(reconciler, &descriptor, &latest, previous.as_deref()).await {
            warn!(resource = %identity, error = %e, "Failed to update repository");
            metrics::increment_errors(identity, e.metric_label());
            set_ready(
                identity,
                &mut snapshot,
                ConditionStatus::False,
                REASON_UPDATE_ERROR,
                format!("Failed to update repository: {e}"),
                now,
            );
            persist(reconciler, identity, &snapshot).await?;
            return Ok((PassOutcome::Requeue(interval), PassResult::Failed));
        }

        // Commit
        snapshot.status.current_tag = Some(latest.clone());
        snapshot.status.last_update = Some(timestamp(now));
        metrics::increment_updates_performed(
            identity,
            repository.kind(),
            repository.repository_name(),
        );
        metrics::set_last_update_timestamp(identity, repository.repository_name(), now);
    }

    // Ready
    set_ready(
        identity,
        &mut snapshot,
        ConditionStatus::True,
        REASON_SYNCHRONIZED,
        MESSAGE_SYNCHRONIZED.to_string(),
        now,
    );
    persist(reconciler, identity, &snapshot).await?;
    metrics::set_current_version(
        identity,
        repository.repository_name(),
        snapshot.status.current_tag.as_deref().unwrap_or(""),
        &latest,
    );
    info!(
        resource = %identity,
        tag = %latest,
        next_check_secs = interval.as_secs(),
        "Reconciliation complete"
    );
    Ok((PassOutcome::Requeue(interval), PassResult::Success))
}

/// Time left before the next check is due, `None` when due now
///
/// A missing or unreadable `lastChecked` is always due. A `lastChecked` in
/// the future counts as zero elapsed.
pub fn remaining_interval(
    last_checked: Option<&str>,
    interval: Duration,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let last_checked = DateTime::parse_from_rfc3339(last_checked?).ok()?;
    let elapsed = (now - last_checked.with_timezone(&Utc))
        .to_std()
        .unwrap_or(Duration::ZERO);
    interval.checked_sub(elapsed).filter(|left| !left.is_zero())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn set_ready(
    identity: &ResourceIdentity,
    snapshot: &mut StatusSnapshot,
    status: ConditionStatus,
    reason: &str,
    message: String,
    now: DateTime<Utc>,
) {
    let condition = Condition {
        r#type: CONDITION_READY.to_string(),
        status,
        last_transition_time: None,
        reason: Some(reason.to_string()),
        message: Some(message),
    };
    snapshot.status.conditions = upsert_condition(&snapshot.status.conditions, condition, now);
    metrics::set_condition_status(identity, CONDITION_READY, status == ConditionStatus::True);
}

async fn persist(
    reconciler: &Reconciler,
    identity: &ResourceIdentity,
    snapshot: &StatusSnapshot,
) -> Result<(), ReconcilerError> {
    match reconciler.status.write(identity, snapshot).await {
        Ok(()) => Ok(()),
        Err(e @ StatusError::Conflict { .. }) => {
            warn!(resource = %identity, "Status was modified concurrently, retrying the pass");
            Err(e.into())
        }
        Err(e) => {
            metrics::increment_errors(identity, "status");
            Err(e.into())
        }
    }
}

/// Validate, checkout, rewrite, commit and push
///
/// The working copy is released on every exit path.
async fn converge(
    reconciler: &Reconciler,
    descriptor: &ResourceDescriptor,
    tag: &str,
    previous_tag: Option<&str>,
) -> Result<(), UpdateError> {
    validate_descriptor(&descriptor.spec)?;

    let copy = reconciler
        .git
        .checkout(&descriptor.identity.namespace, &descriptor.spec.git)
        .await?;
    let result = update_and_push(reconciler, descriptor, &copy, tag, previous_tag).await;
    reconciler.git.release(copy);
    result
}

async fn update_and_push(
    reconciler: &Reconciler,
    descriptor: &ResourceDescriptor,
    copy: &WorkingCopy,
    tag: &str,
    previous_tag: Option<&str>,
) -> Result<(), UpdateError> {
    let identity = &descriptor.identity;
    let spec = &descriptor.spec;

    // Targets already rewritten stay rewritten when a later one fails; the
    // checkout is discarded either way.
    for target in &spec.update_targets {
        let file = copy.resolve(&target.file)?;
        document::update_path(&file, &target.yaml_path, tag, target.image_tag_only).await?;
        metrics::increment_files_updated(identity, &target.file);
        debug!(
            resource = %identity,
            file = %target.file,
            path = %target.yaml_path,
            tag = %tag,
            "Updated target"
        );
    }

    let message = render_commit_message(
        spec.git.commit_message.as_deref(),
        tag,
        previous_tag,
        spec.repository.repository_name(),
    );
    match reconciler.git.commit_and_push(copy, &message).await? {
        CommitOutcome::Pushed => info!(
            resource = %identity,
            repository = %spec.git.repository,
            branch = %spec.git.branch,
            "Committed and pushed tag update"
        ),
        CommitOutcome::NothingToCommit => info!(
            resource = %identity,
            repository = %spec.git.repository,
            "Targets already at the new tag, nothing to commit"
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_remaining_interval_missing_is_due() {
        assert_eq!(remaining_interval(None, Duration::from_secs(300), now()), None);
        assert_eq!(
            remaining_interval(Some("not a time"), Duration::from_secs(300), now()),
            None
        );
    }

    #[test]
    fn test_remaining_interval_not_elapsed() {
        assert_eq!(
            remaining_interval(
                Some("2024-05-01T11:57:00Z"),
                Duration::from_secs(300),
                now()
            ),
            Some(Duration::from_secs(120))
        );
    }

    #[test]
    fn test_remaining_interval_elapsed() {
        assert_eq!(
            remaining_interval(
                Some("2024-05-01T11:55:00Z"),
                Duration::from_secs(300),
                now()
            ),
            None
        );
        assert_eq!(
            remaining_interval(
                Some("2024-05-01T10:00:00Z"),
                Duration::from_secs(300),
                now()
            ),
            None
        );
    }

    #[test]
    fn test_remaining_interval_future_last_checked() {
        assert_eq!(
            remaining_interval(
                Some("2024-05-01T13:00:00Z"),
                Duration::from_secs(300),
                now()
            ),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_pass_result_labels() {
        assert_eq!(PassResult::Success.label(), Some("success"));
        assert_eq!(PassResult::Failed.label(), Some("error"));
        assert_eq!(PassResult::Skipped.label(), Some("skipped"));
        assert_eq!(PassResult::Deleted.label(), None);
    }
}
