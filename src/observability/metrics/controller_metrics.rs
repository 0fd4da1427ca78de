//! # Controller Metrics
//!
//! Per-resource reconciliation metrics plus a few controller-wide counters.
//!
//! Every labelled series that carries a resource namespace/name is recorded in
//! a bookkeeping table keyed by identity, so [`forget_resource`] can remove the
//! series of a deleted resource.

use crate::crd::ResourceIdentity;
use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use chrono::{DateTime, Utc};
use prometheus::{GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};
use std::collections::{HashMap, HashSet};
use std::sync::{LazyLock, Mutex};
use tracing::warn;

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "image_update_reconciliation_duration_seconds",
            "Time taken for ImageUpdateConfig reconciliation",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["namespace", "name", "result"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "image_update_reconciliations_total",
            "Total number of reconciliations performed",
        ),
        &["namespace", "name", "result"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static UPDATES_PERFORMED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "image_update_updates_performed_total",
            "Total number of successful updates performed",
        ),
        &["namespace", "name", "repository_type", "repository_name"],
    )
    .expect("Failed to create UPDATES_PERFORMED_TOTAL metric - this should never happen")
});

static FILES_UPDATED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("image_update_files_updated_total", "Total number of files updated"),
        &["namespace", "name", "file_path"],
    )
    .expect("Failed to create FILES_UPDATED_TOTAL metric - this should never happen")
});

static CURRENT_VERSION_INFO: LazyLock<GaugeVec> = LazyLock::new(|| {
    GaugeVec::new(
        Opts::new(
            "image_update_current_version_info",
            "Information about the version being monitored (value is always 1)",
        ),
        &["namespace", "name", "repository_name", "current_tag", "latest_tag"],
    )
    .expect("Failed to create CURRENT_VERSION_INFO metric - this should never happen")
});

static CONFIG_STATUS: LazyLock<GaugeVec> = LazyLock::new(|| {
    GaugeVec::new(
        Opts::new(
            "image_update_config_status",
            "Status of ImageUpdateConfig conditions (1=true, 0=false)",
        ),
        &["namespace", "name", "condition_type"],
    )
    .expect("Failed to create CONFIG_STATUS metric - this should never happen")
});

static LAST_CHECK_TIMESTAMP: LazyLock<GaugeVec> = LazyLock::new(|| {
    GaugeVec::new(
        Opts::new(
            "image_update_last_check_timestamp_seconds",
            "Timestamp of the last repository check",
        ),
        &["namespace", "name", "repository_name"],
    )
    .expect("Failed to create LAST_CHECK_TIMESTAMP metric - this should never happen")
});

static LAST_UPDATE_TIMESTAMP: LazyLock<GaugeVec> = LazyLock::new(|| {
    GaugeVec::new(
        Opts::new(
            "image_update_last_update_timestamp_seconds",
            "Timestamp of the last successful update",
        ),
        &["namespace", "name", "repository_name"],
    )
    .expect("Failed to create LAST_UPDATE_TIMESTAMP metric - this should never happen")
});

static ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("image_update_errors_total", "Total number of errors encountered"),
        &["error_type", "namespace", "name"],
    )
    .expect("Failed to create ERRORS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "image_update_requeues_total",
            "Total number of reconciliation requeues",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static DURATION_PARSING_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "image_update_duration_parsing_errors_total",
        "Total number of checkInterval values that could not be parsed",
    )
    .expect("Failed to create DURATION_PARSING_ERRORS_TOTAL metric - this should never happen")
});

/// Per-resource series families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Family {
    ReconciliationDuration,
    Reconciliations,
    UpdatesPerformed,
    FilesUpdated,
    CurrentVersion,
    ConfigStatus,
    LastCheck,
    LastUpdate,
    Errors,
}

type SeriesSet = HashSet<(Family, Vec<String>)>;

static TRACKED_SERIES: LazyLock<Mutex<HashMap<ResourceIdentity, SeriesSet>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn track(identity: &ResourceIdentity, family: Family, labels: &[&str]) {
    match TRACKED_SERIES.lock() {
        Ok(mut tracked) => {
            tracked
                .entry(identity.clone())
                .or_default()
                .insert((family, labels.iter().map(|l| (*l).to_string()).collect()));
        }
        Err(e) => warn!("Failed to lock metric bookkeeping: {}", e),
    }
}

/// Whether any series is recorded for `identity`
#[cfg(test)]
pub(crate) fn is_tracked(identity: &ResourceIdentity) -> bool {
    TRACKED_SERIES
        .lock()
        .map(|tracked| tracked.contains_key(identity))
        .unwrap_or(false)
}

fn untrack(identity: &ResourceIdentity, family: Family) -> Vec<Vec<String>> {
    match TRACKED_SERIES.lock() {
        Ok(mut tracked) => {
            let Some(series) = tracked.get_mut(identity) else {
                return Vec::new();
            };
            let removed: Vec<Vec<String>> = series
                .iter()
                .filter(|(f, _)| *f == family)
                .map(|(_, labels)| labels.clone())
                .collect();
            series.retain(|(f, _)| *f != family);
            removed
        }
        Err(e) => {
            warn!("Failed to lock metric bookkeeping: {}", e);
            Vec::new()
        }
    }
}

fn remove_series(family: Family, labels: &[String]) {
    let values: Vec<&str> = labels.iter().map(String::as_str).collect();
    // A missing series is not an error worth reporting
    let _ = match family {
        Family::ReconciliationDuration => RECONCILIATION_DURATION.remove_label_values(&values),
        Family::Reconciliations => RECONCILIATIONS_TOTAL.remove_label_values(&values),
        Family::UpdatesPerformed => UPDATES_PERFORMED_TOTAL.remove_label_values(&values),
        Family::FilesUpdated => FILES_UPDATED_TOTAL.remove_label_values(&values),
        Family::CurrentVersion => CURRENT_VERSION_INFO.remove_label_values(&values),
        Family::ConfigStatus => CONFIG_STATUS.remove_label_values(&values),
        Family::LastCheck => LAST_CHECK_TIMESTAMP.remove_label_values(&values),
        Family::LastUpdate => LAST_UPDATE_TIMESTAMP.remove_label_values(&values),
        Family::Errors => ERRORS_TOTAL.remove_label_values(&values),
    };
}

#[allow(
    clippy::cast_precision_loss,
    reason = "Unix timestamps in seconds fit comfortably in f64"
)]
fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UPDATES_PERFORMED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FILES_UPDATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CURRENT_VERSION_INFO.clone()))?;
    REGISTRY.register(Box::new(CONFIG_STATUS.clone()))?;
    REGISTRY.register(Box::new(LAST_CHECK_TIMESTAMP.clone()))?;
    REGISTRY.register(Box::new(LAST_UPDATE_TIMESTAMP.clone()))?;
    REGISTRY.register(Box::new(ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DURATION_PARSING_ERRORS_TOTAL.clone()))?;
    Ok(())
}

// Public functions for controller metrics

/// Record one finished pass; `result` is `success`, `error` or `skipped`
pub fn observe_reconciliation(identity: &ResourceIdentity, result: &str, duration: f64) {
    let labels = [identity.namespace.as_str(), identity.name.as_str(), result];
    RECONCILIATIONS_TOTAL.with_label_values(&labels).inc();
    RECONCILIATION_DURATION
        .with_label_values(&labels)
        .observe(duration);
    track(identity, Family::Reconciliations, &labels);
    track(identity, Family::ReconciliationDuration, &labels);
}

pub fn increment_updates_performed(
    identity: &ResourceIdentity,
    repository_type: &str,
    repository_name: &str,
) {
    let labels = [
        identity.namespace.as_str(),
        identity.name.as_str(),
        repository_type,
        repository_name,
    ];
    UPDATES_PERFORMED_TOTAL.with_label_values(&labels).inc();
    track(identity, Family::UpdatesPerformed, &labels);
}

pub fn increment_files_updated(identity: &ResourceIdentity, file_path: &str) {
    let labels = [identity.namespace.as_str(), identity.name.as_str(), file_path];
    FILES_UPDATED_TOTAL.with_label_values(&labels).inc();
    track(identity, Family::FilesUpdated, &labels);
}

/// Replace the version info series of a resource
pub fn set_current_version(
    identity: &ResourceIdentity,
    repository_name: &str,
    current_tag: &str,
    latest_tag: &str,
) {
    for labels in untrack(identity, Family::CurrentVersion) {
        remove_series(Family::CurrentVersion, &labels);
    }
    let labels = [
        identity.namespace.as_str(),
        identity.name.as_str(),
        repository_name,
        current_tag,
        latest_tag,
    ];
    CURRENT_VERSION_INFO.with_label_values(&labels).set(1.0);
    track(identity, Family::CurrentVersion, &labels);
}

pub fn set_condition_status(identity: &ResourceIdentity, condition_type: &str, status: bool) {
    let labels = [identity.namespace.as_str(), identity.name.as_str(), condition_type];
    CONFIG_STATUS
        .with_label_values(&labels)
        .set(if status { 1.0 } else { 0.0 });
    track(identity, Family::ConfigStatus, &labels);
}

pub fn set_last_check_timestamp(identity: &ResourceIdentity, repository_name: &str, at: DateTime<Utc>) {
    let labels = [identity.namespace.as_str(), identity.name.as_str(), repository_name];
    LAST_CHECK_TIMESTAMP
        .with_label_values(&labels)
        .set(unix_seconds(at));
    track(identity, Family::LastCheck, &labels);
}

pub fn set_last_update_timestamp(identity: &ResourceIdentity, repository_name: &str, at: DateTime<Utc>) {
    let labels = [identity.namespace.as_str(), identity.name.as_str(), repository_name];
    LAST_UPDATE_TIMESTAMP
        .with_label_values(&labels)
        .set(unix_seconds(at));
    track(identity, Family::LastUpdate, &labels);
}

/// `error_type` is one of `repository`, `git`, `yaml`, `validation`, `status`
pub fn increment_errors(identity: &ResourceIdentity, error_type: &str) {
    let labels = [error_type, identity.namespace.as_str(), identity.name.as_str()];
    ERRORS_TOTAL.with_label_values(&labels).inc();
    track(identity, Family::Errors, &labels);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_duration_parsing_errors() {
    DURATION_PARSING_ERRORS_TOTAL.inc();
}

/// Drop every series recorded for a deleted resource
pub fn forget_resource(identity: &ResourceIdentity) {
    let series = match TRACKED_SERIES.lock() {
        Ok(mut tracked) => tracked.remove(identity).unwrap_or_default(),
        Err(e) => {
            warn!("Failed to lock metric bookkeeping: {}", e);
            return;
        }
    };
    for (family, labels) in series {
        remove_series(family, &labels);
    }
}
