//! # Processing Metrics
//!
//! Metrics for the collaborators a pass blocks on: repository tag lookups and git operations.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};
use std::sync::LazyLock;

static REPOSITORY_CHECKS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "image_update_repository_checks_total",
            "Total number of repository checks performed",
        ),
        &["repository_type", "repository_name", "result"],
    )
    .expect("Failed to create REPOSITORY_CHECKS_TOTAL metric - this should never happen")
});

static REPOSITORY_CHECK_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "image_update_repository_check_duration_seconds",
            "Time taken for repository checks",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["repository_type", "repository_name"],
    )
    .expect("Failed to create REPOSITORY_CHECK_DURATION metric - this should never happen")
});

static GIT_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "image_update_git_operations_total",
            "Total number of Git operations performed",
        ),
        &["operation", "repository", "result"],
    )
    .expect("Failed to create GIT_OPERATIONS_TOTAL metric - this should never happen")
});

static GIT_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "image_update_git_operation_duration_seconds",
            "Time taken for Git operations",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["operation", "repository"],
    )
    .expect("Failed to create GIT_OPERATION_DURATION metric - this should never happen")
});

/// Register processing metrics with the registry
pub(crate) fn register_processing_metrics() -> Result<()> {
    REGISTRY.register(Box::new(REPOSITORY_CHECKS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REPOSITORY_CHECK_DURATION.clone()))?;
    REGISTRY.register(Box::new(GIT_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GIT_OPERATION_DURATION.clone()))?;
    Ok(())
}

pub fn observe_repository_check(
    repository_type: &str,
    repository_name: &str,
    result: &str,
    duration: f64,
) {
    REPOSITORY_CHECKS_TOTAL
        .with_label_values(&[repository_type, repository_name, result])
        .inc();
    REPOSITORY_CHECK_DURATION
        .with_label_values(&[repository_type, repository_name])
        .observe(duration);
}

pub fn observe_git_operation(operation: &str, repository: &str, result: &str, duration: f64) {
    GIT_OPERATIONS_TOTAL
        .with_label_values(&[operation, repository, result])
        .inc();
    GIT_OPERATION_DURATION
        .with_label_values(&[operation, repository])
        .observe(duration);
}
