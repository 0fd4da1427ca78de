//! # Image Update Controller
//!
//! A Kubernetes controller that keeps container image tags in GitOps
//! repositories up to date with a container registry.
//!
//! ## Overview
//!
//! For every `ImageUpdateConfig` resource the controller:
//!
//! 1. **Checks the registry** - Lists tags of an AWS ECR repository, filtered by an anchored regex
//! 2. **Picks the latest tag** - Highest semantic version, or lexicographically greatest tag
//! 3. **Updates the GitOps repository** - Clones the branch, rewrites the configured
//!    YAML/JSON paths (optionally only the tag part of an image reference), commits and pushes
//! 4. **Reports status** - `currentTag`, `latestTag`, timestamps and a `Ready` condition
//!
//! ## Features
//!
//! - **Interval gating**: each resource is checked at most once per `checkInterval`
//! - **Per-resource backoff**: Fibonacci backoff for failing resources
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

use anyhow::Result;
use image_update_controller::runtime::initialization::initialize;
use image_update_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(
        init_result.configs,
        init_result.reconciler,
        init_result.server_state,
    )
    .await
}
