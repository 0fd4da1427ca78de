//! # Controller Settings
//!
//! Watch scope, git workspace and error handling knobs.

use super::{env_var_opt, env_var_or_default};
use crate::constants::{
    DEFAULT_CONFLICT_REQUEUE_SECS, DEFAULT_ERROR_BACKOFF_MAX_MINUTES,
    DEFAULT_ERROR_BACKOFF_MIN_MINUTES, DEFAULT_GIT_BINARY,
};
use std::path::PathBuf;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; all namespaces when `None`
    pub watch_namespace: Option<String>,
    /// Git executable used by the git porcelain
    pub git_binary: String,
    /// Parent directory for ephemeral checkouts; system temp dir when `None`
    pub workspace_dir: Option<PathBuf>,
    /// Requeue delay after a status write conflict (seconds)
    pub conflict_requeue_secs: u64,
    /// Fibonacci backoff lower bound (minutes)
    pub error_backoff_min_minutes: u64,
    /// Fibonacci backoff upper bound (minutes)
    pub error_backoff_max_minutes: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            git_binary: DEFAULT_GIT_BINARY.to_string(),
            workspace_dir: None,
            conflict_requeue_secs: DEFAULT_CONFLICT_REQUEUE_SECS,
            error_backoff_min_minutes: DEFAULT_ERROR_BACKOFF_MIN_MINUTES,
            error_backoff_max_minutes: DEFAULT_ERROR_BACKOFF_MAX_MINUTES,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let min = env_var_or_default(
            "ERROR_BACKOFF_MIN_MINUTES",
            DEFAULT_ERROR_BACKOFF_MIN_MINUTES,
        )
        .max(1);
        let max = env_var_or_default(
            "ERROR_BACKOFF_MAX_MINUTES",
            DEFAULT_ERROR_BACKOFF_MAX_MINUTES,
        )
        .max(min);

        Self {
            watch_namespace: env_var_opt("WATCH_NAMESPACE"),
            git_binary: env_var_opt("GIT_BINARY").unwrap_or_else(|| DEFAULT_GIT_BINARY.to_string()),
            workspace_dir: env_var_opt("WORKSPACE_DIR").map(PathBuf::from),
            conflict_requeue_secs: env_var_or_default(
                "CONFLICT_REQUEUE_SECS",
                DEFAULT_CONFLICT_REQUEUE_SECS,
            ),
            error_backoff_min_minutes: min,
            error_backoff_max_minutes: max,
        }
    }

    pub fn conflict_requeue(&self) -> Duration {
        Duration::from_secs(self.conflict_requeue_secs)
    }
}
