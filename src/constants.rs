//! # Constants
//!
//! Default values shared by configuration, runtime and reconciler.

/// Default HTTP port for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// How long to wait for the HTTP server to bind (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Poll interval while waiting for the HTTP server (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Git executable
pub const DEFAULT_GIT_BINARY: &str = "git";

/// Requeue delay after a status write conflict (seconds)
pub const DEFAULT_CONFLICT_REQUEUE_SECS: u64 = 5;

/// Fibonacci error backoff bounds (minutes)
pub const DEFAULT_ERROR_BACKOFF_MIN_MINUTES: u64 = 1;
pub const DEFAULT_ERROR_BACKOFF_MAX_MINUTES: u64 = 10;

/// Fallback requeue when backoff state is unavailable (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Check interval used when `checkInterval` cannot be parsed (seconds)
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;

/// Field manager name for status patches
pub const FIELD_MANAGER: &str = "image-update-controller";

/// Condition type reported on every pass
pub const CONDITION_READY: &str = "Ready";

/// Condition reasons
pub const REASON_SYNCHRONIZED: &str = "Synchronized";
pub const REASON_REPOSITORY_ERROR: &str = "RepositoryError";
pub const REASON_UPDATE_ERROR: &str = "UpdateError";

/// Ready message after a successful pass
pub const MESSAGE_SYNCHRONIZED: &str = "Successfully synchronized with repository";

/// Commit message used when the descriptor does not set one
pub const DEFAULT_COMMIT_MESSAGE: &str = "Update container image to {tag}";
