//! # Validation
//!
//! Duration parsing and descriptor checks run before any file I/O.

use super::types::ValidationError;
use crate::constants::DEFAULT_CHECK_INTERVAL_SECS;
use crate::crd::ImageUpdateConfigSpec;
use crate::document;
use crate::git::check_relative_path;
use crate::observability::metrics;
use anyhow::Result;
use regex::Regex;
use std::time::Duration;
use tracing::warn;

/// Parse a Kubernetes/Go style duration string
///
/// Accepts one or more `<number><unit>` groups with units `ms`, `s`, `m`, `h`, `d`
/// (e.g. `30s`, `5m`, `1h30m`, `5m0s`). The total must be greater than zero.
pub fn parse_kubernetes_duration(duration_str: &str) -> Result<Duration> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    let lower = duration_trimmed.to_lowercase();
    let full_regex = Regex::new(r"^(?:\d+(?:ms|s|m|h|d))+$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;
    if !full_regex.is_match(&lower) {
        return Err(anyhow::anyhow!(
            "Invalid duration format '{}'. Expected format: <number><unit> (e.g., '30s', '5m', '1h30m')",
            duration_trimmed
        ));
    }

    let part_regex = Regex::new(r"(?P<number>\d+)(?P<unit>ms|s|m|h|d)")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    let mut total = Duration::ZERO;
    for captures in part_regex.captures_iter(&lower) {
        let (Some(number), Some(unit)) = (captures.name("number"), captures.name("unit")) else {
            continue;
        };
        let number: u64 = number.as_str().parse().map_err(|e| {
            anyhow::anyhow!(
                "Invalid duration number '{}' in '{}': {}",
                number.as_str(),
                duration_trimmed,
                e
            )
        })?;
        let part = match unit.as_str() {
            "ms" => Duration::from_millis(number),
            "s" => Duration::from_secs(number),
            "m" => Duration::from_secs(number.saturating_mul(60)),
            "h" => Duration::from_secs(number.saturating_mul(3600)),
            _ => Duration::from_secs(number.saturating_mul(86_400)),
        };
        total = total.saturating_add(part);
    }

    if total.is_zero() {
        return Err(anyhow::anyhow!(
            "Duration must be greater than 0, got '{}'",
            duration_trimmed
        ));
    }

    Ok(total)
}

/// Parse `checkInterval`, falling back to the default on bad input
///
/// A bad interval is a configuration problem, not a reason to stop gating:
/// the fallback keeps retries bounded.
pub fn check_interval_or_default(check_interval: &str) -> Duration {
    match parse_kubernetes_duration(check_interval) {
        Ok(duration) => duration,
        Err(e) => {
            warn!(
                check_interval = %check_interval,
                error = %e,
                "Invalid checkInterval, using default of {}s",
                DEFAULT_CHECK_INTERVAL_SECS
            );
            metrics::increment_duration_parsing_errors();
            Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS)
        }
    }
}

/// Check a descriptor before touching the git repository
pub fn validate_descriptor(spec: &ImageUpdateConfigSpec) -> Result<(), ValidationError> {
    if spec.update_targets.is_empty() {
        return Err(ValidationError(
            "updateTargets must contain at least one target".to_string(),
        ));
    }
    if spec.git.repository.trim().is_empty() {
        return Err(ValidationError("git.repository is required".to_string()));
    }
    if spec.git.name.trim().is_empty() {
        return Err(ValidationError("git.name is required".to_string()));
    }
    if spec.git.email.trim().is_empty() {
        return Err(ValidationError("git.email is required".to_string()));
    }
    if spec.git.branch.trim().is_empty() {
        return Err(ValidationError("git.branch must not be empty".to_string()));
    }

    for (index, target) in spec.update_targets.iter().enumerate() {
        check_relative_path(&target.file).map_err(|e| {
            ValidationError(format!("updateTargets[{index}].file: {e}"))
        })?;
        document::validate(&target.yaml_path).map_err(|e| {
            ValidationError(format!("updateTargets[{index}].yamlPath: {e}"))
        })?;
    }

    Ok(())
}
