//! # Conditions
//!
//! Find-or-append condition updates with transition-time bookkeeping.

use crate::crd::Condition;
use chrono::{DateTime, SecondsFormat, Utc};

/// Merge `update` into `existing`
///
/// - same type and same status: reason/message overwritten, transition time kept
/// - same type, different status: transition time set to `now`
/// - type absent: appended with transition time `now`
///
/// At most one record per type survives; duplicates of the updated type are dropped.
pub fn upsert_condition(
    existing: &[Condition],
    mut update: Condition,
    now: DateTime<Utc>,
) -> Vec<Condition> {
    let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let previous = existing.iter().find(|c| c.r#type == update.r#type);

    update.last_transition_time = match previous {
        Some(prev) if prev.status == update.status => {
            prev.last_transition_time.clone().or(Some(stamp))
        }
        _ => Some(stamp),
    };

    let mut result = Vec::with_capacity(existing.len() + 1);
    let mut placed = false;
    for condition in existing {
        if condition.r#type != update.r#type {
            result.push(condition.clone());
        } else if !placed {
            result.push(update.clone());
            placed = true;
        }
    }
    if !placed {
        result.push(update);
    }
    result
}
