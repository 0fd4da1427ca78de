//! # Tag Resolvers
//!
//! Container repositories the controller can watch for new tags.
//!
//! A resolver lists the tags of one repository and answers with the single
//! "latest" tag. Candidate filtering and ordering live here so every resolver
//! applies the same rules:
//!
//! - `tagFilter` is an anchored regular expression; a tag must match it entirely
//! - if any candidate is a semantic version (optional leading `v`), the highest
//!   semantic version wins, ties broken lexicographically
//! - otherwise the lexicographically greatest tag wins

pub mod ecr;

use crate::crd::RepositoryConfig;
use async_trait::async_trait;
use regex::Regex;
use std::cmp::Ordering;
use thiserror::Error;

pub use ecr::EcrTagResolver;

/// Tag resolver failures
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The repository has no tags, or none match the filter
    #[error("no tags found in repository {repository}: {reason}")]
    NotFound { repository: String, reason: String },
    #[error("invalid tag filter '{filter}': {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: regex::Error,
    },
    #[error("failed to load credentials: {0}")]
    Credentials(String),
    /// Registry call failed; expected to recover on a later pass
    #[error("repository request failed: {0}")]
    Transient(String),
}

/// Registry-backed source of the latest tag
#[async_trait]
pub trait TagResolver: Send + Sync {
    /// Resolve the latest tag of `repository`
    ///
    /// `namespace` is the namespace of the descriptor, used to look up
    /// credential Secrets it references.
    async fn resolve_latest(
        &self,
        namespace: &str,
        repository: &RepositoryConfig,
    ) -> Result<String, ResolveError>;
}

/// Compile a tag filter so it has to match a whole tag
pub fn compile_tag_filter(filter: Option<&str>) -> Result<Option<Regex>, ResolveError> {
    filter
        .map(|f| {
            Regex::new(&format!("^(?:{f})$")).map_err(|source| ResolveError::InvalidFilter {
                filter: f.to_string(),
                source,
            })
        })
        .transpose()
}

fn parse_semver(tag: &str) -> Option<semver::Version> {
    semver::Version::parse(tag.strip_prefix('v').unwrap_or(tag)).ok()
}

/// Pick the latest tag among `candidates`
pub fn select_latest<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let candidates: Vec<&str> = candidates.into_iter().filter(|t| !t.is_empty()).collect();

    let versioned = candidates
        .iter()
        .filter_map(|tag| parse_semver(tag).map(|version| (version, *tag)))
        .max_by(|(a, a_tag), (b, b_tag)| match a.cmp(b) {
            Ordering::Equal => a_tag.cmp(b_tag),
            other => other,
        });

    match versioned {
        Some((_, tag)) => Some(tag),
        None => candidates.into_iter().max(),
    }
}

/// Filter and order raw repository tags into the latest one
pub fn latest_matching<'a, I>(
    repository: &str,
    tags: I,
    filter: Option<&str>,
) -> Result<String, ResolveError>
where
    I: IntoIterator<Item = &'a str>,
{
    let filter_regex = compile_tag_filter(filter)?;
    let mut seen_any = false;
    let matching: Vec<&str> = tags
        .into_iter()
        .filter(|tag| !tag.is_empty())
        .inspect(|_| seen_any = true)
        .filter(|tag| filter_regex.as_ref().is_none_or(|re| re.is_match(tag)))
        .collect();

    select_latest(matching)
        .map(str::to_string)
        .ok_or_else(|| ResolveError::NotFound {
            repository: repository.to_string(),
            reason: if seen_any {
                format!("no tag matches filter '{}'", filter.unwrap_or_default())
            } else {
                "repository has no tagged images".to_string()
            },
        })
}
