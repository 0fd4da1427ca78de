//! # Git Porcelain
//!
//! Checkout, commit and push of the GitOps repository that receives tag updates.
//!
//! A checkout is a [`WorkingCopy`]: an ephemeral directory owned by exactly one
//! reconciliation pass. Its temporary directories are removed on
//! [`GitPorcelain::release`], and again as a backstop when the value is dropped
//! (e.g. when a pass is cancelled mid-flight).

pub mod cli;

use crate::crd::GitConfig;
use crate::constants::DEFAULT_COMMIT_MESSAGE;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::warn;

pub use cli::GitCli;

/// Git porcelain failures. Messages never contain credential text.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to prepare workspace: {0}")]
    Workspace(#[source] std::io::Error),
    #[error("failed to load git credentials: {0}")]
    Credentials(String),
    #[error("failed to run git {operation}: {source}")]
    Spawn {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("git {operation} failed: {message}")]
    Command {
        operation: &'static str,
        message: String,
    },
    #[error("invalid target file '{file}': {reason}")]
    InvalidTarget { file: String, reason: String },
}

/// Result of a commit-and-push call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A commit was created and pushed
    Pushed,
    /// Nothing was staged, so nothing was committed
    NothingToCommit,
}

/// An exclusively owned, ephemeral checkout
pub struct WorkingCopy {
    root: PathBuf,
    repository: String,
    branch: String,
    env: Vec<(String, String)>,
    redactions: Vec<String>,
    dirs: Vec<TempDir>,
}

impl std::fmt::Debug for WorkingCopy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingCopy")
            .field("root", &self.root)
            .field("repository", &self.repository)
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

impl WorkingCopy {
    /// Take ownership of `dir` as the checkout root
    pub fn new(dir: TempDir, repository: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            root: dir.path().to_path_buf(),
            repository: repository.into(),
            branch: branch.into(),
            env: Vec::new(),
            redactions: Vec::new(),
            dirs: vec![dir],
        }
    }

    /// Keep an additional temporary directory alive for the checkout's lifetime
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: TempDir) -> Self {
        self.dirs.push(dir);
        self
    }

    /// Environment applied to every git command run in this checkout
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Text that must never surface in errors or logs
    #[must_use]
    pub fn with_redaction(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.redactions.push(secret);
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remote URL without credentials
    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub(crate) fn env(&self) -> &[(String, String)] {
        &self.env
    }

    pub(crate) fn redact(&self, text: &str) -> String {
        redact(text, &self.redactions)
    }

    /// Resolve a repository-relative file path inside the checkout
    ///
    /// Absolute paths and `..` components are rejected so a target can never
    /// escape the checkout root.
    pub fn resolve(&self, file: &str) -> Result<PathBuf, GitError> {
        check_relative_path(file)?;
        Ok(self.root.join(file))
    }

    /// Remove the checkout from disk
    pub fn release(mut self) {
        for dir in self.dirs.drain(..) {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "Failed to remove checkout directory");
            }
        }
    }
}

/// Reject absolute paths, `..` components and empty paths
pub fn check_relative_path(file: &str) -> Result<(), GitError> {
    let invalid = |reason: &str| GitError::InvalidTarget {
        file: file.to_string(),
        reason: reason.to_string(),
    };
    if file.trim().is_empty() {
        return Err(invalid("path is empty"));
    }
    for component in Path::new(file).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => return Err(invalid("path must not contain '..'")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("path must be relative to the repository root"));
            }
        }
    }
    Ok(())
}

/// Replace every occurrence of a secret with `***`
pub fn redact(text: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), "***"))
}

/// Render a commit message template
///
/// Placeholders: `{tag}`, `{previousTag}`, `{repository}`. An unset or blank
/// template falls back to `Update container image to {tag}`.
pub fn render_commit_message(
    template: Option<&str>,
    tag: &str,
    previous_tag: Option<&str>,
    repository: &str,
) -> String {
    let template = template
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_COMMIT_MESSAGE);
    template
        .replace("{tag}", tag)
        .replace("{previousTag}", previous_tag.unwrap_or("none"))
        .replace("{repository}", repository)
}

/// Version-control operations consumed by the reconciler
#[async_trait]
pub trait GitPorcelain: Send + Sync {
    /// Clone the configured branch into a fresh working copy
    ///
    /// `namespace` is the descriptor namespace, used to read credential Secrets.
    async fn checkout(&self, namespace: &str, git: &GitConfig) -> Result<WorkingCopy, GitError>;

    /// Stage everything, commit and push. No staged changes is a success.
    async fn commit_and_push(
        &self,
        copy: &WorkingCopy,
        message: &str,
    ) -> Result<CommitOutcome, GitError>;

    /// Dispose of a working copy
    fn release(&self, copy: WorkingCopy) {
        copy.release();
    }
}
