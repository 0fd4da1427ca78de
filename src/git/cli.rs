//! # Git CLI Porcelain
//!
//! [`GitPorcelain`] implemented by shelling out to the `git` binary.
//!
//! - personal access tokens are injected into `https://` remote URLs
//! - SSH keys are written to a private scratch file used via `GIT_SSH_COMMAND`
//! - `GIT_TERMINAL_PROMPT=0` is set for every command so git never blocks on input

use super::{CommitOutcome, GitError, GitPorcelain, WorkingCopy};
use crate::credentials::SecretSource;
use crate::crd::GitConfig;
use crate::observability::metrics;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, info_span, Instrument};

/// Git porcelain backed by the git command line
pub struct GitCli {
    binary: String,
    workspace_dir: Option<PathBuf>,
    secrets: Arc<dyn SecretSource>,
}

impl std::fmt::Debug for GitCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitCli")
            .field("binary", &self.binary)
            .field("workspace_dir", &self.workspace_dir)
            .finish_non_exhaustive()
    }
}

/// Insert a token as the user part of an `https://` URL
///
/// Other schemes are returned unchanged.
pub fn authenticated_url(repository: &str, token: &str) -> String {
    match repository.strip_prefix("https://") {
        Some(rest) => {
            // Drop any userinfo already present
            let host_and_path = match rest.find('@') {
                Some(at) if !rest[..at].contains('/') => &rest[at + 1..],
                _ => rest,
            };
            format!("https://{token}@{host_and_path}")
        }
        None => repository.to_string(),
    }
}

fn ssh_command(key_path: &Path) -> String {
    format!(
        "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
        key_path.display()
    )
}

impl GitCli {
    pub fn new(
        binary: impl Into<String>,
        workspace_dir: Option<PathBuf>,
        secrets: Arc<dyn SecretSource>,
    ) -> Self {
        Self {
            binary: binary.into(),
            workspace_dir,
            secrets,
        }
    }

    fn temp_dir(&self, prefix: &str) -> Result<TempDir, GitError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        match &self.workspace_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
        .map_err(GitError::Workspace)
    }

    async fn write_ssh_key(&self, key: &str) -> Result<(TempDir, PathBuf), GitError> {
        let dir = self.temp_dir("iuc-ssh-")?;
        let path = dir.path().join("id_key");
        let mut contents = key.to_string();
        if !contents.ends_with('\n') {
            contents.push('\n');
        }
        tokio::fs::write(&path, contents)
            .await
            .map_err(GitError::Workspace)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(GitError::Workspace)?;
        }
        Ok((dir, path))
    }

    /// Run one git command; non-zero exit becomes [`GitError::Command`]
    ///
    /// Output is redacted with the working copy's credential text.
    async fn run(
        &self,
        operation: &'static str,
        copy: &WorkingCopy,
        cwd: Option<&Path>,
        args: &[&str],
    ) -> Result<Output, GitError> {
        let output = self
            .command(cwd, args, copy.env())
            .output()
            .await
            .map_err(|source| GitError::Spawn { operation, source })?;

        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() { stdout } else { stderr };
            Err(GitError::Command {
                operation,
                message: copy.redact(detail.trim()),
            })
        }
    }

    fn command(&self, cwd: Option<&Path>, args: &[&str], env: &[(String, String)]) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(args).env("GIT_TERMINAL_PROMPT", "0").kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        for (key, value) in env {
            command.env(key, value);
        }
        command
    }

    async fn clone_into(&self, namespace: &str, git: &GitConfig) -> Result<WorkingCopy, GitError> {
        let checkout_dir = self.temp_dir("iuc-checkout-")?;
        let mut copy = WorkingCopy::new(checkout_dir, git.repository.clone(), git.branch.clone());

        let mut url = git.repository.clone();
        if let Some(token_ref) = &git.auth.personal_access_token_ref {
            let token = self
                .secrets
                .read_key(namespace, token_ref)
                .await
                .map_err(|e| GitError::Credentials(e.to_string()))?;
            let token = token.trim().to_string();
            url = authenticated_url(&git.repository, &token);
            copy = copy.with_redaction(token);
        }
        if let Some(key_ref) = &git.auth.ssh_key_ref {
            let key = self
                .secrets
                .read_key(namespace, key_ref)
                .await
                .map_err(|e| GitError::Credentials(e.to_string()))?;
            let (key_dir, key_path) = self.write_ssh_key(&key).await?;
            copy = copy
                .with_env("GIT_SSH_COMMAND", ssh_command(&key_path))
                .with_scratch_dir(key_dir);
        }

        let root = copy.root().to_string_lossy().into_owned();
        self.run(
            "clone",
            &copy,
            None,
            &[
                "clone",
                "--single-branch",
                "--branch",
                git.branch.as_str(),
                "--depth",
                "1",
                url.as_str(),
                root.as_str(),
            ],
        )
        .await?;

        let root_path = copy.root();
        self.run(
            "config",
            &copy,
            Some(root_path),
            &["config", "user.name", git.name.as_str()],
        )
        .await?;
        self.run(
            "config",
            &copy,
            Some(root_path),
            &["config", "user.email", git.email.as_str()],
        )
        .await?;

        Ok(copy)
    }

    async fn push(&self, copy: &WorkingCopy, message: &str) -> Result<CommitOutcome, GitError> {
        let root = copy.root();

        self.run("add", copy, Some(root), &["add", "-A"]).await?;

        // Exit status 0 means the index matches HEAD
        let staged = self
            .command(Some(root), &["diff", "--cached", "--quiet"], copy.env())
            .status()
            .await
            .map_err(|source| GitError::Spawn {
                operation: "diff",
                source,
            })?;
        if staged.success() {
            debug!(repository = %copy.repository(), "No staged changes, skipping commit");
            return Ok(CommitOutcome::NothingToCommit);
        }

        self.run("commit", copy, Some(root), &["commit", "-m", message])
            .await?;
        self.run("push", copy, Some(root), &["push", "origin", copy.branch()])
            .await?;
        Ok(CommitOutcome::Pushed)
    }
}

fn result_label<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() {
        "success"
    } else {
        "error"
    }
}

#[async_trait]
impl GitPorcelain for GitCli {
    async fn checkout(&self, namespace: &str, git: &GitConfig) -> Result<WorkingCopy, GitError> {
        let span = info_span!(
            "git.clone",
            repository = %git.repository,
            branch = %git.branch
        );
        let start = Instant::now();
        let result = self.clone_into(namespace, git).instrument(span).await;
        metrics::observe_git_operation(
            "clone",
            &git.repository,
            result_label(&result),
            start.elapsed().as_secs_f64(),
        );
        if let Ok(copy) = &result {
            info!(
                repository = %git.repository,
                branch = %git.branch,
                path = %copy.root().display(),
                "Cloned repository"
            );
        }
        result
    }

    async fn commit_and_push(
        &self,
        copy: &WorkingCopy,
        message: &str,
    ) -> Result<CommitOutcome, GitError> {
        let span = info_span!(
            "git.push",
            repository = %copy.repository(),
            branch = %copy.branch()
        );
        let start = Instant::now();
        let result = self.push(copy, message).instrument(span).await;
        metrics::observe_git_operation(
            "push",
            copy.repository(),
            result_label(&result),
            start.elapsed().as_secs_f64(),
        );
        if let Ok(CommitOutcome::Pushed) = &result {
            info!(
                repository = %copy.repository(),
                branch = %copy.branch(),
                "Pushed commit"
            );
        }
        result
    }
}
