//! # Test Fakes
//!
//! In-memory collaborators for driving the reconciler without a cluster,
//! a registry or a git remote.

#![allow(dead_code, reason = "each test binary uses a different subset of the fakes")]

use async_trait::async_trait;
use image_update_controller::config::ControllerConfig;
use image_update_controller::controller::reconciler::{
    DescriptorSource, FetchError, Reconciler, StatusError, StatusSink, StatusSnapshot,
};
use image_update_controller::crd::{
    EcrConfig, GitAuthConfig, GitConfig, ImageUpdateConfigSpec, ImageUpdateConfigStatus,
    RepositoryConfig, ResourceDescriptor, ResourceIdentity, UpdateTarget,
};
use image_update_controller::git::{CommitOutcome, GitError, GitPorcelain, WorkingCopy};
use image_update_controller::provider::{ResolveError, TagResolver};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const DEPLOYMENT_YAML: &str = r"apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 2
  template:
    spec:
      containers:
        - name: web
          image: docker.io/nginx:1.20
        - name: sidecar
          image: busybox:1.36
";

pub fn identity() -> ResourceIdentity {
    ResourceIdentity::new("default", "nginx")
}

pub fn target(file: &str, path: &str, image_tag_only: bool) -> UpdateTarget {
    UpdateTarget {
        file: file.to_string(),
        yaml_path: path.to_string(),
        image_tag_only,
    }
}

pub fn spec(targets: Vec<UpdateTarget>) -> ImageUpdateConfigSpec {
    ImageUpdateConfigSpec {
        repository: RepositoryConfig::Ecr(EcrConfig {
            region: "us-east-1".to_string(),
            repository_name: "nginx".to_string(),
            tag_filter: None,
            auth: None,
        }),
        git: GitConfig {
            repository: "https://github.com/example/deployments.git".to_string(),
            branch: "main".to_string(),
            auth: GitAuthConfig::default(),
            commit_message: None,
            email: "bot@example.com".to_string(),
            name: "Image Bot".to_string(),
        },
        update_targets: targets,
        check_interval: "5m".to_string(),
        disabled: false,
    }
}

pub fn descriptor(spec: ImageUpdateConfigSpec) -> ResourceDescriptor {
    ResourceDescriptor {
        identity: identity(),
        generation: Some(3),
        spec,
    }
}

/// Descriptor source holding at most one descriptor
#[derive(Default)]
pub struct FakeDescriptors {
    pub descriptor: Mutex<Option<ResourceDescriptor>>,
    pub fail: AtomicBool,
}

impl FakeDescriptors {
    pub fn with(descriptor: ResourceDescriptor) -> Self {
        Self {
            descriptor: Mutex::new(Some(descriptor)),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DescriptorSource for FakeDescriptors {
    async fn fetch(
        &self,
        identity: &ResourceIdentity,
    ) -> Result<Option<ResourceDescriptor>, FetchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::new(identity, "api server unavailable"));
        }
        Ok(self.descriptor.lock().unwrap().clone())
    }
}

/// Status sink with revision checking
///
/// Every successful write bumps the revision, so writing with a stale
/// snapshot fails with a conflict just like the API server would.
#[derive(Default)]
pub struct FakeStatus {
    pub current: Mutex<StatusSnapshot>,
    pub writes: Mutex<Vec<ImageUpdateConfigStatus>>,
    /// Bump the revision behind the reconciler's back on the next read
    pub race_next_read: AtomicBool,
}

impl FakeStatus {
    pub fn with(status: ImageUpdateConfigStatus) -> Self {
        Self {
            current: Mutex::new(StatusSnapshot {
                status,
                revision: Some("1".to_string()),
            }),
            ..Default::default()
        }
    }

    pub fn status(&self) -> ImageUpdateConfigStatus {
        self.current.lock().unwrap().status.clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    fn bump(snapshot: &mut StatusSnapshot) {
        let next = snapshot
            .revision
            .as_deref()
            .and_then(|r| r.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        snapshot.revision = Some(next.to_string());
    }
}

#[async_trait]
impl StatusSink for FakeStatus {
    async fn read(&self, _identity: &ResourceIdentity) -> Result<StatusSnapshot, StatusError> {
        let mut current = self.current.lock().unwrap();
        let snapshot = current.clone();
        if self.race_next_read.swap(false, Ordering::SeqCst) {
            Self::bump(&mut current);
        }
        Ok(snapshot)
    }

    async fn write(
        &self,
        identity: &ResourceIdentity,
        snapshot: &StatusSnapshot,
    ) -> Result<(), StatusError> {
        let mut current = self.current.lock().unwrap();
        if current.revision != snapshot.revision {
            return Err(StatusError::Conflict {
                identity: identity.to_string(),
            });
        }
        current.status = snapshot.status.clone();
        Self::bump(&mut current);
        self.writes.lock().unwrap().push(snapshot.status.clone());
        Ok(())
    }
}

/// Tag resolver answering with a fixed tag or error
pub struct FakeResolver {
    pub answer: Mutex<Result<String, String>>,
    pub calls: AtomicUsize,
}

impl FakeResolver {
    pub fn tag(tag: &str) -> Self {
        Self {
            answer: Mutex::new(Ok(tag.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            answer: Mutex::new(Err(message.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TagResolver for FakeResolver {
    async fn resolve_latest(
        &self,
        _namespace: &str,
        _repository: &RepositoryConfig,
    ) -> Result<String, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
            .lock()
            .unwrap()
            .clone()
            .map_err(ResolveError::Transient)
    }
}

/// Compare two YAML/JSON documents by value; re-emitting changes formatting
fn same_document(a: &str, b: &str) -> bool {
    match (
        serde_yaml::from_str::<serde_yaml::Value>(a),
        serde_yaml::from_str::<serde_yaml::Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// A push captured by [`FakeGit`]
#[derive(Debug, Clone)]
pub struct Push {
    pub message: String,
    pub files: BTreeMap<String, String>,
}

/// Git porcelain backed by temporary directories
///
/// A checkout is seeded with `files`; a push records the message and the
/// content of every seeded file at push time.
#[derive(Default)]
pub struct FakeGit {
    pub files: BTreeMap<String, String>,
    pub checkouts: AtomicUsize,
    pub releases: AtomicUsize,
    pub pushes: Mutex<Vec<Push>>,
    pub fail_checkout: AtomicBool,
    pub fail_push: AtomicBool,
    pub roots: Mutex<Vec<std::path::PathBuf>>,
}

impl FakeGit {
    pub fn with_file(name: &str, content: &str) -> Self {
        let mut files = BTreeMap::new();
        files.insert(name.to_string(), content.to_string());
        Self {
            files,
            ..Default::default()
        }
    }

    pub fn checkouts(&self) -> usize {
        self.checkouts.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> Vec<Push> {
        self.pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl GitPorcelain for FakeGit {
    async fn checkout(&self, _namespace: &str, git: &GitConfig) -> Result<WorkingCopy, GitError> {
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        if self.fail_checkout.load(Ordering::SeqCst) {
            return Err(GitError::Command {
                operation: "clone",
                message: "repository not found".to_string(),
            });
        }
        let dir = tempfile::tempdir().map_err(GitError::Workspace)?;
        for (name, content) in &self.files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(GitError::Workspace)?;
            }
            std::fs::write(&path, content).map_err(GitError::Workspace)?;
        }
        self.roots.lock().unwrap().push(dir.path().to_path_buf());
        Ok(WorkingCopy::new(dir, git.repository.clone(), git.branch.clone()))
    }

    async fn commit_and_push(
        &self,
        copy: &WorkingCopy,
        message: &str,
    ) -> Result<CommitOutcome, GitError> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(GitError::Command {
                operation: "push",
                message: "rejected: non-fast-forward".to_string(),
            });
        }
        let mut files = BTreeMap::new();
        let mut changed = false;
        for (name, original) in &self.files {
            let content =
                std::fs::read_to_string(copy.root().join(name)).map_err(GitError::Workspace)?;
            changed |= !same_document(&content, original);
            files.insert(name.clone(), content);
        }
        if !changed {
            return Ok(CommitOutcome::NothingToCommit);
        }
        self.pushes.lock().unwrap().push(Push {
            message: message.to_string(),
            files,
        });
        Ok(CommitOutcome::Pushed)
    }

    fn release(&self, copy: WorkingCopy) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        copy.release();
    }
}

/// The fakes wired into a reconciler
pub struct Harness {
    pub descriptors: Arc<FakeDescriptors>,
    pub status: Arc<FakeStatus>,
    pub resolver: Arc<FakeResolver>,
    pub git: Arc<FakeGit>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new(
        descriptors: FakeDescriptors,
        status: FakeStatus,
        resolver: FakeResolver,
        git: FakeGit,
    ) -> Self {
        let descriptors = Arc::new(descriptors);
        let status = Arc::new(status);
        let resolver = Arc::new(resolver);
        let git = Arc::new(git);
        let reconciler = Reconciler::new(
            Arc::<FakeDescriptors>::clone(&descriptors),
            Arc::<FakeStatus>::clone(&status),
            Arc::<FakeResolver>::clone(&resolver),
            Arc::<FakeGit>::clone(&git),
            ControllerConfig::default(),
        );
        Self {
            descriptors,
            status,
            resolver,
            git,
            reconciler,
        }
    }
}
