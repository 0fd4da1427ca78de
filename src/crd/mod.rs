//! # Custom Resource Definitions
//!
//! CRD types for the Image Update Controller.
//!
//! This module contains the `ImageUpdateConfig` custom resource, which is the
//! resource descriptor driving one reconciliation target, and its related types.

mod status;

pub use status::{Condition, ConditionStatus, ImageUpdateConfigStatus};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default check interval applied when `checkInterval` is not set
pub const DEFAULT_CHECK_INTERVAL: &str = "5m";

/// Default git branch
pub const DEFAULT_BRANCH: &str = "main";

/// ImageUpdateConfig Custom Resource Definition
///
/// Declares which container repository to watch, which git repository to
/// update, and which files/keys inside that repository receive the new tag.
///
/// # Example
///
/// ```yaml
/// apiVersion: image-update.microscaler.io/v1
/// kind: ImageUpdateConfig
/// metadata:
///   name: nginx
///   namespace: default
/// spec:
///   repository:
///     type: ecr
///     ecr:
///       region: us-east-1
///       repositoryName: nginx
///       tagFilter: "1\\.[0-9]+"
///   git:
///     repository: https://github.com/example/deployments.git
///     name: Image Bot
///     email: bot@example.com
///     auth:
///       personalAccessTokenRef:
///         name: github-token
///         key: token
///   updateTargets:
///     - file: deployment.yaml
///       yamlPath: spec.template.spec.containers[0].image
///       imageTagOnly: true
///   checkInterval: 5m
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ImageUpdateConfig",
    group = "image-update.microscaler.io",
    version = "v1",
    namespaced,
    status = "ImageUpdateConfigStatus",
    shortname = "iuc",
    printcolumn = r#"{"name":"Repository", "type":"string", "jsonPath":".spec.repository.ecr.repositoryName"}, {"name":"Current Tag", "type":"string", "jsonPath":".status.currentTag"}, {"name":"Latest Tag", "type":"string", "jsonPath":".status.latestTag"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ImageUpdateConfigSpec {
    /// Container repository to watch for new tags
    pub repository: RepositoryConfig,
    /// Git repository receiving the updates
    pub git: GitConfig,
    /// Files and keys to rewrite, applied in order
    pub update_targets: Vec<UpdateTarget>,
    /// How often to check the repository for a new tag
    /// Format: Kubernetes duration string (e.g., "30s", "5m", "1h30m")
    /// Default: "5m"
    #[serde(default = "default_check_interval")]
    pub check_interval: String,
    /// Temporarily disable this configuration
    /// A disabled resource is inert: no repository checks and no status writes
    #[serde(default)]
    pub disabled: bool,
}

/// Repository source configuration
///
/// Kubernetes sends data in format: {"type": "ecr", "ecr": {...}}
/// We use externally tagged format and ignore the "type" field during deserialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum RepositoryConfig {
    /// Amazon Elastic Container Registry
    #[serde(rename = "ecr")]
    Ecr(EcrConfig),
}

impl RepositoryConfig {
    /// Source kind label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            RepositoryConfig::Ecr(_) => "ecr",
        }
    }

    /// Repository name within the source
    pub fn repository_name(&self) -> &str {
        match self {
            RepositoryConfig::Ecr(ecr) => &ecr.repository_name,
        }
    }

    /// Optional tag filter pattern
    pub fn tag_filter(&self) -> Option<&str> {
        match self {
            RepositoryConfig::Ecr(ecr) => ecr.tag_filter.as_deref().filter(|f| !f.is_empty()),
        }
    }
}

impl<'de> serde::Deserialize<'de> for RepositoryConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, MapAccess, Visitor};

        struct RepositoryConfigVisitor;

        impl<'de> Visitor<'de> for RepositoryConfigVisitor {
            type Value = RepositoryConfig;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a repository config object with an ecr field")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut kind: Option<String> = None;
                let mut ecr: Option<EcrConfig> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "ecr" => {
                            if ecr.is_some() {
                                return Err(de::Error::duplicate_field("ecr"));
                            }
                            ecr = Some(map.next_value::<EcrConfig>().map_err(|e| {
                                de::Error::custom(format!("Failed to deserialize EcrConfig: {e}"))
                            })?);
                        }
                        "type" => {
                            kind = Some(map.next_value()?);
                        }
                        _ => {
                            let _: de::IgnoredAny = map.next_value()?;
                        }
                    }
                }

                if let Some(kind) = kind.as_deref() {
                    if kind != "ecr" {
                        return Err(de::Error::custom(format!(
                            "unsupported repository type: {kind}"
                        )));
                    }
                }

                match ecr {
                    Some(config) => Ok(RepositoryConfig::Ecr(config)),
                    None => Err(de::Error::custom(
                        "ECR configuration is required when repository type is 'ecr'",
                    )),
                }
            }
        }

        deserializer.deserialize_map(RepositoryConfigVisitor)
    }
}

/// AWS ECR repository configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EcrConfig {
    /// AWS region where the repository lives (e.g., "us-east-1")
    pub region: String,
    /// ECR repository name
    pub repository_name: String,
    /// Regex applied to every candidate tag; anchored at both ends
    #[serde(default)]
    pub tag_filter: Option<String>,
    /// Authentication configuration. Defaults to IRSA / the default credential chain.
    #[serde(default)]
    pub auth: Option<EcrAuthConfig>,
}

/// ECR authentication configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EcrAuthConfig {
    /// Use IAM Roles for Service Accounts (default credential chain)
    #[serde(default, rename = "useIRSA", alias = "useIrsa")]
    pub use_irsa: bool,
    /// Static access key id (only when not using IRSA)
    #[serde(default, rename = "accessKeyID", alias = "accessKeyId")]
    pub access_key_id: Option<String>,
    /// Secret holding the secret access key matching `accessKeyID`
    #[serde(default)]
    pub secret_access_key_ref: Option<SecretKeySelector>,
}

/// Git repository configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitConfig {
    /// Repository URL (e.g., https://github.com/owner/repo.git)
    pub repository: String,
    /// Branch to update
    /// Default: "main"
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Authentication configuration
    #[serde(default)]
    pub auth: GitAuthConfig,
    /// Commit message template
    /// Placeholders: {tag}, {previousTag}, {repository}
    #[serde(default)]
    pub commit_message: Option<String>,
    /// Committer email
    pub email: String,
    /// Committer name
    pub name: String,
}

/// Git authentication configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitAuthConfig {
    /// Personal access token for HTTPS remotes
    #[serde(default)]
    pub personal_access_token_ref: Option<SecretKeySelector>,
    /// Private key for SSH remotes
    #[serde(default)]
    pub ssh_key_ref: Option<SecretKeySelector>,
}

/// A file/key to rewrite inside the git repository
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTarget {
    /// File path relative to the repository root
    pub file: String,
    /// Path expression inside the document (e.g., "spec.template.spec.containers[0].image")
    pub yaml_path: String,
    /// Rewrite only the tag suffix of an image reference
    #[serde(default)]
    pub image_tag_only: bool,
}

/// Selects a key of a Secret in the resource namespace
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    /// Secret name
    pub name: String,
    /// Key within the secret data
    pub key: String,
}

/// Opaque identity of a resource descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentity {
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of a fetched resource
    pub fn of(config: &ImageUpdateConfig) -> Self {
        Self::new(
            config.metadata.namespace.as_deref().unwrap_or("default"),
            config.metadata.name.as_deref().unwrap_or("unknown"),
        )
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Immutable snapshot of a resource descriptor for one reconciliation pass
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    pub identity: ResourceIdentity,
    pub generation: Option<i64>,
    pub spec: ImageUpdateConfigSpec,
}

impl ResourceDescriptor {
    pub fn from_resource(config: &ImageUpdateConfig) -> Self {
        Self {
            identity: ResourceIdentity::of(config),
            generation: config.metadata.generation,
            spec: config.spec.clone(),
        }
    }
}

fn default_check_interval() -> String {
    DEFAULT_CHECK_INTERVAL.to_string()
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}
