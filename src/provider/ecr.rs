//! # AWS ECR Tag Resolver
//!
//! Lists image tags of an ECR repository with `DescribeImages`.
//!
//! Authentication:
//! - default: AWS SDK default credential chain, which covers IRSA
//!   (web identity token mounted into the pod) and instance roles
//! - static: `accessKeyID` plus a Secret reference holding the secret access key
//!
//! One SDK client is cached per region and credential mode. The resolver is
//! shared by every reconciliation pass.

use super::{latest_matching, ResolveError, TagResolver};
use crate::credentials::SecretSource;
use crate::crd::{EcrAuthConfig, EcrConfig, RepositoryConfig};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_ecr::error::DisplayErrorContext;
use aws_sdk_ecr::Client as EcrClient;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Credential mode part of the client cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CredentialMode {
    DefaultChain,
    Static {
        access_key_id: String,
        /// Fingerprint of the secret key so a rotated Secret gets a fresh client
        secret_fingerprint: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    region: String,
    mode: CredentialMode,
}

/// ECR-backed [`TagResolver`]
pub struct EcrTagResolver {
    secrets: Arc<dyn SecretSource>,
    clients: Mutex<HashMap<ClientKey, EcrClient>>,
}

impl std::fmt::Debug for EcrTagResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcrTagResolver").finish_non_exhaustive()
    }
}

impl EcrTagResolver {
    pub fn new(secrets: Arc<dyn SecretSource>) -> Self {
        Self {
            secrets,
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn static_credentials(
        &self,
        namespace: &str,
        auth: &EcrAuthConfig,
    ) -> Result<Option<(String, String)>, ResolveError> {
        if auth.use_irsa {
            return Ok(None);
        }
        let (Some(access_key_id), Some(secret_ref)) =
            (auth.access_key_id.as_deref(), auth.secret_access_key_ref.as_ref())
        else {
            return Ok(None);
        };
        let secret_access_key = self
            .secrets
            .read_key(namespace, secret_ref)
            .await
            .map_err(|e| ResolveError::Credentials(e.to_string()))?;
        Ok(Some((access_key_id.to_string(), secret_access_key)))
    }

    async fn client_for(&self, namespace: &str, config: &EcrConfig) -> Result<EcrClient, ResolveError> {
        let credentials = match &config.auth {
            Some(auth) => self.static_credentials(namespace, auth).await?,
            None => None,
        };

        let key = ClientKey {
            region: config.region.clone(),
            mode: match &credentials {
                None => CredentialMode::DefaultChain,
                Some((access_key_id, secret)) => {
                    let mut hasher = DefaultHasher::new();
                    secret.hash(&mut hasher);
                    CredentialMode::Static {
                        access_key_id: access_key_id.clone(),
                        secret_fingerprint: hasher.finish(),
                    }
                }
            },
        };

        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let sdk_config = create_sdk_config(&config.region, credentials).await;
        let client = EcrClient::new(&sdk_config);
        info!(
            region = %config.region,
            static_credentials = matches!(key.mode, CredentialMode::Static { .. }),
            "Created ECR client"
        );
        clients.insert(key, client.clone());
        Ok(client)
    }
}

/// Create AWS SDK config for a region, optionally with static credentials
async fn create_sdk_config(region: &str, credentials: Option<(String, String)>) -> SdkConfig {
    let mut builder =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));

    if let Some((access_key_id, secret_access_key)) = credentials {
        builder = builder.credentials_provider(Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "image-update-controller",
        ));
    }

    builder.load().await
}

/// Collect every tag of a repository, following `nextToken`
async fn list_tags(client: &EcrClient, repository_name: &str) -> Result<Vec<String>, ResolveError> {
    let mut tags = Vec::new();
    let mut next_token: Option<String> = None;

    loop {
        let page = client
            .describe_images()
            .repository_name(repository_name)
            .set_next_token(next_token.take())
            .send()
            .await
            .map_err(|err| {
                let repository_missing = err
                    .as_service_error()
                    .is_some_and(|e| e.is_repository_not_found_exception());
                if repository_missing {
                    ResolveError::NotFound {
                        repository: repository_name.to_string(),
                        reason: "repository does not exist".to_string(),
                    }
                } else {
                    ResolveError::Transient(format!(
                        "failed to describe images in repository {repository_name}: {}",
                        DisplayErrorContext(&err)
                    ))
                }
            })?;

        for detail in page.image_details() {
            tags.extend(detail.image_tags().iter().cloned());
        }

        match page.next_token() {
            Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
            _ => break,
        }
    }

    debug!(repository = %repository_name, tags = tags.len(), "Listed ECR tags");
    Ok(tags)
}

#[async_trait]
impl TagResolver for EcrTagResolver {
    async fn resolve_latest(
        &self,
        namespace: &str,
        repository: &RepositoryConfig,
    ) -> Result<String, ResolveError> {
        let RepositoryConfig::Ecr(config) = repository;
        let client = self.client_for(namespace, config).await?;
        let tags = list_tags(&client, &config.repository_name).await?;
        latest_matching(
            &config.repository_name,
            tags.iter().map(String::as_str),
            repository.tag_filter(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialError;
    use crate::crd::SecretKeySelector;

    struct StaticSecrets;

    #[async_trait]
    impl SecretSource for StaticSecrets {
        async fn read_key(
            &self,
            namespace: &str,
            selector: &SecretKeySelector,
        ) -> Result<String, CredentialError> {
            if selector.name == "aws" {
                Ok("secret-value".to_string())
            } else {
                Err(CredentialError::SecretNotFound {
                    namespace: namespace.to_string(),
                    name: selector.name.clone(),
                })
            }
        }
    }

    fn auth(secret_name: &str) -> EcrAuthConfig {
        EcrAuthConfig {
            use_irsa: false,
            access_key_id: Some("AKIAEXAMPLE".to_string()),
            secret_access_key_ref: Some(SecretKeySelector {
                name: secret_name.to_string(),
                key: "secretAccessKey".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_static_credentials_are_read_from_secret() {
        let resolver = EcrTagResolver::new(Arc::new(StaticSecrets));
        let creds = resolver.static_credentials("default", &auth("aws")).await.unwrap();
        assert_eq!(
            creds,
            Some(("AKIAEXAMPLE".to_string(), "secret-value".to_string()))
        );
    }

    #[tokio::test]
    async fn test_irsa_skips_static_credentials() {
        let resolver = EcrTagResolver::new(Arc::new(StaticSecrets));
        let mut irsa = auth("aws");
        irsa.use_irsa = true;
        assert_eq!(resolver.static_credentials("default", &irsa).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_secret_is_credentials_error() {
        let resolver = EcrTagResolver::new(Arc::new(StaticSecrets));
        let err = resolver
            .static_credentials("default", &auth("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Credentials(_)));
    }
}
