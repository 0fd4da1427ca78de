//! # Credentials
//!
//! Reads credential material (git tokens, SSH keys, AWS secret keys) from
//! Kubernetes Secrets referenced by an `ImageUpdateConfig`.

use crate::crd::SecretKeySelector;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("secret '{namespace}/{name}' not found")]
    SecretNotFound { namespace: String, name: String },
    #[error("key '{key}' not found in secret '{namespace}/{name}'")]
    KeyNotFound {
        namespace: String,
        name: String,
        key: String,
    },
    #[error("key '{key}' in secret '{namespace}/{name}' is not valid UTF-8")]
    InvalidUtf8 {
        namespace: String,
        name: String,
        key: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("failed to read secret '{namespace}/{name}': {source}")]
    Api {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },
}

/// Source of Secret values
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Read one key of a Secret in `namespace`
    async fn read_key(
        &self,
        namespace: &str,
        selector: &SecretKeySelector,
    ) -> Result<String, CredentialError>;
}

/// Reads Secrets through the Kubernetes API
#[derive(Clone)]
pub struct KubeSecretSource {
    client: Client,
}

impl std::fmt::Debug for KubeSecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretSource").finish_non_exhaustive()
    }
}

impl KubeSecretSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretSource for KubeSecretSource {
    async fn read_key(
        &self,
        namespace: &str,
        selector: &SecretKeySelector,
    ) -> Result<String, CredentialError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = match secrets.get(&selector.name).await {
            Ok(secret) => secret,
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                return Err(CredentialError::SecretNotFound {
                    namespace: namespace.to_string(),
                    name: selector.name.clone(),
                });
            }
            Err(source) => {
                return Err(CredentialError::Api {
                    namespace: namespace.to_string(),
                    name: selector.name.clone(),
                    source,
                });
            }
        };

        secret_value(&secret, namespace, selector)
    }
}

/// Extract one key from a fetched Secret, checking `data` then `stringData`
pub fn secret_value(
    secret: &Secret,
    namespace: &str,
    selector: &SecretKeySelector,
) -> Result<String, CredentialError> {
    if let Some(bytes) = secret.data.as_ref().and_then(|d| d.get(&selector.key)) {
        return String::from_utf8(bytes.0.clone()).map_err(|source| CredentialError::InvalidUtf8 {
            namespace: namespace.to_string(),
            name: selector.name.clone(),
            key: selector.key.clone(),
            source,
        });
    }
    secret
        .string_data
        .as_ref()
        .and_then(|d| d.get(&selector.key))
        .cloned()
        .ok_or_else(|| CredentialError::KeyNotFound {
            namespace: namespace.to_string(),
            name: selector.name.clone(),
            key: selector.key.clone(),
        })
}
