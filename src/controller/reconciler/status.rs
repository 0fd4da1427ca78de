//! # Kubernetes Store
//!
//! Descriptor source and status sink backed by the `ImageUpdateConfig` API.
//!
//! Status writes are merge patches against the status subresource that carry
//! `metadata.resourceVersion`, so the API server rejects a write based on a
//! stale read with 409 Conflict.

use super::types::{DescriptorSource, FetchError, StatusError, StatusSink, StatusSnapshot};
use crate::constants::FIELD_MANAGER;
use crate::crd::{ImageUpdateConfig, ResourceDescriptor, ResourceIdentity};
use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use tracing::debug;

/// `ImageUpdateConfig` access through the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, identity: &ResourceIdentity) -> Api<ImageUpdateConfig> {
        Api::namespaced(self.client.clone(), &identity.namespace)
    }
}

/// Build the status merge patch body
pub fn status_patch(snapshot: &StatusSnapshot) -> Result<serde_json::Value, serde_json::Error> {
    let mut patch = serde_json::json!({ "status": serde_json::to_value(&snapshot.status)? });
    if let Some(revision) = &snapshot.revision {
        patch["metadata"] = serde_json::json!({ "resourceVersion": revision });
    }
    Ok(patch)
}

#[async_trait]
impl DescriptorSource for KubeStore {
    async fn fetch(
        &self,
        identity: &ResourceIdentity,
    ) -> Result<Option<ResourceDescriptor>, FetchError> {
        match self.api(identity).get(&identity.name).await {
            Ok(config) => Ok(Some(ResourceDescriptor::from_resource(&config))),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                debug!(resource = %identity, "Resource not found");
                Ok(None)
            }
            Err(e) => Err(FetchError::new(identity, e)),
        }
    }
}

#[async_trait]
impl StatusSink for KubeStore {
    async fn read(&self, identity: &ResourceIdentity) -> Result<StatusSnapshot, StatusError> {
        match self.api(identity).get_status(&identity.name).await {
            Ok(config) => Ok(StatusSnapshot {
                status: config.status.unwrap_or_default(),
                revision: config.metadata.resource_version,
            }),
            // Deleted between fetch and read; the next fetch reports it
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(StatusSnapshot::default()),
            Err(e) => Err(StatusError::backend(identity, e)),
        }
    }

    async fn write(
        &self,
        identity: &ResourceIdentity,
        snapshot: &StatusSnapshot,
    ) -> Result<(), StatusError> {
        let patch = status_patch(snapshot).map_err(|e| StatusError::backend(identity, e))?;
        match self
            .api(identity)
            .patch_status(
                &identity.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
        {
            Ok(_) => {
                debug!(resource = %identity, "Status updated");
                Ok(())
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => Err(StatusError::Conflict {
                identity: identity.to_string(),
            }),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                debug!(resource = %identity, "Resource deleted before status write");
                Ok(())
            }
            Err(e) => Err(StatusError::backend(identity, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ImageUpdateConfigStatus;

    #[test]
    fn test_status_patch_carries_revision() {
        let snapshot = StatusSnapshot {
            status: ImageUpdateConfigStatus {
                current_tag: Some("1.21".to_string()),
                ..Default::default()
            },
            revision: Some("42".to_string()),
        };
        let patch = status_patch(&snapshot).unwrap();
        assert_eq!(patch["metadata"]["resourceVersion"], "42");
        assert_eq!(patch["status"]["currentTag"], "1.21");
    }

    #[test]
    fn test_status_patch_without_revision() {
        let patch = status_patch(&StatusSnapshot::default()).unwrap();
        assert!(patch.get("metadata").is_none());
        assert!(patch["status"].is_object());
    }
}
