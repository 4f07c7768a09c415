//! Gateway backed by a live Kubernetes API server.

use super::{gvk_id, ClusterGateway, GatewayError, ObjectKey, Result};
use crate::constants::OPERATOR_NAME;
use async_trait::async_trait;
use kube::{
    api::{Api, ApiResource, DeleteParams, ListParams, Patch, PatchParams},
    core::{DynamicObject, GroupVersionKind},
    discovery::{self, ApiCapabilities, Scope},
    Client,
};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// [`ClusterGateway`] over a kube [`Client`]
///
/// Kinds are resolved through API discovery on first use and cached for the
/// lifetime of the gateway.
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    kinds: Arc<Mutex<HashMap<String, (ApiResource, ApiCapabilities)>>>,
}

impl fmt::Debug for KubeGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self
            .kinds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("KubeGateway")
            .field("cached_kinds", &cached)
            .finish_non_exhaustive()
    }
}

impl KubeGateway {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            kinds: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, ApiCapabilities)> {
        let id = gvk_id(gvk);
        if let Some(found) = self
            .kinds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return Ok(found.clone());
        }

        let resolved = discovery::pinned_kind(&self.client, gvk)
            .await
            .map_err(|e| match GatewayError::from(e) {
                // Unknown API groups surface as 404 from discovery
                GatewayError::NotFound(_) => GatewayError::NoMatch(id.clone()),
                other => other,
            })?;
        debug!(kind = %id, "Resolved API resource");
        self.kinds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, resolved.clone());
        Ok(resolved)
    }

    async fn api(&self, gvk: &GroupVersionKind, namespace: Option<&str>) -> Result<Api<DynamicObject>> {
        let (resource, caps) = self.resolve(gvk).await?;
        Ok(match namespace {
            Some(ns) if matches!(caps.scope, Scope::Namespaced) => {
                Api::namespaced_with(self.client.clone(), ns, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        })
    }

    async fn is_cluster_scoped(&self, gvk: &GroupVersionKind) -> Result<bool> {
        let (_, caps) = self.resolve(gvk).await?;
        Ok(matches!(caps.scope, Scope::Cluster))
    }
}

fn list_params(label_selector: Option<&str>) -> ListParams {
    match label_selector {
        Some(selector) => ListParams::default().labels(selector),
        None => ListParams::default(),
    }
}

/// Merge patch body for the status subresource, with an optional optimistic-lock precondition
fn status_patch(status: &serde_json::Value, resource_version: Option<&str>) -> serde_json::Value {
    match resource_version {
        Some(rv) => json!({ "metadata": { "resourceVersion": rv }, "status": status }),
        None => json!({ "status": status }),
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject> {
        let api = self.api(&key.gvk, key.namespace.as_deref()).await?;
        Ok(api.get(&key.name).await?)
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let api = self.api(gvk, namespace).await?;
        let list = api.list(&list_params(label_selector)).await?;
        Ok(list.items)
    }

    async fn apply(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let key = ObjectKey::for_object(obj)?;
        let mut body = obj.clone();
        body.metadata.managed_fields = None;
        body.metadata.resource_version = None;
        if self.is_cluster_scoped(&key.gvk).await? {
            body.metadata.namespace = None;
        }

        let api = self.api(&key.gvk, body.metadata.namespace.as_deref()).await?;
        let params = PatchParams::apply(OPERATOR_NAME).force();
        Ok(api.patch(&key.name, &params, &Patch::Apply(&body)).await?)
    }

    async fn merge_patch(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
    ) -> Result<DynamicObject> {
        let api = self.api(&key.gvk, key.namespace.as_deref()).await?;
        Ok(api
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        status: &serde_json::Value,
        resource_version: Option<&str>,
    ) -> Result<DynamicObject> {
        let api = self.api(&key.gvk, key.namespace.as_deref()).await?;
        Ok(api
            .patch_status(
                &key.name,
                &PatchParams::default(),
                &Patch::Merge(status_patch(status, resource_version)),
            )
            .await?)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        let api = self.api(&key.gvk, key.namespace.as_deref()).await?;
        api.delete(&key.name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn delete_collection(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<()> {
        let api = self.api(gvk, Some(namespace)).await?;
        api.delete_collection(&DeleteParams::default(), &list_params(label_selector))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_patch_carries_resource_version() {
        let patch = status_patch(&json!({"state": "Ready"}), Some("42"));
        assert_eq!(patch["metadata"]["resourceVersion"], "42");
        assert_eq!(patch["status"]["state"], "Ready");
    }

    #[test]
    fn test_status_patch_without_resource_version() {
        let patch = status_patch(&json!({"state": "Ready"}), None);
        assert!(patch.get("metadata").is_none());
    }
}
