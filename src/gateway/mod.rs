//! # Cluster Object Gateway
//!
//! Untyped access to cluster objects used by every part of the reconciler.
//!
//! The trait is the seam between reconciliation logic and the Kubernetes API:
//! [`KubeGateway`] talks to a live cluster, [`InMemoryGateway`] keeps objects in
//! memory for tests. Typed helpers in [`typed`] convert between `DynamicObject`
//! and `k8s-openapi` / CRD structs.

mod error;
mod kube_gateway;
mod memory;
pub mod typed;

pub use error::{ignore_not_found, GatewayError};
pub use kube_gateway::KubeGateway;
pub use memory::{Fault, InMemoryGateway, Mutation, MutationKind, Operation};

use async_trait::async_trait;
use kube::core::{DynamicObject, GroupVersionKind};
use std::fmt;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Identity of a single cluster object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKey {
    pub gvk: GroupVersionKind,
    /// `None` for cluster-scoped objects
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(gvk: GroupVersionKind, namespace: Option<&str>, name: &str) -> Self {
        Self {
            gvk,
            namespace: namespace.map(ToString::to_string),
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn namespaced(gvk: GroupVersionKind, namespace: &str, name: &str) -> Self {
        Self::new(gvk, Some(namespace), name)
    }

    #[must_use]
    pub fn cluster(gvk: GroupVersionKind, name: &str) -> Self {
        Self::new(gvk, None, name)
    }

    /// Key of an object loaded from a manifest or returned by the API
    pub fn for_object(obj: &DynamicObject) -> Result<Self> {
        let gvk = gvk_of(obj)?;
        let name = obj
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| GatewayError::InvalidObject(format!("{} without metadata.name", gvk.kind)))?;
        Ok(Self::new(gvk, obj.metadata.namespace.as_deref(), name))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.gvk.kind, ns, self.name),
            None => write!(f, "{} {}", self.gvk.kind, self.name),
        }
    }
}

/// Format a GVK as `apiVersion` (`group/version`, or `version` for the core group)
#[must_use]
pub fn api_version(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        gvk.version.clone()
    } else {
        format!("{}/{}", gvk.group, gvk.version)
    }
}

/// Stable string form of a GVK, used for de-duplication and caches
#[must_use]
pub fn gvk_id(gvk: &GroupVersionKind) -> String {
    format!("{}/{}", api_version(gvk), gvk.kind)
}

/// Read the GVK carried by an untyped object
pub fn gvk_of(obj: &DynamicObject) -> Result<GroupVersionKind> {
    let types = obj
        .types
        .as_ref()
        .ok_or_else(|| GatewayError::InvalidObject("object without apiVersion/kind".to_string()))?;
    let (group, version) = match types.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", types.api_version.as_str()),
    };
    if version.is_empty() || types.kind.is_empty() {
        return Err(GatewayError::InvalidObject(format!(
            "incomplete type information: apiVersion={:?} kind={:?}",
            types.api_version, types.kind
        )));
    }
    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}

/// Render a label map as a selector string (`k1=v1,k2=v2`)
#[must_use]
pub fn label_selector(labels: &[(&str, &str)]) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Get, list, apply, patch and delete untyped cluster objects
///
/// Implementations must report a missing object as [`GatewayError::NotFound`],
/// an optimistic-concurrency failure as [`GatewayError::Conflict`] and an
/// unknown kind as [`GatewayError::NoMatch`].
#[async_trait]
pub trait ClusterGateway: Send + Sync + fmt::Debug {
    /// Fetch a single object
    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject>;

    /// List objects of a kind, across all namespaces when `namespace` is `None`
    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>>;

    /// Server-side apply with forced ownership under the operator's field manager
    async fn apply(&self, obj: &DynamicObject) -> Result<DynamicObject>;

    /// JSON merge patch; a `metadata.resourceVersion` in the patch acts as a precondition
    async fn merge_patch(&self, key: &ObjectKey, patch: &serde_json::Value)
        -> Result<DynamicObject>;

    /// Replace the status subresource
    ///
    /// A `resource_version` acts as a precondition; a stale one fails with a conflict.
    async fn patch_status(
        &self,
        key: &ObjectKey,
        status: &serde_json::Value,
        resource_version: Option<&str>,
    ) -> Result<DynamicObject>;

    /// Delete a single object
    async fn delete(&self, key: &ObjectKey) -> Result<()>;

    /// Delete every object of a kind in a namespace matching the selector
    async fn delete_collection(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_version_core_and_grouped() {
        assert_eq!(api_version(&GroupVersionKind::gvk("", "v1", "Secret")), "v1");
        assert_eq!(
            api_version(&GroupVersionKind::gvk("apps", "v1", "Deployment")),
            "apps/v1"
        );
    }

    #[test]
    fn test_gvk_of_parses_type_meta() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "admissionregistration.k8s.io/v1",
            "kind": "MutatingWebhookConfiguration",
            "metadata": {"name": "hook"}
        }))
        .unwrap();
        let gvk = gvk_of(&obj).unwrap();
        assert_eq!(gvk.group, "admissionregistration.k8s.io");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "MutatingWebhookConfiguration");
    }

    #[test]
    fn test_object_key_requires_name() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {}
        }))
        .unwrap();
        assert!(matches!(
            ObjectKey::for_object(&obj),
            Err(GatewayError::InvalidObject(_))
        ));
    }

    #[test]
    fn test_label_selector_format() {
        assert_eq!(
            label_selector(&[("app.kubernetes.io/managed-by", "btp-manager")]),
            "app.kubernetes.io/managed-by=btp-manager"
        );
    }
}
