//! # Deprovisioning
//!
//! Removal of the module when its BtpOperator CR is deleted.
//!
//! The service operator's domain resources (ServiceBindings and
//! ServiceInstances) are removed first, then every module resource.
//!
//! - **Hard delete** bulk-deletes the domain resources in every namespace and
//!   waits until none are left, bounded by the hard-delete timeout
//! - **Soft delete** is the fallback: it removes the service operator itself,
//!   then strips finalizers so the cluster can finish the deletion
//!
//! The caller sequences both paths and owns all status writes.

mod cleanup;
mod hard_delete;
mod soft_delete;

pub use cleanup::delete_module_resources;
pub use hard_delete::{hard_delete, run_hard_delete, HardDeleteOutcome};
pub use soft_delete::soft_delete;

use crate::constants::{SERVICE_BINDING_KIND, SERVICE_INSTANCE_KIND, SERVICE_OPERATOR_GROUP, SERVICE_OPERATOR_VERSION};
use crate::gateway::{ClusterGateway, GatewayError, ObjectKey};
use crate::manifest::ManifestError;
use kube::core::GroupVersionKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeprovisionError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Failed to create deletable objects from manifests: {0}")]
    Manifests(#[source] ManifestError),
    #[error("Failed to delete module resources: {0}")]
    ModuleResources(#[source] GatewayError),
    #[error("{0}; could not list in soft delete")]
    SoftDeleteList(#[source] GatewayError),
    #[error("list returned {count} records")]
    ResidualResources { kind: String, count: usize },
    #[error("hard delete failed: {}", .0.join(", "))]
    HardDelete(Vec<String>),
}

#[must_use]
pub fn service_binding_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(SERVICE_OPERATOR_GROUP, SERVICE_OPERATOR_VERSION, SERVICE_BINDING_KIND)
}

#[must_use]
pub fn service_instance_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(SERVICE_OPERATOR_GROUP, SERVICE_OPERATOR_VERSION, SERVICE_INSTANCE_KIND)
}

/// Name of the CRD defining `gvk`, e.g. `servicebindings.services.cloud.sap.com`
#[must_use]
pub fn crd_name(gvk: &GroupVersionKind) -> String {
    format!("{}s.{}", gvk.kind.to_lowercase(), gvk.group)
}

/// Whether the CRD defining `gvk` is installed
pub async fn crd_exists(
    gateway: &dyn ClusterGateway,
    gvk: &GroupVersionKind,
) -> Result<bool, GatewayError> {
    let key = ObjectKey::cluster(
        GroupVersionKind::gvk("apiextensions.k8s.io", "v1", "CustomResourceDefinition"),
        &crd_name(gvk),
    );
    match gateway.get(&key).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Names of all namespaces in the cluster
pub async fn list_namespaces(gateway: &dyn ClusterGateway) -> Result<Vec<String>, GatewayError> {
    let namespaces = gateway
        .list(&GroupVersionKind::gvk("", "v1", "Namespace"), None, None)
        .await?;
    Ok(namespaces
        .into_iter()
        .filter_map(|ns| ns.metadata.name)
        .collect())
}
