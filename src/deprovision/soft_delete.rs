//! Soft delete: strip finalizers and let the cluster finish the deletion.

use super::{
    crd_exists, delete_module_resources, service_binding_gvk, service_instance_gvk,
    DeprovisionError,
};
use crate::certs::webhook::{ADMISSION_REGISTRATION_GROUP, MUTATING_WEBHOOK_KIND, VALIDATING_WEBHOOK_KIND};
use crate::config::OperatorConfig;
use crate::constants::{MUTATING_WEBHOOK_NAME, SERVICE_BINDING_KIND, VALIDATING_WEBHOOK_NAME};
use crate::gateway::{ignore_not_found, ClusterGateway, ObjectKey};
use kube::core::GroupVersionKind;
use serde_json::json;
use tracing::{error, info};

/// Remove the service operator Deployment and both webhook configurations
///
/// The service operator would otherwise re-add finalizers or reject the
/// finalizer removal through its webhooks.
async fn pre_soft_delete_cleanup(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
) -> Result<(), DeprovisionError> {
    let targets = [
        ObjectKey::namespaced(
            GroupVersionKind::gvk("apps", "v1", "Deployment"),
            &config.chart_namespace,
            &config.deployment_name,
        ),
        ObjectKey::cluster(
            GroupVersionKind::gvk(ADMISSION_REGISTRATION_GROUP, "v1", MUTATING_WEBHOOK_KIND),
            MUTATING_WEBHOOK_NAME,
        ),
        ObjectKey::cluster(
            GroupVersionKind::gvk(ADMISSION_REGISTRATION_GROUP, "v1", VALIDATING_WEBHOOK_KIND),
            VALIDATING_WEBHOOK_NAME,
        ),
    ];
    for key in &targets {
        ignore_not_found(gateway.delete(key).await)?;
        info!(resource = %key, "Deleted");
    }
    Ok(())
}

/// Delete every object of `gvk` and clear its finalizers
///
/// For ServiceBindings the Secret of the same name is deleted as well.
async fn strip_finalizers(
    gateway: &dyn ClusterGateway,
    gvk: &GroupVersionKind,
) -> Result<(), DeprovisionError> {
    let items = gateway
        .list(gvk, None, None)
        .await
        .map_err(DeprovisionError::SoftDeleteList)?;
    let is_binding = gvk.kind == SERVICE_BINDING_KIND;
    let secret_gvk = GroupVersionKind::gvk("", "v1", "Secret");

    for item in &items {
        let key = ObjectKey::for_object(item)?;
        if item.metadata.deletion_timestamp.is_none() {
            ignore_not_found(gateway.delete(&key).await)?;
        }
        ignore_not_found(
            gateway
                .merge_patch(&key, &json!({"metadata": {"finalizers": []}}))
                .await
                .map(|_| ()),
        )?;

        if is_binding {
            let secret = ObjectKey::new(secret_gvk.clone(), key.namespace.as_deref(), &key.name);
            ignore_not_found(gateway.delete(&secret).await)?;
        }
    }
    info!(kind = %gvk.kind, count = items.len(), "Finalizers removed");
    Ok(())
}

async fn ensure_resources_dont_exist(
    gateway: &dyn ClusterGateway,
    gvk: &GroupVersionKind,
) -> Result<(), DeprovisionError> {
    match gateway.list(gvk, None, None).await {
        Ok(items) if !items.is_empty() => Err(DeprovisionError::ResidualResources {
            kind: gvk.kind.clone(),
            count: items.len(),
        }),
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Fallback deprovisioning when hard delete failed or timed out
pub async fn soft_delete(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
) -> Result<(), DeprovisionError> {
    info!("Deprovisioning BTP Operator - soft delete");

    info!("Deleting module deployment and webhooks");
    pre_soft_delete_cleanup(gateway, config).await.inspect_err(|e| {
        error!(error = %e, "Module deployment and webhooks deletion failed");
    })?;

    let binding = service_binding_gvk();
    let instance = service_instance_gvk();
    let binding_crd_exists = crd_exists(gateway, &binding).await?;
    let instance_crd_exists = crd_exists(gateway, &instance).await?;

    if binding_crd_exists {
        info!("Removing finalizers in Service Bindings and deleting connected Secrets");
        strip_finalizers(gateway, &binding).await.inspect_err(|e| {
            error!(error = %e, "While deleting Service Bindings");
        })?;
        ensure_resources_dont_exist(gateway, &binding)
            .await
            .inspect_err(|e| error!(error = %e, "Service Bindings still exist"))?;
    }

    if instance_crd_exists {
        info!("Removing finalizers in Service Instances");
        strip_finalizers(gateway, &instance).await.inspect_err(|e| {
            error!(error = %e, "While deleting Service Instances");
        })?;
        ensure_resources_dont_exist(gateway, &instance)
            .await
            .inspect_err(|e| error!(error = %e, "Service Instances still exist"))?;
    }

    info!("Deleting module resources");
    delete_module_resources(gateway, config).await
}
