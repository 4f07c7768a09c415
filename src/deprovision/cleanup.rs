//! Removal of every module-owned resource.

use super::DeprovisionError;
use crate::config::OperatorConfig;
use crate::constants::{MANAGED_BY_LABEL_KEY, OPERATOR_NAME};
use crate::gateway::{gvk_id, gvk_of, label_selector, ClusterGateway};
use crate::manifest::load_manifests;
use std::collections::HashSet;
use tracing::{debug, error, info};

/// Delete all module resources of every kind named in either manifest root
///
/// Deletion is a label-filtered bulk delete in the chart namespace, issued
/// once per kind. Kinds that are absent or cannot be bulk-deleted are skipped.
pub async fn delete_module_resources(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
) -> Result<(), DeprovisionError> {
    info!("Getting module resources to delete");
    let from_apply = load_manifests(&config.apply_dir()).map_err(|e| {
        error!(error = %e, "While getting objects to delete from manifests");
        DeprovisionError::Manifests(e)
    })?;
    info!(count = from_apply.len(), r#"Got module resources to delete from "apply" dir"#);
    let from_delete = load_manifests(&config.delete_dir()).map_err(|e| {
        error!(error = %e, "While getting objects to delete from manifests");
        DeprovisionError::Manifests(e)
    })?;
    info!(count = from_delete.len(), r#"Got module resources to delete from "delete" dir"#);

    let selector = label_selector(&[(MANAGED_BY_LABEL_KEY, OPERATOR_NAME)]);
    let mut deleted = HashSet::new();
    for obj in from_apply.iter().chain(&from_delete) {
        let gvk = gvk_of(obj).map_err(DeprovisionError::ModuleResources)?;
        if !deleted.insert(gvk_id(&gvk)) {
            continue;
        }
        info!(
            kind = %gvk_id(&gvk),
            namespace = %config.chart_namespace,
            "Deleting all of module resources of kind"
        );
        match gateway
            .delete_collection(&gvk, &config.chart_namespace, Some(&selector))
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() || e.is_method_not_supported() || e.is_no_match() => {
                debug!(kind = %gvk.kind, error = %e, "Skipping kind");
            }
            Err(e) => {
                error!(error = %e, "While deleting module resources");
                return Err(DeprovisionError::ModuleResources(e));
            }
        }
    }
    Ok(())
}
