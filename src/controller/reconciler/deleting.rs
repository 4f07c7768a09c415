//! Handling of the `Deleting` state.

use super::status::{apply_transition, Reason};
use super::types::ReconcilerError;
use crate::config::OperatorConfig;
use crate::crd::{BtpOperator, State};
use crate::deprovision::{
    delete_module_resources, list_namespaces, run_hard_delete, soft_delete, HardDeleteOutcome,
};
use crate::gateway::{typed, ClusterGateway};
use crate::observability::metrics;
use kube::ResourceExt;
use serde_json::json;
use tracing::{error, info};

/// Deprovision the module, release the CR and hand over to the next instance
pub(super) async fn handle_deleting(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
    cr: &mut BtpOperator,
) -> Result<(), ReconcilerError> {
    info!("Handling Deleting state");

    if cr.finalizers().is_empty() {
        info!("BtpOperator CR without finalizers - nothing to do, waiting for deletion");
        return Ok(());
    }

    handle_deprovisioning(gateway, config, cr)
        .await
        .inspect_err(|e| error!(error = %e, "Deprovisioning failed"))?;

    info!("Deprovisioning success. Removing finalizers in CR");
    let key = typed::key_for::<BtpOperator>(cr.metadata.namespace.as_deref(), &cr.name_any());
    gateway
        .merge_patch(&key, &json!({ "metadata": { "finalizers": [] } }))
        .await?;

    let existing = typed::list_typed::<BtpOperator>(gateway, None, None)
        .await
        .map_err(|e| {
            error!(error = %e, "Unable to fetch existing BtpOperators");
            ReconcilerError::ListOperators(e)
        })?;
    for mut remaining in existing
        .into_iter()
        .filter(|item| item.metadata.uid != cr.metadata.uid)
    {
        if let Err(e) = apply_transition(
            gateway,
            &mut remaining,
            State::Processing,
            Reason::Processing,
            "After deprovisioning",
        )
        .await
        {
            error!(resource.name = %remaining.name_any(), error = %e, r#"Unable to set "Processing" state"#);
        }
    }
    Ok(())
}

async fn handle_deprovisioning(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
    cr: &mut BtpOperator,
) -> Result<(), ReconcilerError> {
    let namespaces = list_namespaces(gateway).await?;

    match run_hard_delete(gateway, config, &namespaces).await {
        HardDeleteOutcome::Succeeded => {
            info!("Service Instances and Service Bindings hard delete succeeded. Removing module resources");
            metrics::increment_deprovisioning("hard");
            if let Err(e) = delete_module_resources(gateway, config).await {
                error!(error = %e, "Failed to remove module resources");
                apply_transition(
                    gateway,
                    cr,
                    State::Error,
                    Reason::ResourceRemovalFailed,
                    "Unable to remove installed resources",
                )
                .await
                .inspect_err(|e| error!(error = %e, "Failed to update status"))?;
                return Err(e.into());
            }
            Ok(())
        }
        HardDeleteOutcome::Failed(e) => {
            info!(error = %e, "Service Instances and Service Bindings hard delete failed");
            run_soft_delete(gateway, config, cr).await
        }
        HardDeleteOutcome::TimedOut => run_soft_delete(gateway, config, cr).await,
    }
}

async fn run_soft_delete(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
    cr: &mut BtpOperator,
) -> Result<(), ReconcilerError> {
    apply_transition(gateway, cr, State::Deleting, Reason::SoftDeleting, "Being soft deleted")
        .await
        .inspect_err(|e| error!(error = %e, "Failed to update status"))?;
    metrics::increment_deprovisioning("soft");
    soft_delete(gateway, config)
        .await
        .inspect_err(|e| error!(error = %e, "Failed to soft delete"))?;
    Ok(())
}
