//! # Install Pipeline
//!
//! Steps run for every Processing and Ready pass, in order:
//!
//! 1. Delete resources listed under the `delete` manifest root
//! 2. Load resources listed under the `apply` manifest root
//! 3. Prepare them (labels, namespace, credentials, certificates)
//! 4. Server-side apply
//! 5. Wait for readiness
//!
//! Any step failing aborts the pipeline with an error carrying the step context.

use super::{
    apply_resources, chart_version, delete_resources, load_manifests, prepare_module_resources,
    wait_for_resources_readiness, ManifestError, ModuleInputs, ReadinessError, ResourceError,
};
use crate::certs::{reconcile_certificates, CertificateError};
use crate::config::OperatorConfig;
use crate::gateway::ClusterGateway;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("failed to get module chart version: {0}")]
    ChartVersion(#[source] ManifestError),
    #[error(transparent)]
    Inject(ManifestError),
    #[error("failed to reconcile webhook certs: {0}")]
    Certificates(#[source] CertificateError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to create deletable objects from manifests: {0}")]
    LoadDeletable(#[source] ManifestError),
    #[error("Failed to delete outdated resources: {0}")]
    DeleteOutdated(#[source] ResourceError),
    #[error("Failed to create applicable objects from manifests: {0}")]
    LoadApplicable(#[source] ManifestError),
    #[error("Failed to prepare objects to apply: {0}")]
    Prepare(#[source] PrepareError),
    #[error("Failed to apply module resources: {0}")]
    Apply(#[source] ResourceError),
    #[error("Timed out while waiting for resources readiness: {0}")]
    Readiness(#[source] ReadinessError),
}

/// Delete the resources that earlier module versions installed and this one dropped
pub async fn delete_outdated_resources(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
) -> Result<(), PipelineError> {
    info!("Getting outdated module resources to delete");
    let mut outdated = load_manifests(&config.delete_dir()).map_err(|e| {
        error!(error = %e, "While getting objects to delete from manifests");
        PipelineError::LoadDeletable(e)
    })?;
    for obj in &mut outdated {
        obj.metadata
            .namespace
            .get_or_insert_with(|| config.chart_namespace.clone());
    }
    info!(count = outdated.len(), "Got outdated module resources to delete");

    delete_resources(gateway, &outdated).await.map_err(|e| {
        error!(error = %e, "While deleting outdated resources");
        PipelineError::DeleteOutdated(e)
    })
}

/// Install or refresh the module with the given decoded credentials
pub async fn reconcile_resources(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
    credentials: &BTreeMap<String, Vec<u8>>,
) -> Result<(), PipelineError> {
    info!("Getting module resources to apply");
    let mut resources = load_manifests(&config.apply_dir()).map_err(|e| {
        error!(error = %e, "While creating applicable objects from manifests");
        PipelineError::LoadApplicable(e)
    })?;
    info!(count = resources.len(), "Got module resources to apply");

    info!("Preparing module resources to apply");
    let version = chart_version(&config.chart_path)
        .map_err(|e| PipelineError::Prepare(PrepareError::ChartVersion(e)))?;
    let inputs = ModuleInputs {
        namespace: &config.chart_namespace,
        chart_version: &version,
        credentials,
    };
    prepare_module_resources(&mut resources, &inputs)
        .map_err(|e| PipelineError::Prepare(PrepareError::Inject(e)))?;
    let action = reconcile_certificates(gateway, config, &mut resources)
        .await
        .map_err(|e| {
            error!(error = %e, "While reconciling webhook certificates");
            PipelineError::Prepare(PrepareError::Certificates(e))
        })?;
    info!(?action, "Webhook certificates reconciled");

    apply_resources(gateway, &resources).await.map_err(|e| {
        error!(error = %e, "While applying module resources");
        PipelineError::Apply(e)
    })?;

    wait_for_resources_readiness(
        gateway,
        &resources,
        config.ready_timeout,
        config.ready_check_interval,
    )
    .await
    .map_err(|e| {
        error!(error = %e, "While waiting for module resources readiness");
        PipelineError::Readiness(e)
    })?;

    info!("Module resources reconciled");
    Ok(())
}
