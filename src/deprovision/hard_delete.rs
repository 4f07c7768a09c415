//! Hard delete of the service operator's domain resources.

use super::{crd_exists, service_binding_gvk, service_instance_gvk, DeprovisionError};
use crate::config::OperatorConfig;
use crate::gateway::{ClusterGateway, GatewayError};
use kube::core::GroupVersionKind;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

/// How the hard delete ended
#[derive(Debug)]
pub enum HardDeleteOutcome {
    /// No domain resources are left
    Succeeded,
    Failed(DeprovisionError),
    /// The hard-delete timeout passed first
    TimedOut,
}

async fn delete_in_namespaces(
    gateway: &dyn ClusterGateway,
    gvk: &GroupVersionKind,
    namespaces: &[String],
    deadline: Duration,
) -> Result<(), GatewayError> {
    let bulk_delete = async {
        for namespace in namespaces {
            gateway.delete_collection(gvk, namespace, None).await?;
        }
        Ok::<(), GatewayError>(())
    };
    match timeout(deadline, bulk_delete).await {
        Ok(Err(e)) if e.is_timeout() => {
            warn!(kind = %gvk.kind, error = %e, "Bulk deletion timed out");
            Ok(())
        }
        Ok(result) => result,
        Err(_) => {
            warn!(kind = %gvk.kind, "Bulk deletion deadline exceeded");
            Ok(())
        }
    }
}

async fn resources_exist(
    gateway: &dyn ClusterGateway,
    gvk: &GroupVersionKind,
    namespaces: &[String],
) -> Result<bool, GatewayError> {
    for namespace in namespaces {
        match gateway.list(gvk, Some(namespace), None).await {
            Ok(items) if !items.is_empty() => return Ok(true),
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(false)
}

/// Bulk-delete ServiceBindings and ServiceInstances, then wait until none are left
///
/// Runs until the resources are gone or a check fails; callers bound it with
/// [`run_hard_delete`].
pub async fn hard_delete(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
    namespaces: &[String],
) -> Result<(), DeprovisionError> {
    info!("Deprovisioning BTP Operator - hard delete");
    let mut failures = Vec::new();
    let mut present = Vec::new();

    for gvk in [service_binding_gvk(), service_instance_gvk()] {
        match crd_exists(gateway, &gvk).await {
            Ok(true) => {
                if let Err(e) =
                    delete_in_namespaces(gateway, &gvk, namespaces, config.hard_delete_timeout / 2)
                        .await
                {
                    error!(kind = %gvk.kind, error = %e, "While deleting resources");
                    failures.push(format!("{}: {e}", gvk.kind));
                }
                present.push(gvk);
            }
            Ok(false) => info!(kind = %gvk.kind, "CRD not installed, nothing to delete"),
            Err(e) => {
                error!(kind = %gvk.kind, error = %e, "While checking CRD existence");
                failures.push(format!("{}: {e}", gvk.kind));
            }
        }
    }
    if !failures.is_empty() {
        return Err(DeprovisionError::HardDelete(failures));
    }

    loop {
        let mut left = false;
        for gvk in &present {
            if resources_exist(gateway, gvk, namespaces).await.map_err(|e| {
                error!(kind = %gvk.kind, error = %e, "Leftover resources check failed");
                DeprovisionError::Gateway(e)
            })? {
                left = true;
                break;
            }
        }
        if !left {
            return Ok(());
        }
        sleep(config.hard_delete_check_interval).await;
    }
}

/// Run [`hard_delete`] bounded by the configured hard-delete timeout
///
/// On timeout the hard delete is dropped at its current await point, so it
/// cannot keep polling or report after this returns.
pub async fn run_hard_delete(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
    namespaces: &[String],
) -> HardDeleteOutcome {
    match timeout(config.hard_delete_timeout, hard_delete(gateway, config, namespaces)).await {
        Ok(Ok(())) => HardDeleteOutcome::Succeeded,
        Ok(Err(e)) => HardDeleteOutcome::Failed(e),
        Err(_) => {
            info!(duration = ?config.hard_delete_timeout, "Hard delete timeout reached");
            HardDeleteOutcome::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deprovision::crd_name;
    use crate::gateway::{Fault, InMemoryGateway, Operation};
    use kube::core::DynamicObject;
    use serde_json::json;

    fn crd(gvk: &GroupVersionKind) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {"name": crd_name(gvk)}
        }))
        .unwrap()
    }

    fn instance(name: &str, namespace: &str, finalizers: &[&str]) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "services.cloud.sap.com/v1",
            "kind": "ServiceInstance",
            "metadata": {"name": name, "namespace": namespace, "finalizers": finalizers}
        }))
        .unwrap()
    }

    fn config() -> OperatorConfig {
        OperatorConfig {
            hard_delete_timeout: Duration::from_secs(60),
            hard_delete_check_interval: Duration::from_secs(5),
            ..OperatorConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_when_crds_present_and_empty() {
        let gateway = InMemoryGateway::new();
        gateway.insert(&crd(&service_binding_gvk())).unwrap();
        gateway.insert(&crd(&service_instance_gvk())).unwrap();

        let outcome = run_hard_delete(&gateway, &config(), &["default".to_string()]).await;
        assert!(matches!(outcome, HardDeleteOutcome::Succeeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removes_instances_without_finalizers() {
        let gateway = InMemoryGateway::new();
        gateway.insert(&crd(&service_instance_gvk())).unwrap();
        gateway.insert(&instance("a", "default", &[])).unwrap();
        gateway.insert(&instance("b", "team", &[])).unwrap();

        let namespaces = ["default".to_string(), "team".to_string()];
        let outcome = run_hard_delete(&gateway, &config(), &namespaces).await;

        assert!(matches!(outcome, HardDeleteOutcome::Succeeded));
        assert_eq!(gateway.count(&service_instance_gvk()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_while_finalizers_block_removal() {
        let gateway = InMemoryGateway::new();
        gateway.insert(&crd(&service_instance_gvk())).unwrap();
        gateway.insert(&instance("a", "default", &["services.cloud.sap.com/finalizer"])).unwrap();

        let outcome = run_hard_delete(&gateway, &config(), &["default".to_string()]).await;
        assert!(matches!(outcome, HardDeleteOutcome::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_delete_failure_aborts() {
        let gateway = InMemoryGateway::new();
        gateway.insert(&crd(&service_binding_gvk())).unwrap();
        gateway.inject_fault(
            Operation::DeleteCollection,
            "ServiceBinding",
            Fault::Failure("forbidden".to_string()),
        );

        let outcome = run_hard_delete(&gateway, &config(), &["default".to_string()]).await;
        assert!(matches!(outcome, HardDeleteOutcome::Failed(DeprovisionError::HardDelete(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_delete_timeout_is_not_a_failure() {
        let gateway = InMemoryGateway::new();
        gateway.insert(&crd(&service_binding_gvk())).unwrap();
        gateway.inject_fault(Operation::DeleteCollection, "ServiceBinding", Fault::Timeout);

        let outcome = run_hard_delete(&gateway, &config(), &["default".to_string()]).await;
        assert!(matches!(outcome, HardDeleteOutcome::Succeeded));
    }
}
