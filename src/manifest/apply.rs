//! Server-side apply and deletion of module resources.

use crate::gateway::{ClusterGateway, GatewayError, ObjectKey};
use kube::core::DynamicObject;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("while applying {name} {kind}: {source}")]
    Apply {
        name: String,
        kind: String,
        #[source]
        source: GatewayError,
    },
    #[error("{}", .failures.join(", "))]
    Delete { failures: Vec<String> },
}

fn describe(obj: &DynamicObject) -> (String, String) {
    (
        obj.metadata.name.clone().unwrap_or_default(),
        obj.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default(),
    )
}

/// Apply every object in order, stopping at the first failure
pub async fn apply_resources(
    gateway: &dyn ClusterGateway,
    resources: &[DynamicObject],
) -> Result<(), ResourceError> {
    info!(count = resources.len(), "Applying module resources");
    for obj in resources {
        if let Err(source) = gateway.apply(obj).await {
            let (name, kind) = describe(obj);
            return Err(ResourceError::Apply { name, kind, source });
        }
    }
    Ok(())
}

/// Delete every object, ignoring those already gone
///
/// All objects are attempted; failures are collected into one error.
pub async fn delete_resources(
    gateway: &dyn ClusterGateway,
    resources: &[DynamicObject],
) -> Result<(), ResourceError> {
    let mut failures = Vec::new();
    for obj in resources {
        let (name, kind) = describe(obj);
        let result = match ObjectKey::for_object(obj) {
            Ok(key) => gateway.delete(&key).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => debug!(%name, %kind, "Deleted resource"),
            Err(e) if e.is_not_found() => debug!(%name, %kind, "Resource already absent"),
            Err(e) => failures.push(format!("failed to delete {name} {kind}: {e}")),
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ResourceError::Delete { failures })
    }
}
