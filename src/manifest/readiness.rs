//! # Readiness Wait
//!
//! After apply, every object must become retrievable before the pipeline
//! succeeds. One check per object polls the gateway; all checks run
//! concurrently inside a single task and share one deadline. When the
//! deadline passes the checks are dropped, so no polling outlives the call.

use crate::gateway::{ClusterGateway, ObjectKey};
use crate::observability::metrics;
use futures::stream::{FuturesUnordered, StreamExt};
use kube::core::DynamicObject;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("resources readiness timeout reached")]
    Timeout { ready: usize, total: usize },
    #[error(transparent)]
    InvalidObject(#[from] crate::gateway::GatewayError),
}

async fn wait_until_exists(gateway: &dyn ClusterGateway, key: &ObjectKey, interval: Duration) {
    let per_call = interval / 2;
    loop {
        match timeout(per_call, gateway.get(key)).await {
            Ok(Ok(_)) => {
                debug!(resource = %key, "Resource is ready");
                return;
            }
            Ok(Err(e)) => debug!(resource = %key, error = %e, "Resource not ready yet"),
            Err(_) => debug!(resource = %key, "Readiness check timed out"),
        }
        sleep(interval).await;
    }
}

/// Wait until every object in `resources` can be fetched, or `ready_timeout` passes
pub async fn wait_for_resources_readiness(
    gateway: &dyn ClusterGateway,
    resources: &[DynamicObject],
    ready_timeout: Duration,
    check_interval: Duration,
) -> Result<(), ReadinessError> {
    let keys = resources
        .iter()
        .map(ObjectKey::for_object)
        .collect::<Result<Vec<_>, _>>()?;
    let total = keys.len();
    let deadline = Instant::now() + ready_timeout;
    info!(total, timeout = ?ready_timeout, "Waiting for module resources readiness");

    let mut ready = 0usize;
    let outcome = timeout_at(deadline, async {
        let mut checks: FuturesUnordered<_> = keys
            .iter()
            .map(|key| wait_until_exists(gateway, key, check_interval))
            .collect();
        while checks.next().await.is_some() {
            ready += 1;
        }
    })
    .await;

    if outcome.is_err() {
        warn!(ready, total, "Resources readiness timeout reached");
        metrics::increment_readiness_timeouts();
        return Err(ReadinessError::Timeout { ready, total });
    }
    info!(total, "All module resources are ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use serde_json::json;

    fn config_map(name: &str) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": name, "namespace": "kyma-system"}
        }))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_present_is_ready() {
        let gateway = InMemoryGateway::new();
        let objects = vec![config_map("a"), config_map("b")];
        for obj in &objects {
            gateway.insert(obj).unwrap();
        }

        wait_for_resources_readiness(&gateway, &objects, Duration::from_secs(60), Duration::from_secs(2))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_missing_object_times_out() {
        let gateway = InMemoryGateway::new();
        gateway.insert(&config_map("a")).unwrap();

        let err = wait_for_resources_readiness(
            &gateway,
            &[config_map("a"), config_map("missing")],
            Duration::from_secs(60),
            Duration::from_secs(2),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ReadinessError::Timeout { ready: 1, total: 2 }));
        assert_eq!(err.to_string(), "resources readiness timeout reached");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_list_is_ready() {
        let gateway = InMemoryGateway::new();
        wait_for_resources_readiness(&gateway, &[], Duration::from_secs(1), Duration::from_secs(2))
            .await
            .unwrap();
    }
}
