//! # Watch Loop
//!
//! Runs the BtpOperator controller.
//!
//! The primary stream is a reflector over BtpOperators passed through
//! [`OperatorEventFilter`]. Secrets, the operator ConfigMap and both webhook
//! configurations are watched as well; a matching event enqueues the oldest
//! BtpOperator, the only one that installs the module.

use super::error_policy::handle_reconciliation_error;
use super::predicates::{
    config_map_matches, mutating_webhook_matches, secret_matches, validating_webhook_matches,
    OperatorEventFilter,
};
use crate::config::SharedOperatorConfig;
use crate::controller::reconciler::{oldest_operator, reconcile, Reconciler};
use crate::crd::BtpOperator;
use crate::observability::metrics;
use crate::server::ServerState;
use futures::{future, StreamExt};
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::Api;
use kube::{Client, ResourceExt};
use kube_runtime::reflector::{self, ObjectRef, Store};
use kube_runtime::{watcher, Controller, WatchStreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reference to the oldest BtpOperator in the store, if any
fn enqueue_oldest(store: &Store<BtpOperator>) -> Option<ObjectRef<BtpOperator>> {
    let operators = store.state();
    oldest_operator(operators.iter().map(AsRef::as_ref)).map(ObjectRef::from_obj)
}

/// Run the controller until a shutdown signal arrives
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    info!("Starting controller watch loop...");

    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, initiating graceful shutdown...");
            shutdown_server_state.set_ready(false);
        }
    });

    let operators: Api<BtpOperator> = Api::all(client.clone());
    let (reader, writer) = reflector::store::<BtpOperator>();
    let mut event_filter = OperatorEventFilter::default();
    let operator_stream = watcher(operators, watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .filter_map(move |event| {
            future::ready(match event {
                Ok(event) => event_filter.admit(event).map(Ok),
                Err(e) => Some(Err(e)),
            })
        });

    let config = reconciler.config.clone();

    Controller::for_stream(operator_stream, reader.clone())
        .watches(
            Api::<Secret>::all(client.clone()),
            watcher::Config::default(),
            secret_mapper(config.clone(), reader.clone()),
        )
        .watches(
            Api::<ConfigMap>::all(client.clone()),
            watcher::Config::default(),
            config_map_mapper(config, reader.clone()),
        )
        .watches(
            Api::<MutatingWebhookConfiguration>::all(client.clone()),
            watcher::Config::default(),
            {
                let reader = reader.clone();
                move |webhook: MutatingWebhookConfiguration| {
                    mutating_webhook_matches(&webhook.name_any())
                        .then(|| enqueue_oldest(&reader))
                        .flatten()
                }
            },
        )
        .watches(
            Api::<ValidatingWebhookConfiguration>::all(client),
            watcher::Config::default(),
            move |webhook: ValidatingWebhookConfiguration| {
                validating_webhook_matches(&webhook.name_any())
                    .then(|| enqueue_oldest(&reader))
                    .flatten()
            },
        )
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, reconciler)
        .for_each(|result| {
            match result {
                Ok((obj, action)) => debug!(resource = %obj, ?action, "watch.event.reconciled"),
                Err(e) => warn!(error = %e, "watch.event.reconciliation_failed"),
            }
            future::ready(())
        })
        .await;

    server_state.set_ready(false);
    info!("Controller stopped gracefully");
    Ok(())
}

fn secret_mapper(
    config: SharedOperatorConfig,
    reader: Store<BtpOperator>,
) -> impl Fn(Secret) -> Option<ObjectRef<BtpOperator>> + Send + Sync + Clone + 'static {
    move |secret: Secret| {
        let matches = secret_matches(
            &config.snapshot(),
            secret.metadata.namespace.as_deref(),
            &secret.name_any(),
        );
        matches.then(|| enqueue_oldest(&reader)).flatten()
    }
}

fn config_map_mapper(
    config: SharedOperatorConfig,
    reader: Store<BtpOperator>,
) -> impl Fn(ConfigMap) -> Option<ObjectRef<BtpOperator>> + Send + Sync + Clone + 'static {
    move |config_map: ConfigMap| {
        if !config_map_matches(
            &config.snapshot(),
            config_map.metadata.namespace.as_deref(),
            &config_map.name_any(),
        ) {
            return None;
        }
        let data = config_map.data.unwrap_or_default();
        info!(keys = data.len(), "Reconciling config update");
        let rejected = config.apply_config_map_data(&data);
        if rejected > 0 {
            warn!(rejected, "Some configuration entries were not applied");
        }
        metrics::increment_config_reloads();
        enqueue_oldest(&reader)
    }
}
