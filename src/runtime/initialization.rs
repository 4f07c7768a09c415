//! # Initialization
//!
//! Operator startup: rustls setup, tracing, metrics, HTTP server and
//! Kubernetes client.

use crate::config::{OperatorConfig, ServerConfig, SharedOperatorConfig};
use crate::controller::reconciler::Reconciler;
use crate::crd::BtpOperator;
use crate::gateway::{ClusterGateway, KubeGateway};
use crate::observability::metrics;
use crate::server::{start_server, ServerState};
use anyhow::{anyhow, Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Components needed by the watch loop
pub struct InitializationResult {
    pub client: Client,
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the operator runtime
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_provider| anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "btp_manager=info".into()),
        )
        .init();

    info!("Starting BTP Manager");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    metrics::register_metrics()?;

    let operator_config = OperatorConfig::from_env();
    info!(
        chart_namespace = %operator_config.chart_namespace,
        secret_name = %operator_config.secret_name,
        config_name = %operator_config.config_name,
        "Operator configuration loaded"
    );
    let server_config = ServerConfig::from_env();

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    check_crd_queryable(&client).await;

    let gateway: Arc<dyn ClusterGateway> = Arc::new(KubeGateway::new(client.clone()));
    let reconciler = Arc::new(Reconciler::new(
        gateway,
        SharedOperatorConfig::new(operator_config),
    ));

    info!("Operator initialized, starting watch loop...");
    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
    })
}

/// Wait for the HTTP server to bind
async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }
        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Log whether the BtpOperator CRD can be listed
///
/// A missing CRD is not fatal; the controller keeps retrying its watch.
async fn check_crd_queryable(client: &Client) {
    let operators: Api<BtpOperator> = Api::all(client.clone());
    match operators.list(&ListParams::default().limit(1)).await {
        Ok(list) => info!(
            existing = list.items.len(),
            "BtpOperator CRD is queryable"
        ),
        Err(e) => {
            error!(error = %e, "BtpOperator CRD is not queryable. Is the CRD installed?");
            warn!("Installation: crdgen | kubectl apply -f -");
        }
    }
}
