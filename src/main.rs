//! # BTP Manager
//!
//! Kubernetes operator that installs, keeps up to date and removes the SAP BTP
//! service operator module.
//!
//! A `BtpOperator` custom resource requests the module. The operator renders
//! the module manifests with the credentials from the `sap-btp-manager`
//! Secret, issues the admission webhook certificates, applies everything and
//! waits until it exists. Deleting the resource removes the module again.
//!
//! ## Usage
//!
//! ```bash
//! crdgen | kubectl apply -f -
//! METRICS_PORT=5000 btp-manager
//! ```

use anyhow::Result;
use btp_manager::runtime::initialization::initialize;
use btp_manager::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init.client, init.reconciler, init.server_state).await
}
