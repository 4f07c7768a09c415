//! # BTP Manager Library
//!
//! Reconciliation core of the BTP manager operator.
//!
//! ## Module Structure
//!
//! - `crd` - The `BtpOperator` custom resource
//! - `config` - Operator and server configuration
//! - `gateway` - Untyped cluster access (`ClusterGateway`) with live and in-memory backends
//! - `manifest` - Loading, preparing, applying and awaiting module manifests
//! - `certs` - Webhook CA and leaf certificate lifecycle
//! - `deprovision` - Hard and soft deletion of the module
//! - `controller` - The BtpOperator state machine and error backoff
//! - `runtime` - Startup, watches and error policy
//! - `observability` - Prometheus metrics
//! - `server` - Metrics and probe endpoints

pub mod certs;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod deprovision;
pub mod gateway;
pub mod manifest;
pub mod observability;
pub mod runtime;
pub mod server;
