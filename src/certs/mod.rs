//! # Certificate Lifecycle
//!
//! Issues, rotates and validates the self-signed CA and the leaf certificate
//! served by the admission webhooks.
//!
//! ## Module Structure
//!
//! - `x509.rs` - Certificate generation, chain verification, expiry checks
//! - `webhook.rs` - CA bundle adapters for webhook configurations
//! - `reconcile.rs` - Regeneration policy run in the middle of the manifest pipeline

mod reconcile;
pub mod webhook;
pub mod x509;

pub use reconcile::{
    reconcile_certificates, reconcile_webhook_bundles, webhook_dns_names, CertificateAction,
    RegenerationReason,
};
pub use webhook::{ca_bundle_target, CaBundleTarget};
pub use x509::CertificateMaterial;

use crate::gateway::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate generation failed: {0}")]
    Generation(String),
    #[error("certificate parsing failed: {0}")]
    Parse(String),
    #[error("empty or missing data for key {key} in Secret {secret}")]
    MissingData { secret: String, key: String },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
