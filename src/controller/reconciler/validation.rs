//! Verification of the credential Secret.

use super::Reason;
use crate::config::OperatorConfig;
use crate::constants::REQUIRED_SECRET_KEYS;
use crate::gateway::{typed, ClusterGateway};
use k8s_openapi::api::core::v1::Secret;
use std::collections::BTreeMap;
use tracing::{error, info};

/// Why the credential Secret cannot be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretProblem {
    pub reason: Reason,
    pub message: &'static str,
}

/// Check that every required key is present with a non-empty value
///
/// The error lists missing keys first, then keys with empty values:
/// `key(s) a, b not found, missing value(s) for c key(s)`.
pub fn verify_secret(secret: &Secret) -> Result<(), String> {
    let data = secret.data.as_ref();
    let mut missing_keys = Vec::new();
    let mut missing_values = Vec::new();
    for key in REQUIRED_SECRET_KEYS {
        match data.and_then(|d| d.get(key)) {
            None => missing_keys.push(key),
            Some(value) if value.0.is_empty() => missing_values.push(key),
            Some(_) => {}
        }
    }

    let mut errors = Vec::new();
    if !missing_keys.is_empty() {
        errors.push(format!("key(s) {} not found", missing_keys.join(", ")));
    }
    if !missing_values.is_empty() {
        errors.push(format!("missing value(s) for {} key(s)", missing_values.join(", ")));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join(", "))
    }
}

/// Fetch and verify the credential Secret, returning its decoded data
pub async fn get_and_verify_required_secret(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
) -> Result<BTreeMap<String, Vec<u8>>, SecretProblem> {
    info!("Getting the required Secret");
    let secret = typed::get_typed::<Secret>(gateway, Some(&config.chart_namespace), &config.secret_name)
        .await
        .map_err(|e| {
            error!(
                secret = %config.secret_name,
                namespace = %config.chart_namespace,
                error = %e,
                "While getting the required Secret"
            );
            SecretProblem {
                reason: Reason::MissingSecret,
                message: "Secret resource not found",
            }
        })?;

    info!("Verifying the required Secret");
    verify_secret(&secret).map_err(|e| {
        error!(error = %e, "While verifying the required Secret");
        SecretProblem {
            reason: Reason::InvalidSecret,
            message: "Secret validation failed",
        }
    })?;

    Ok(secret
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, value.0))
        .collect())
}
