//! # Operator Configuration
//!
//! Tunables read by the reconciler.
//!
//! Every setting has a default, can be overridden by an environment variable at
//! startup (`CHART_NAMESPACE`, `READY_TIMEOUT`, ...) and can be changed at
//! runtime through the operator ConfigMap using the PascalCase key
//! (`ChartNamespace`, `ReadyTimeout`, ...). Durations are unit-suffixed (`90s`, `1m30s`).

use super::{env_var_or_default, env_var_or_default_str, parse_signed_duration, parse_std_duration, ConfigError};
use crate::constants::{APPLY_DIR, DELETE_DIR};
use chrono::TimeDelta;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Reconciler configuration
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorConfig {
    /// Namespace the module is installed into
    pub chart_namespace: String,
    /// Credential Secret name (in `chart_namespace`)
    pub secret_name: String,
    /// Operator ConfigMap name (in `chart_namespace`)
    pub config_name: String,
    /// Service operator Deployment removed during soft deletion
    pub deployment_name: String,
    /// Requeue after every pass in `Processing` or `Error`
    pub processing_state_requeue_interval: Duration,
    /// Requeue after a successful drift-correction pass in `Ready`
    pub ready_state_requeue_interval: Duration,
    /// Upper bound for waiting until applied resources exist
    pub ready_timeout: Duration,
    pub ready_check_interval: Duration,
    /// Upper bound for the hard delete path
    pub hard_delete_timeout: Duration,
    pub hard_delete_check_interval: Duration,
    /// Directory with `Chart.yaml`
    pub chart_path: PathBuf,
    /// Directory with the `apply/` and `delete/` manifest roles
    pub resources_path: PathBuf,
    pub ca_certificate_expiration: Duration,
    pub webhook_certificate_expiration: Duration,
    /// Certificates count as expiring once `now > NotAfter + boundary`
    pub expiration_boundary: TimeDelta,
    /// Error backoff lower bound
    pub backoff_min: Duration,
    /// Error backoff upper bound
    pub backoff_max: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            chart_namespace: DEFAULT_CHART_NAMESPACE.to_string(),
            secret_name: DEFAULT_SECRET_NAME.to_string(),
            config_name: DEFAULT_CONFIG_NAME.to_string(),
            deployment_name: DEFAULT_DEPLOYMENT_NAME.to_string(),
            processing_state_requeue_interval: Duration::from_secs(
                DEFAULT_PROCESSING_STATE_REQUEUE_SECS,
            ),
            ready_state_requeue_interval: Duration::from_secs(DEFAULT_READY_STATE_REQUEUE_SECS),
            ready_timeout: Duration::from_secs(DEFAULT_READY_TIMEOUT_SECS),
            ready_check_interval: Duration::from_secs(DEFAULT_READY_CHECK_INTERVAL_SECS),
            hard_delete_timeout: Duration::from_secs(DEFAULT_HARD_DELETE_TIMEOUT_SECS),
            hard_delete_check_interval: Duration::from_secs(
                DEFAULT_HARD_DELETE_CHECK_INTERVAL_SECS,
            ),
            chart_path: PathBuf::from(DEFAULT_CHART_PATH),
            resources_path: PathBuf::from(DEFAULT_RESOURCES_PATH),
            ca_certificate_expiration: Duration::from_secs(DEFAULT_CA_CERTIFICATE_EXPIRATION_SECS),
            webhook_certificate_expiration: Duration::from_secs(
                DEFAULT_WEBHOOK_CERTIFICATE_EXPIRATION_SECS,
            ),
            expiration_boundary: TimeDelta::seconds(DEFAULT_EXPIRATION_BOUNDARY_SECS),
            backoff_min: Duration::from_secs(DEFAULT_BACKOFF_MIN_SECS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            chart_namespace: env_var_or_default_str("CHART_NAMESPACE", &defaults.chart_namespace),
            secret_name: env_var_or_default_str("SECRET_NAME", &defaults.secret_name),
            config_name: env_var_or_default_str("CONFIG_NAME", &defaults.config_name),
            deployment_name: env_var_or_default_str("DEPLOYMENT_NAME", &defaults.deployment_name),
            processing_state_requeue_interval: env_duration_or_default(
                "PROCESSING_STATE_REQUEUE_INTERVAL",
                defaults.processing_state_requeue_interval,
            ),
            ready_state_requeue_interval: env_duration_or_default(
                "READY_STATE_REQUEUE_INTERVAL",
                defaults.ready_state_requeue_interval,
            ),
            ready_timeout: env_duration_or_default("READY_TIMEOUT", defaults.ready_timeout),
            ready_check_interval: env_duration_or_default(
                "READY_CHECK_INTERVAL",
                defaults.ready_check_interval,
            ),
            hard_delete_timeout: env_duration_or_default(
                "HARD_DELETE_TIMEOUT",
                defaults.hard_delete_timeout,
            ),
            hard_delete_check_interval: env_duration_or_default(
                "HARD_DELETE_CHECK_INTERVAL",
                defaults.hard_delete_check_interval,
            ),
            chart_path: env_var_or_default("CHART_PATH", defaults.chart_path),
            resources_path: env_var_or_default("RESOURCES_PATH", defaults.resources_path),
            ca_certificate_expiration: env_duration_or_default(
                "CA_CERTIFICATE_EXPIRATION",
                defaults.ca_certificate_expiration,
            ),
            webhook_certificate_expiration: env_duration_or_default(
                "WEBHOOK_CERTIFICATE_EXPIRATION",
                defaults.webhook_certificate_expiration,
            ),
            expiration_boundary: std::env::var("EXPIRATION_BOUNDARY")
                .ok()
                .and_then(|v| parse_signed_duration(&v).ok())
                .unwrap_or(defaults.expiration_boundary),
            backoff_min: env_duration_or_default("BACKOFF_MIN", defaults.backoff_min),
            backoff_max: env_duration_or_default("BACKOFF_MAX", defaults.backoff_max),
        }
    }

    /// Manifests applied on every provisioning pass
    #[must_use]
    pub fn apply_dir(&self) -> PathBuf {
        self.resources_path.join(APPLY_DIR)
    }

    /// Manifests of resources removed by newer module versions
    #[must_use]
    pub fn delete_dir(&self) -> PathBuf {
        self.resources_path.join(DELETE_DIR)
    }

    /// Apply the operator ConfigMap data
    ///
    /// Unknown keys are logged and ignored. Values that fail to parse are
    /// logged and the previous value is kept. Returns the rejected entries.
    pub fn apply_config_map_data(&mut self, data: &BTreeMap<String, String>) -> Vec<ConfigError> {
        let mut rejected = Vec::new();
        for (key, value) in data {
            match self.apply_entry(key, value) {
                Ok(()) => info!(key = %key, value = %value, "Applied configuration value"),
                Err(ConfigError::UnknownKey(key)) => {
                    info!(key = %key, "Unknown configuration key, ignoring");
                    rejected.push(ConfigError::UnknownKey(key));
                }
                Err(e) => {
                    warn!(key = %key, value = %value, error = %e, "Invalid configuration value, keeping previous value");
                    rejected.push(ConfigError::InvalidValue {
                        key: key.clone(),
                        source: Box::new(e),
                    });
                }
            }
        }
        rejected
    }

    fn apply_entry(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "ChartNamespace" => self.chart_namespace = value.to_string(),
            "ChartPath" => self.chart_path = PathBuf::from(value),
            "SecretName" => self.secret_name = value.to_string(),
            "ConfigName" => self.config_name = value.to_string(),
            "DeploymentName" => self.deployment_name = value.to_string(),
            "ResourcesPath" => self.resources_path = PathBuf::from(value),
            "ProcessingStateRequeueInterval" => {
                self.processing_state_requeue_interval = parse_std_duration(value)?;
            }
            "ReadyStateRequeueInterval" => {
                self.ready_state_requeue_interval = parse_std_duration(value)?;
            }
            "ReadyTimeout" => self.ready_timeout = parse_std_duration(value)?,
            "ReadyCheckInterval" => self.ready_check_interval = parse_std_duration(value)?,
            "HardDeleteTimeout" => self.hard_delete_timeout = parse_std_duration(value)?,
            "HardDeleteCheckInterval" => {
                self.hard_delete_check_interval = parse_std_duration(value)?;
            }
            "CaCertificateExpiration" => {
                self.ca_certificate_expiration = parse_std_duration(value)?;
            }
            "WebhookCertificateExpiration" => {
                self.webhook_certificate_expiration = parse_std_duration(value)?;
            }
            "ExpirationBoundary" => self.expiration_boundary = parse_signed_duration(value)?,
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }
}

/// Read a duration from the environment or return the default
fn env_duration_or_default(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(value) => parse_std_duration(&value).unwrap_or_else(|e| {
            warn!(key = %key, error = %e, "Invalid duration in environment, using default");
            default
        }),
        Err(_) => default,
    }
}
