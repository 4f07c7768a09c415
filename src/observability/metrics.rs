//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `btp_manager_reconciliations_total` - Total number of reconciliations
//! - `btp_manager_reconciliation_errors_total` - Reconciliations that returned an error
//! - `btp_manager_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `btp_manager_state_transitions_total` - Status transitions by state and reason
//! - `btp_manager_certificate_regenerations_total` - Certificate regenerations by scope
//! - `btp_manager_deprovisioning_total` - Deprovisioning runs by path (hard/soft)
//! - `btp_manager_readiness_timeouts_total` - Readiness waits that hit the deadline
//! - `btp_manager_config_reloads_total` - ConfigMap-driven configuration reloads

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "btp_manager_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "btp_manager_reconciliation_errors_total",
        "Total number of reconciliations that returned an error",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "btp_manager_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static STATE_TRANSITIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "btp_manager_state_transitions_total",
            "Total number of BtpOperator status transitions",
        ),
        &["state", "reason"],
    )
    .expect("Failed to create STATE_TRANSITIONS_TOTAL metric - this should never happen")
});

static CERTIFICATE_REGENERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "btp_manager_certificate_regenerations_total",
            "Total number of webhook certificate regenerations",
        ),
        &["scope"],
    )
    .expect("Failed to create CERTIFICATE_REGENERATIONS_TOTAL metric - this should never happen")
});

static DEPROVISIONING_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "btp_manager_deprovisioning_total",
            "Total number of deprovisioning runs by deletion path",
        ),
        &["path"],
    )
    .expect("Failed to create DEPROVISIONING_TOTAL metric - this should never happen")
});

static READINESS_TIMEOUTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "btp_manager_readiness_timeouts_total",
        "Total number of resource readiness waits that timed out",
    )
    .expect("Failed to create READINESS_TIMEOUTS_TOTAL metric - this should never happen")
});

static CONFIG_RELOADS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "btp_manager_config_reloads_total",
        "Total number of configuration reloads from the operator ConfigMap",
    )
    .expect("Failed to create CONFIG_RELOADS_TOTAL metric - this should never happen")
});

/// Register all metrics with the process registry
///
/// # Errors
///
/// Fails when called twice, as the registry rejects duplicate collectors.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(STATE_TRANSITIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CERTIFICATE_REGENERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DEPROVISIONING_TOTAL.clone()))?;
    REGISTRY.register(Box::new(READINESS_TIMEOUTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONFIG_RELOADS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn record_state_transition(state: &str, reason: &str) {
    STATE_TRANSITIONS_TOTAL
        .with_label_values(&[state, reason])
        .inc();
}

/// `scope` is `full` or `partial`
pub fn increment_certificate_regenerations(scope: &str) {
    CERTIFICATE_REGENERATIONS_TOTAL
        .with_label_values(&[scope])
        .inc();
}

/// `path` is `hard` or `soft`
pub fn increment_deprovisioning(path: &str) {
    DEPROVISIONING_TOTAL.with_label_values(&[path]).inc();
}

pub fn increment_readiness_timeouts() {
    READINESS_TIMEOUTS_TOTAL.inc();
}

pub fn increment_config_reloads() {
    CONFIG_RELOADS_TOTAL.inc();
}
