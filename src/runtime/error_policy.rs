//! # Error Policy
//!
//! Requeue policy for reconciliations that returned an error.

use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::{BackoffState, Reconciler, ReconcilerError};
use crate::crd::BtpOperator;
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Requeue a failed BtpOperator with per-resource Fibonacci backoff
///
/// The backoff state is reset by the next successful reconciliation.
pub fn handle_reconciliation_error(
    obj: Arc<BtpOperator>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconciliation_error",
        resource.name = %name,
        resource.namespace = %namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}: {:?}", name, error);
    metrics::increment_reconciliation_errors();

    let config = ctx.config.snapshot();
    let resource_key = format!("{namespace}/{name}");
    let (backoff, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(resource_key).or_insert_with(|| {
                BackoffState::new(FibonacciBackoff::from_bounds(
                    config.backoff_min,
                    config.backoff_max,
                ))
            });
            state.increment_error();
            (state.backoff.next_backoff(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using minimum backoff", e);
            (config.backoff_min.max(Duration::from_secs(1)), 0)
        }
    };

    info!(
        backoff_secs = backoff.as_secs(),
        error_count, "Retrying with Fibonacci backoff"
    );
    Action::requeue(backoff)
}
