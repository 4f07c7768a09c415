//! # Types
//!
//! Core types for the reconciler.

use crate::config::SharedOperatorConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::deprovision::DeprovisionError;
use crate::gateway::{ClusterGateway, GatewayError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("while getting existing BtpOperators: {0}")]
    ListOperators(#[source] GatewayError),
    #[error(transparent)]
    Deprovision(#[from] DeprovisionError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Backoff state for a specific resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(backoff: FibonacciBackoff) -> Self {
        Self {
            backoff,
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared reconciliation context
#[derive(Debug, Clone)]
pub struct Reconciler {
    pub gateway: Arc<dyn ClusterGateway>,
    pub config: SharedOperatorConfig,
    // Keyed by namespace/name
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    #[must_use]
    pub fn new(gateway: Arc<dyn ClusterGateway>, config: SharedOperatorConfig) -> Self {
        Self {
            gateway,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Forget the error history of a resource after it reconciled cleanly
    pub fn reset_backoff(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.reset();
            }
        }
    }

    /// Drop the error history of a resource that is gone from the cluster
    pub fn forget_backoff(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}
