//! Shared, hot-reloadable operator configuration.

use super::OperatorConfig;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Copy-on-write handle to the current [`OperatorConfig`]
///
/// Readers take a [`snapshot`](Self::snapshot) once per reconciliation and
/// keep it for the whole pass. Writers clone the current value, mutate the
/// clone and swap it in, so a snapshot never observes a half-applied update.
#[derive(Debug, Clone)]
pub struct SharedOperatorConfig {
    inner: Arc<RwLock<Arc<OperatorConfig>>>,
}

impl SharedOperatorConfig {
    #[must_use]
    pub fn new(config: OperatorConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Current configuration
    #[must_use]
    pub fn snapshot(&self) -> Arc<OperatorConfig> {
        Arc::clone(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the configuration with a modified copy
    pub fn update<R>(&self, f: impl FnOnce(&mut OperatorConfig) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = OperatorConfig::clone(&guard);
        let result = f(&mut next);
        *guard = Arc::new(next);
        result
    }

    /// Apply ConfigMap data, returning the number of rejected entries
    pub fn apply_config_map_data(&self, data: &BTreeMap<String, String>) -> usize {
        self.update(|config| config.apply_config_map_data(data).len())
    }
}

impl Default for SharedOperatorConfig {
    fn default() -> Self {
        Self::new(OperatorConfig::default())
    }
}
