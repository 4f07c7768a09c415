//! # Event Predicates
//!
//! Filters applied to watch events before they enqueue a reconciliation.

use crate::config::OperatorConfig;
use crate::constants::{
    CA_SECRET_NAME, MUTATING_WEBHOOK_NAME, VALIDATING_WEBHOOK_NAME, WEBHOOK_SECRET_NAME,
};
use crate::crd::{BtpOperator, State};
use kube::ResourceExt;
use kube_runtime::watcher::Event;
use std::collections::HashSet;

/// Whether an update of `cr` should trigger a reconciliation
///
/// A CR parked in `Error` is only picked up again once it is being deleted,
/// which stops status writes of demoted instances from requeueing them.
#[must_use]
pub fn admits_update(cr: &BtpOperator) -> bool {
    let in_error = cr.status.as_ref().is_some_and(|s| s.state == State::Error);
    !in_error || cr.metadata.deletion_timestamp.is_some()
}

/// Tells updates apart from creations in the BtpOperator watch stream
///
/// The watcher reports both as `Apply`; an object whose uid was already seen
/// is an update and goes through [`admits_update`]. Initial listing and
/// deletion always pass.
#[derive(Debug, Default)]
pub struct OperatorEventFilter {
    seen: HashSet<String>,
}

impl OperatorEventFilter {
    pub fn admit(&mut self, event: Event<BtpOperator>) -> Option<BtpOperator> {
        match event {
            Event::InitApply(cr) => {
                self.seen.insert(cr.uid().unwrap_or_default());
                Some(cr)
            }
            Event::Apply(cr) => {
                let known = !self.seen.insert(cr.uid().unwrap_or_default());
                (!known || admits_update(&cr)).then_some(cr)
            }
            Event::Delete(cr) => {
                self.seen.remove(&cr.uid().unwrap_or_default());
                Some(cr)
            }
            Event::Init | Event::InitDone => None,
        }
    }
}

/// Secrets the module depends on: the credentials and both certificate Secrets
#[must_use]
pub fn secret_matches(config: &OperatorConfig, namespace: Option<&str>, name: &str) -> bool {
    namespace == Some(config.chart_namespace.as_str())
        && (name == config.secret_name || name == CA_SECRET_NAME || name == WEBHOOK_SECRET_NAME)
}

/// The operator ConfigMap
#[must_use]
pub fn config_map_matches(config: &OperatorConfig, namespace: Option<&str>, name: &str) -> bool {
    namespace == Some(config.chart_namespace.as_str()) && name == config.config_name
}

#[must_use]
pub fn mutating_webhook_matches(name: &str) -> bool {
    name == MUTATING_WEBHOOK_NAME
}

#[must_use]
pub fn validating_webhook_matches(name: &str) -> bool {
    name == VALIDATING_WEBHOOK_NAME
}
