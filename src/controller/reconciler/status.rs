//! # Status
//!
//! Every status change goes through [`apply_transition`], which sets the
//! state, upserts the `Ready` condition and writes the status once.

use crate::crd::{BtpOperator, Condition, State, READY_CONDITION_TYPE};
use crate::gateway::{typed, ClusterGateway, GatewayError};
use crate::observability::metrics;
use chrono::{SecondsFormat, Utc};
use std::fmt;
use tracing::info;

/// Machine-readable reason of the `Ready` condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    Initialized,
    MissingSecret,
    InvalidSecret,
    ProvisioningFailed,
    ReconcileFailed,
    ReconcileSucceeded,
    OlderCRExists,
    Updated,
    ResourceRemovalFailed,
    HardDeleting,
    SoftDeleting,
    Processing,
}

impl Reason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Initialized => "Initialized",
            Reason::MissingSecret => "MissingSecret",
            Reason::InvalidSecret => "InvalidSecret",
            Reason::ProvisioningFailed => "ProvisioningFailed",
            Reason::ReconcileFailed => "ReconcileFailed",
            Reason::ReconcileSucceeded => "ReconcileSucceeded",
            Reason::OlderCRExists => "OlderCRExists",
            Reason::Updated => "Updated",
            Reason::ResourceRemovalFailed => "ResourceRemovalFailed",
            Reason::HardDeleting => "HardDeleting",
            Reason::SoftDeleting => "SoftDeleting",
            Reason::Processing => "Processing",
        }
    }

    /// Status of the `Ready` condition for this reason
    #[must_use]
    pub fn condition_status(&self) -> &'static str {
        match self {
            Reason::ReconcileSucceeded => "True",
            _ => "False",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upsert a condition by type
///
/// An existing condition with the same status and reason is left untouched,
/// message and `lastTransitionTime` included. Otherwise it is replaced whole.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        Some(existing) => {
            if existing.status != condition.status || existing.reason != condition.reason {
                *existing = condition;
            }
        }
        None => conditions.push(condition),
    }
}

/// Move `cr` to `state` with the given reason and write its status
///
/// The write is conditional on the resourceVersion `cr` was read at.
pub async fn apply_transition(
    gateway: &dyn ClusterGateway,
    cr: &mut BtpOperator,
    state: State,
    reason: Reason,
    message: impl Into<String>,
) -> Result<(), GatewayError> {
    let message = message.into();
    let status = cr.status.get_or_insert_with(Default::default);
    let previous = status.state;
    status.state = state;
    set_condition(
        &mut status.conditions,
        Condition {
            r#type: READY_CONDITION_TYPE.to_string(),
            status: reason.condition_status().to_string(),
            last_transition_time: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            reason: Some(reason.to_string()),
            message: Some(message.clone()),
        },
    );
    let body = serde_json::to_value(&*status)?;

    let name = cr.metadata.name.clone().unwrap_or_default();
    let key = typed::key_for::<BtpOperator>(cr.metadata.namespace.as_deref(), &name);
    let updated = gateway
        .patch_status(&key, &body, cr.metadata.resource_version.as_deref())
        .await?;
    cr.metadata.resource_version = updated.metadata.resource_version;

    metrics::record_state_transition(state.as_str(), reason.as_str());
    info!(
        resource.name = %name,
        from = %previous,
        to = %state,
        %reason,
        %message,
        "Status updated"
    );
    Ok(())
}
