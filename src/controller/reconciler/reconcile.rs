//! # Reconcile
//!
//! Entry point called by the controller for every queued BtpOperator.
//!
//! One invocation performs at most one state transition. The next step runs
//! on the following invocation, triggered by the status write itself, a
//! watch event or a timed requeue.

use super::deleting::handle_deleting;
use super::status::{apply_transition, Reason};
use super::types::{Reconciler, ReconcilerError};
use super::validation::get_and_verify_required_secret;
use crate::config::OperatorConfig;
use crate::constants::DELETION_FINALIZER;
use crate::crd::{BtpOperator, State};
use crate::gateway::{typed, ClusterGateway};
use crate::manifest::{delete_outdated_resources, reconcile_resources};
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};

/// Pick the authoritative instance among several BtpOperators
///
/// The earliest `creationTimestamp` wins. On equal timestamps the later
/// entry in iteration order is chosen.
pub fn oldest_operator<'a, I>(operators: I) -> Option<&'a BtpOperator>
where
    I: IntoIterator<Item = &'a BtpOperator>,
{
    operators.into_iter().reduce(|oldest, item| {
        if oldest.metadata.creation_timestamp < item.metadata.creation_timestamp {
            oldest
        } else {
            item
        }
    })
}

/// Controller entry point
pub async fn reconcile(
    obj: Arc<BtpOperator>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    let state = obj.status.as_ref().map(|s| s.state).unwrap_or_default();
    let span = info_span!(
        "controller.reconcile",
        resource.name = %name,
        resource.namespace = %namespace,
        state = %state
    );

    async move {
        let start = Instant::now();
        metrics::increment_reconciliations();

        let result = reconcile_operator(&ctx, &namespace, &name).await;
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

        if result.is_ok() {
            ctx.reset_backoff(&format!("{namespace}/{name}"));
        }
        result
    }
    .instrument(span)
    .await
}

/// Run one reconciliation step for the named BtpOperator
pub async fn reconcile_operator(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
) -> Result<Action, ReconcilerError> {
    let gateway = ctx.gateway.as_ref();
    let config = ctx.config.snapshot();

    let mut cr = match typed::get_typed::<BtpOperator>(gateway, Some(namespace), name).await {
        Ok(cr) => cr,
        Err(e) if e.is_not_found() => {
            info!("BtpOperator CR not found. Ignoring since object has been deleted.");
            ctx.forget_backoff(&format!("{namespace}/{name}"));
            return Ok(Action::await_change());
        }
        Err(e) => {
            error!(error = %e, "Unable to get BtpOperator CR");
            return Err(e.into());
        }
    };

    let existing = typed::list_typed::<BtpOperator>(gateway, None, None)
        .await
        .inspect_err(|e| error!(error = %e, "Unable to get existing BtpOperator CRs"))?;

    if existing.len() > 1 {
        if let Some(oldest) = oldest_operator(&existing) {
            if oldest.metadata.uid == cr.metadata.uid {
                if let Some(status) = cr.status.as_mut() {
                    status.conditions.clear();
                }
            } else {
                info!("Handling redundant BtpOperator CR");
                let message = format!(
                    "'{}' BtpOperator CR in '{}' namespace reconciles the module",
                    oldest.name_any(),
                    oldest.namespace().unwrap_or_default()
                );
                apply_transition(gateway, &mut cr, State::Error, Reason::OlderCRExists, message)
                    .await?;
                return Ok(Action::await_change());
            }
        }
    }

    let deleting = cr.metadata.deletion_timestamp.is_some();
    if !deleting && !cr.finalizers().iter().any(|f| f == DELETION_FINALIZER) {
        add_finalizer(gateway, &cr).await?;
        return Ok(Action::await_change());
    }

    let state = cr.status.as_ref().map(|s| s.state).unwrap_or_default();
    if deleting && state != State::Deleting {
        apply_transition(
            gateway,
            &mut cr,
            State::Deleting,
            Reason::HardDeleting,
            "BtpOperator is to be deleted",
        )
        .await?;
        return Ok(Action::await_change());
    }

    match state {
        State::Initial => {
            info!("Handling Initial state");
            apply_transition(gateway, &mut cr, State::Processing, Reason::Initialized, "Initialized")
                .await?;
            Ok(Action::await_change())
        }
        State::Processing => {
            handle_processing(gateway, &config, &mut cr).await?;
            Ok(Action::requeue(config.processing_state_requeue_interval))
        }
        State::Error => {
            info!("Handling Error state");
            apply_transition(gateway, &mut cr, State::Processing, Reason::Updated, "CR has been updated")
                .await?;
            Ok(Action::await_change())
        }
        State::Deleting => {
            handle_deleting(gateway, &config, &mut cr).await?;
            // Finalizers are cleared, the CR is on its way out
            ctx.forget_backoff(&format!("{namespace}/{name}"));
            Ok(Action::await_change())
        }
        State::Ready => {
            handle_ready(gateway, &config, &mut cr).await?;
            Ok(Action::requeue(config.ready_state_requeue_interval))
        }
    }
}

async fn add_finalizer(gateway: &dyn ClusterGateway, cr: &BtpOperator) -> Result<(), ReconcilerError> {
    debug!(finalizer = DELETION_FINALIZER, "Adding deletion finalizer");
    let mut finalizers = cr.finalizers().to_vec();
    finalizers.push(DELETION_FINALIZER.to_string());
    let key = typed::key_for::<BtpOperator>(cr.metadata.namespace.as_deref(), &cr.name_any());
    gateway
        .merge_patch(
            &key,
            &json!({
                "metadata": {
                    "finalizers": finalizers,
                    "resourceVersion": cr.metadata.resource_version,
                }
            }),
        )
        .await?;
    Ok(())
}

async fn handle_processing(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
    cr: &mut BtpOperator,
) -> Result<(), ReconcilerError> {
    info!("Handling Processing state");
    let credentials = match get_and_verify_required_secret(gateway, config).await {
        Ok(credentials) => credentials,
        Err(problem) => {
            apply_transition(gateway, cr, State::Error, problem.reason, problem.message).await?;
            return Ok(());
        }
    };

    if let Err(e) = delete_outdated_resources(gateway, config).await {
        apply_transition(gateway, cr, State::Error, Reason::ProvisioningFailed, e.to_string()).await?;
        return Ok(());
    }
    if let Err(e) = reconcile_resources(gateway, config, &credentials).await {
        apply_transition(gateway, cr, State::Error, Reason::ProvisioningFailed, e.to_string()).await?;
        return Ok(());
    }

    info!("Provisioning succeeded");
    apply_transition(
        gateway,
        cr,
        State::Ready,
        Reason::ReconcileSucceeded,
        "Module provisioning succeeded",
    )
    .await?;
    Ok(())
}

async fn handle_ready(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
    cr: &mut BtpOperator,
) -> Result<(), ReconcilerError> {
    info!("Handling Ready state");
    let credentials = match get_and_verify_required_secret(gateway, config).await {
        Ok(credentials) => credentials,
        Err(problem) => {
            apply_transition(gateway, cr, State::Error, problem.reason, problem.message).await?;
            return Ok(());
        }
    };

    if let Err(e) = delete_outdated_resources(gateway, config).await {
        apply_transition(gateway, cr, State::Error, Reason::ReconcileFailed, e.to_string()).await?;
        return Ok(());
    }
    if let Err(e) = reconcile_resources(gateway, config, &credentials).await {
        apply_transition(gateway, cr, State::Error, Reason::ReconcileFailed, e.to_string()).await?;
        return Ok(());
    }

    info!("Reconciliation succeeded");
    Ok(())
}
