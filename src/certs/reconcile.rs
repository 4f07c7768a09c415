//! # Certificate Reconciliation
//!
//! Decides whether the webhook CA and leaf certificates must be regenerated.
//!
//! Policy, first match wins:
//!
//! 1. CA Secret missing: full regeneration
//! 2. Webhook Secret missing: new leaf signed by the stored CA
//! 3. Leaf not signed by the stored CA: full regeneration
//! 4. CA inside its expiration boundary: full regeneration
//! 5. Leaf inside its expiration boundary: new leaf signed by the stored CA
//! 6. Otherwise: only make sure webhook CA bundles match the stored CA
//!
//! New certificates are appended to the apply list as Secrets; webhook
//! configurations in the apply list are rewritten in place.

use super::webhook::{ca_bundle_target, ADMISSION_REGISTRATION_GROUP, MUTATING_WEBHOOK_KIND, VALIDATING_WEBHOOK_KIND};
use super::x509::{self, CertificateMaterial};
use super::CertificateError;
use crate::config::OperatorConfig;
use crate::constants::{
    CA_SECRET_DATA_PREFIX, CA_SECRET_NAME, CERTIFICATE_POSTFIX, MANAGED_BY_LABEL_KEY,
    MUTATING_WEBHOOK_NAME, OPERATOR_NAME, PRIVATE_KEY_POSTFIX, VALIDATING_WEBHOOK_NAME,
    WEBHOOK_SECRET_DATA_PREFIX, WEBHOOK_SECRET_NAME, WEBHOOK_SERVICE_NAME,
};
use crate::gateway::{typed, ClusterGateway, ObjectKey};
use crate::observability::metrics;
use chrono::{DateTime, TimeDelta, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::core::{DynamicObject, GroupVersionKind};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why certificates were regenerated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenerationReason {
    CaSecretMissing,
    WebhookSecretMissing,
    ChainInvalid,
    CaExpiring,
    WebhookExpiring,
}

/// Outcome of [`reconcile_certificates`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateAction {
    /// New CA and new leaf
    FullRegeneration(RegenerationReason),
    /// New leaf signed by the stored CA
    PartialRegeneration(RegenerationReason),
    /// Certificates kept, CA bundles verified
    Unchanged,
}

/// Data key of a certificate Secret entry, e.g. `ca.crt`
fn data_key(prefix: &str, postfix: &str) -> String {
    format!("{prefix}.{postfix}")
}

/// DNS names the webhook service is reached under
#[must_use]
pub fn webhook_dns_names(namespace: &str) -> Vec<String> {
    vec![
        format!("{WEBHOOK_SERVICE_NAME}.{namespace}.svc"),
        format!("{WEBHOOK_SERVICE_NAME}.{namespace}.svc.cluster.local"),
    ]
}

fn secret_value(secret: &Secret, secret_name: &str, key: &str) -> Result<Vec<u8>, CertificateError> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .filter(|value| !value.0.is_empty())
        .map(|value| value.0.clone())
        .ok_or_else(|| CertificateError::MissingData {
            secret: secret_name.to_string(),
            key: key.to_string(),
        })
}

fn lifetime_end(now: DateTime<Utc>, lifetime: Duration) -> Result<DateTime<Utc>, CertificateError> {
    TimeDelta::from_std(lifetime)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| CertificateError::Generation(format!("lifetime {lifetime:?} out of range")))
}

async fn find_secret(
    gateway: &dyn ClusterGateway,
    namespace: &str,
    name: &str,
) -> Result<Option<Secret>, CertificateError> {
    match typed::get_typed::<Secret>(gateway, Some(namespace), name).await {
        Ok(secret) => Ok(Some(secret)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Build the Secret holding a certificate and its key
fn certificate_secret(
    name: &str,
    prefix: &str,
    material: &CertificateMaterial,
    namespace: &str,
) -> Result<DynamicObject, CertificateError> {
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL_KEY.to_string(),
                OPERATOR_NAME.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (
                data_key(prefix, CERTIFICATE_POSTFIX),
                ByteString(material.certificate.clone()),
            ),
            (
                data_key(prefix, PRIVATE_KEY_POSTFIX),
                ByteString(material.private_key.to_vec()),
            ),
        ])),
        ..Default::default()
    };
    Ok(typed::to_dynamic(&secret)?)
}

/// Append `obj` to the apply list, replacing an entry with the same kind and name
fn upsert(resources: &mut Vec<DynamicObject>, obj: DynamicObject) {
    let same = |existing: &DynamicObject| {
        existing.metadata.name == obj.metadata.name
            && existing.types.as_ref().map(|t| &t.kind) == obj.types.as_ref().map(|t| &t.kind)
    };
    match resources.iter().position(same) {
        Some(index) => resources[index] = obj,
        None => resources.push(obj),
    }
}

/// Make every webhook configuration carry `expected_ca` as its CA bundle
///
/// Configurations present in the apply list are rewritten in place; the
/// others are patched in the cluster if they exist there.
pub async fn reconcile_webhook_bundles(
    gateway: &dyn ClusterGateway,
    resources: &mut [DynamicObject],
    expected_ca: &[u8],
) -> Result<(), CertificateError> {
    let mut in_apply_list = HashSet::new();
    for obj in resources.iter_mut() {
        if let Some(mut target) = ca_bundle_target(obj)? {
            in_apply_list.insert(target.kind());
            if target.patch_ca_bundle(expected_ca) {
                debug!(kind = target.kind(), path = target.ca_bundle_path(), "Rewrote CA bundle in apply list");
                *obj = target.to_dynamic()?;
            }
        }
    }

    for (kind, name) in [
        (MUTATING_WEBHOOK_KIND, MUTATING_WEBHOOK_NAME),
        (VALIDATING_WEBHOOK_KIND, VALIDATING_WEBHOOK_NAME),
    ] {
        if in_apply_list.contains(kind) {
            continue;
        }
        let key = ObjectKey::cluster(GroupVersionKind::gvk(ADMISSION_REGISTRATION_GROUP, "v1", kind), name);
        let live = match gateway.get(&key).await {
            Ok(live) => live,
            Err(e) if e.is_not_found() => {
                debug!(kind, name, "Webhook configuration not found, skipping CA bundle");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(mut target) = ca_bundle_target(&live)? {
            if target.patch_ca_bundle(expected_ca) {
                info!(kind, name, "Patching CA bundle of live webhook configuration");
                gateway.merge_patch(&key, &target.bundle_patch()?).await?;
            }
        }
    }
    Ok(())
}

async fn full_regeneration(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
    resources: &mut Vec<DynamicObject>,
    reason: RegenerationReason,
) -> Result<CertificateAction, CertificateError> {
    info!(?reason, "Full certificate regeneration started");
    let now = Utc::now();
    let namespace = config.chart_namespace.as_str();

    let ca = x509::generate_self_signed_ca(lifetime_end(now, config.ca_certificate_expiration)?)?;
    let leaf = x509::generate_signed_cert(
        lifetime_end(now, config.webhook_certificate_expiration)?,
        &ca.certificate,
        &ca.private_key,
        &webhook_dns_names(namespace),
    )?;

    upsert(
        resources,
        certificate_secret(CA_SECRET_NAME, CA_SECRET_DATA_PREFIX, &ca, namespace)?,
    );
    upsert(
        resources,
        certificate_secret(WEBHOOK_SECRET_NAME, WEBHOOK_SECRET_DATA_PREFIX, &leaf, namespace)?,
    );
    reconcile_webhook_bundles(gateway, resources, &ca.certificate).await?;

    metrics::increment_certificate_regenerations("full");
    info!("Full certificate regeneration succeeded");
    Ok(CertificateAction::FullRegeneration(reason))
}

async fn partial_regeneration(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
    resources: &mut Vec<DynamicObject>,
    ca_secret: &Secret,
    reason: RegenerationReason,
) -> Result<CertificateAction, CertificateError> {
    info!(?reason, "Partial certificate regeneration started");
    let namespace = config.chart_namespace.as_str();
    let ca_certificate = secret_value(
        ca_secret,
        CA_SECRET_NAME,
        &data_key(CA_SECRET_DATA_PREFIX, CERTIFICATE_POSTFIX),
    )?;
    let ca_private_key = zeroize::Zeroizing::new(secret_value(
        ca_secret,
        CA_SECRET_NAME,
        &data_key(CA_SECRET_DATA_PREFIX, PRIVATE_KEY_POSTFIX),
    )?);

    let leaf = x509::generate_signed_cert(
        lifetime_end(Utc::now(), config.webhook_certificate_expiration)?,
        &ca_certificate,
        &ca_private_key,
        &webhook_dns_names(namespace),
    )?;
    upsert(
        resources,
        certificate_secret(WEBHOOK_SECRET_NAME, WEBHOOK_SECRET_DATA_PREFIX, &leaf, namespace)?,
    );
    reconcile_webhook_bundles(gateway, resources, &ca_certificate).await?;

    metrics::increment_certificate_regenerations("partial");
    info!("Partial certificate regeneration succeeded");
    Ok(CertificateAction::PartialRegeneration(reason))
}

/// Run the certificate policy against the in-flight apply list
pub async fn reconcile_certificates(
    gateway: &dyn ClusterGateway,
    config: &OperatorConfig,
    resources: &mut Vec<DynamicObject>,
) -> Result<CertificateAction, CertificateError> {
    let namespace = config.chart_namespace.as_str();

    let Some(ca_secret) = find_secret(gateway, namespace, CA_SECRET_NAME).await? else {
        info!(secret = CA_SECRET_NAME, "CA secret does not exist");
        return full_regeneration(gateway, config, resources, RegenerationReason::CaSecretMissing).await;
    };

    let Some(webhook_secret) = find_secret(gateway, namespace, WEBHOOK_SECRET_NAME).await? else {
        info!(secret = WEBHOOK_SECRET_NAME, "Webhook secret does not exist");
        return partial_regeneration(
            gateway,
            config,
            resources,
            &ca_secret,
            RegenerationReason::WebhookSecretMissing,
        )
        .await;
    };

    let ca_key = data_key(CA_SECRET_DATA_PREFIX, CERTIFICATE_POSTFIX);
    let webhook_key = data_key(WEBHOOK_SECRET_DATA_PREFIX, CERTIFICATE_POSTFIX);
    let chain = secret_value(&ca_secret, CA_SECRET_NAME, &ca_key).and_then(|ca| {
        let leaf = secret_value(&webhook_secret, WEBHOOK_SECRET_NAME, &webhook_key)?;
        Ok((x509::is_signed_by(&ca, &leaf)?, ca, leaf))
    });
    let (ca_certificate, webhook_certificate) = match chain {
        Ok((true, ca, leaf)) => (ca, leaf),
        Ok((false, _, _)) => {
            warn!("Webhook certificate is not signed by the stored CA");
            return full_regeneration(gateway, config, resources, RegenerationReason::ChainInvalid).await;
        }
        Err(e) => {
            warn!(error = %e, "Unable to verify webhook certificate against the stored CA");
            return full_regeneration(gateway, config, resources, RegenerationReason::ChainInvalid).await;
        }
    };
    debug!("Webhook certificate is signed by the stored CA");

    let now = Utc::now();
    if x509::expires_soon(&ca_certificate, config.expiration_boundary, now)? {
        info!("CA certificate expires soon");
        return full_regeneration(gateway, config, resources, RegenerationReason::CaExpiring).await;
    }

    if x509::expires_soon(&webhook_certificate, config.expiration_boundary, now)? {
        info!("Webhook certificate expires soon");
        return partial_regeneration(
            gateway,
            config,
            resources,
            &ca_secret,
            RegenerationReason::WebhookExpiring,
        )
        .await;
    }

    reconcile_webhook_bundles(gateway, resources, &ca_certificate).await?;
    debug!("Certificates are valid and webhook CA bundles are up to date");
    Ok(CertificateAction::Unchanged)
}
