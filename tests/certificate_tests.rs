//! Webhook certificate regeneration policy.

mod common;

use btp_manager::certs::x509::{generate_self_signed_ca, generate_signed_cert, is_signed_by};
use btp_manager::certs::{reconcile_certificates, webhook_dns_names, CertificateAction, RegenerationReason};
use btp_manager::config::OperatorConfig;
use btp_manager::gateway::{typed, ClusterGateway, InMemoryGateway, ObjectKey};
use btp_manager::manifest::{apply_resources, load_manifests};
use chrono::{TimeDelta, Utc};
use common::{module_fixture, NAMESPACE};
use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::core::DynamicObject;
use std::collections::BTreeMap;
use std::time::Duration;

fn webhook_manifests(config: &OperatorConfig) -> Vec<DynamicObject> {
    load_manifests(&config.apply_dir())
        .unwrap()
        .into_iter()
        .filter(|obj| {
            obj.types
                .as_ref()
                .is_some_and(|t| t.api_version.starts_with("admissionregistration.k8s.io/"))
        })
        .collect()
}

fn find_secret(resources: &[DynamicObject], name: &str) -> Option<Secret> {
    resources
        .iter()
        .find(|obj| {
            obj.metadata.name.as_deref() == Some(name)
                && obj.types.as_ref().is_some_and(|t| t.kind == "Secret")
        })
        .map(|obj| typed::from_dynamic(obj).unwrap())
}

fn data(secret: &Secret, key: &str) -> Vec<u8> {
    secret.data.as_ref().unwrap()[key].0.clone()
}

async fn stored_secret(gateway: &InMemoryGateway, name: &str) -> Secret {
    typed::get_typed(gateway, Some(NAMESPACE), name).await.unwrap()
}

fn tls_secret(name: &str, prefix: &str, certificate: &[u8], key: &[u8]) -> DynamicObject {
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (format!("{prefix}.crt"), ByteString(certificate.to_vec())),
            (format!("{prefix}.key"), ByteString(key.to_vec())),
        ])),
        ..Default::default()
    };
    typed::to_dynamic(&secret).unwrap()
}

/// Run a full regeneration and persist its output
async fn bootstrap(gateway: &InMemoryGateway, config: &OperatorConfig) -> Vec<DynamicObject> {
    let mut resources = webhook_manifests(config);
    let action = reconcile_certificates(gateway, config, &mut resources)
        .await
        .unwrap();
    assert_eq!(
        action,
        CertificateAction::FullRegeneration(RegenerationReason::CaSecretMissing)
    );
    apply_resources(gateway, &resources).await.unwrap();
    resources
}

#[tokio::test]
async fn test_missing_ca_triggers_full_regeneration() {
    let fixture = module_fixture();
    let gateway = InMemoryGateway::new();
    let resources = bootstrap(&gateway, &fixture.config).await;

    let ca = find_secret(&resources, "ca-server-cert").unwrap();
    let leaf = find_secret(&resources, "webhook-server-cert").unwrap();
    let ca_certificate = data(&ca, "ca.crt");
    assert!(is_signed_by(&ca_certificate, &data(&leaf, "tls.crt")).unwrap());
    assert!(!data(&leaf, "tls.key").is_empty());

    let mutating: MutatingWebhookConfiguration = typed::get_typed(
        &gateway,
        None,
        "sap-btp-operator-mutating-webhook-configuration",
    )
    .await
    .unwrap();
    for webhook in mutating.webhooks.unwrap() {
        assert_eq!(webhook.client_config.ca_bundle.unwrap().0, ca_certificate);
    }
}

#[tokio::test]
async fn test_missing_webhook_secret_keeps_ca() {
    let fixture = module_fixture();
    let gateway = InMemoryGateway::new();
    bootstrap(&gateway, &fixture.config).await;
    let ca_before = data(&stored_secret(&gateway, "ca-server-cert").await, "ca.crt");

    let key = typed::key_for::<Secret>(Some(NAMESPACE), "webhook-server-cert");
    gateway.delete(&key).await.unwrap();

    let mut resources = webhook_manifests(&fixture.config);
    let action = reconcile_certificates(&gateway, &fixture.config, &mut resources)
        .await
        .unwrap();
    assert_eq!(
        action,
        CertificateAction::PartialRegeneration(RegenerationReason::WebhookSecretMissing)
    );
    assert!(find_secret(&resources, "ca-server-cert").is_none());
    let leaf = find_secret(&resources, "webhook-server-cert").unwrap();
    assert!(is_signed_by(&ca_before, &data(&leaf, "tls.crt")).unwrap());
}

#[tokio::test]
async fn test_valid_certificates_are_left_alone() {
    let fixture = module_fixture();
    let config = OperatorConfig {
        webhook_certificate_expiration: Duration::from_secs(3600),
        ca_certificate_expiration: Duration::from_secs(7200),
        ..fixture.config.clone()
    };
    let gateway = InMemoryGateway::new();
    bootstrap(&gateway, &config).await;
    gateway.clear_journal();

    let mut resources = webhook_manifests(&config);
    let action = reconcile_certificates(&gateway, &config, &mut resources)
        .await
        .unwrap();
    assert_eq!(action, CertificateAction::Unchanged);
    assert!(find_secret(&resources, "webhook-server-cert").is_none());

    apply_resources(&gateway, &resources).await.unwrap();
    assert!(gateway.journal().is_empty());
}

#[tokio::test]
async fn test_foreign_leaf_triggers_full_regeneration() {
    let fixture = module_fixture();
    let gateway = InMemoryGateway::new();
    bootstrap(&gateway, &fixture.config).await;
    let ca_before = data(&stored_secret(&gateway, "ca-server-cert").await, "ca.crt");

    let foreign_ca = generate_self_signed_ca(Utc::now() + TimeDelta::hours(1)).unwrap();
    let foreign_leaf = generate_signed_cert(
        Utc::now() + TimeDelta::hours(1),
        &foreign_ca.certificate,
        &foreign_ca.private_key,
        &webhook_dns_names(NAMESPACE),
    )
    .unwrap();
    gateway
        .apply(&tls_secret(
            "webhook-server-cert",
            "tls",
            &foreign_leaf.certificate,
            &foreign_leaf.private_key,
        ))
        .await
        .unwrap();

    let mut resources = webhook_manifests(&fixture.config);
    let action = reconcile_certificates(&gateway, &fixture.config, &mut resources)
        .await
        .unwrap();
    assert_eq!(
        action,
        CertificateAction::FullRegeneration(RegenerationReason::ChainInvalid)
    );
    let new_ca = data(&find_secret(&resources, "ca-server-cert").unwrap(), "ca.crt");
    assert_ne!(new_ca, ca_before);
}

#[tokio::test]
async fn test_live_webhook_bundle_is_patched() {
    let fixture = module_fixture();
    let config = OperatorConfig {
        webhook_certificate_expiration: Duration::from_secs(3600),
        ..fixture.config.clone()
    };
    let gateway = InMemoryGateway::new();
    bootstrap(&gateway, &config).await;
    let ca_certificate = data(&stored_secret(&gateway, "ca-server-cert").await, "ca.crt");

    let key = ObjectKey::cluster(
        typed::gvk_for::<MutatingWebhookConfiguration>(),
        "sap-btp-operator-mutating-webhook-configuration",
    );
    let stale = serde_json::json!({"webhooks": [
        {"name": "mservicebinding.kb.io", "admissionReviewVersions": ["v1"], "sideEffects": "None",
         "clientConfig": {"caBundle": "c3RhbGU=", "service": {"name": "sap-btp-operator-webhook-service", "namespace": "kyma-system"}}}
    ]});
    gateway.merge_patch(&key, &stale).await.unwrap();

    // Nothing from the manifests in the apply list
    let mut resources = Vec::new();
    let action = reconcile_certificates(&gateway, &config, &mut resources)
        .await
        .unwrap();
    assert_eq!(action, CertificateAction::Unchanged);

    let live: MutatingWebhookConfiguration = typed::get_typed(
        &gateway,
        None,
        "sap-btp-operator-mutating-webhook-configuration",
    )
    .await
    .unwrap();
    for webhook in live.webhooks.unwrap() {
        assert_eq!(webhook.client_config.ca_bundle.unwrap().0, ca_certificate);
    }
}

/// Seed CA and webhook Secrets whose certificates expire after the given lifetimes
async fn seed_chain(gateway: &InMemoryGateway, ca_lifetime: TimeDelta, leaf_lifetime: TimeDelta) -> Vec<u8> {
    let ca = generate_self_signed_ca(Utc::now() + ca_lifetime).unwrap();
    let leaf = generate_signed_cert(
        Utc::now() + leaf_lifetime,
        &ca.certificate,
        &ca.private_key,
        &webhook_dns_names(NAMESPACE),
    )
    .unwrap();
    gateway
        .apply(&tls_secret("ca-server-cert", "ca", &ca.certificate, &ca.private_key))
        .await
        .unwrap();
    gateway
        .apply(&tls_secret(
            "webhook-server-cert",
            "tls",
            &leaf.certificate,
            &leaf.private_key,
        ))
        .await
        .unwrap();
    ca.certificate
}

#[tokio::test]
async fn test_expiring_ca_triggers_full_regeneration() {
    let fixture = module_fixture();
    let config = OperatorConfig {
        expiration_boundary: TimeDelta::seconds(-5),
        ..fixture.config.clone()
    };
    let gateway = InMemoryGateway::new();
    let ca_before = seed_chain(&gateway, TimeDelta::seconds(2), TimeDelta::hours(1)).await;

    let mut resources = webhook_manifests(&config);
    let action = reconcile_certificates(&gateway, &config, &mut resources)
        .await
        .unwrap();
    assert_eq!(
        action,
        CertificateAction::FullRegeneration(RegenerationReason::CaExpiring)
    );
    let new_ca = data(&find_secret(&resources, "ca-server-cert").unwrap(), "ca.crt");
    assert_ne!(new_ca, ca_before);
    let leaf = find_secret(&resources, "webhook-server-cert").unwrap();
    assert!(is_signed_by(&new_ca, &data(&leaf, "tls.crt")).unwrap());
}

#[tokio::test]
async fn test_expiring_webhook_certificate_triggers_partial_regeneration() {
    let fixture = module_fixture();
    let config = OperatorConfig {
        expiration_boundary: TimeDelta::seconds(-5),
        ..fixture.config.clone()
    };
    let gateway = InMemoryGateway::new();
    let ca_before = seed_chain(&gateway, TimeDelta::hours(1), TimeDelta::seconds(2)).await;

    let mut resources = webhook_manifests(&config);
    let action = reconcile_certificates(&gateway, &config, &mut resources)
        .await
        .unwrap();
    assert_eq!(
        action,
        CertificateAction::PartialRegeneration(RegenerationReason::WebhookExpiring)
    );
    assert!(find_secret(&resources, "ca-server-cert").is_none());
    let leaf = find_secret(&resources, "webhook-server-cert").unwrap();
    assert!(is_signed_by(&ca_before, &data(&leaf, "tls.crt")).unwrap());
    assert_eq!(
        data(&stored_secret(&gateway, "ca-server-cert").await, "ca.crt"),
        ca_before
    );
}
