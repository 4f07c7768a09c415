//! Shared fixtures for the integration tests.

#![allow(dead_code, reason = "each test crate uses a subset of the helpers")]

use btp_manager::config::{OperatorConfig, SharedOperatorConfig};
use btp_manager::controller::reconciler::{reconcile_operator, Reconciler};
use btp_manager::crd::{BtpOperator, State};
use btp_manager::gateway::{typed, ClusterGateway, InMemoryGateway};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::core::DynamicObject;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub const NAMESPACE: &str = "kyma-system";

const CHART_YAML: &str = "apiVersion: v2\nname: sap-btp-operator\nversion: 0.1.0\n";

const MODULE_YAML: &str = r"apiVersion: v1
kind: ConfigMap
metadata:
  name: sap-btp-operator-config
data:
  RELEASE_NAMESPACE: kyma-system
---
apiVersion: v1
kind: Secret
metadata:
  name: sap-btp-service-operator
type: Opaque
data: {}
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: sap-btp-operator-controller-manager
spec:
  replicas: 1
  selector:
    matchLabels:
      app: sap-btp-operator
  template:
    metadata:
      labels:
        app: sap-btp-operator
    spec:
      containers:
        - name: manager
          image: europe-docker.pkg.dev/kyma-project/prod/external/sap/sap-btp-operator/controller:v0.6.0
";

const WEBHOOKS_YAML: &str = r"apiVersion: admissionregistration.k8s.io/v1
kind: MutatingWebhookConfiguration
metadata:
  name: sap-btp-operator-mutating-webhook-configuration
webhooks:
  - name: mservicebinding.kb.io
    admissionReviewVersions: [v1]
    sideEffects: None
    clientConfig:
      service:
        name: sap-btp-operator-webhook-service
        namespace: kyma-system
        path: /mutate-services-cloud-sap-com-v1-servicebinding
  - name: mserviceinstance.kb.io
    admissionReviewVersions: [v1]
    sideEffects: None
    clientConfig:
      service:
        name: sap-btp-operator-webhook-service
        namespace: kyma-system
        path: /mutate-services-cloud-sap-com-v1-serviceinstance
---
apiVersion: admissionregistration.k8s.io/v1
kind: ValidatingWebhookConfiguration
metadata:
  name: sap-btp-operator-validating-webhook-configuration
webhooks:
  - name: vserviceinstance.kb.io
    admissionReviewVersions: [v1]
    sideEffects: None
    clientConfig:
      service:
        name: sap-btp-operator-webhook-service
        namespace: kyma-system
        path: /validate-services-cloud-sap-com-v1-serviceinstance
";

const OUTDATED_YAML: &str = r"apiVersion: v1
kind: ConfigMap
metadata:
  name: sap-btp-operator-legacy-config
";

/// Chart and manifest directories for one test
pub struct ModuleFixture {
    // Keeps the directory alive
    _dir: TempDir,
    pub config: OperatorConfig,
}

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

pub fn module_fixture() -> ModuleFixture {
    let dir = tempfile::tempdir().unwrap();
    let chart_path = dir.path().join("chart");
    let resources_path = dir.path().join("resources");

    write(&chart_path.join("Chart.yaml"), CHART_YAML);
    write(&resources_path.join("apply/module.yaml"), MODULE_YAML);
    write(&resources_path.join("apply/webhooks.yaml"), WEBHOOKS_YAML);
    write(&resources_path.join("delete/outdated.yaml"), OUTDATED_YAML);

    let config = OperatorConfig {
        chart_path,
        resources_path,
        ..OperatorConfig::default()
    };
    ModuleFixture { _dir: dir, config }
}

pub fn credentials_secret(namespace: &str, name: &str, entries: &[(&str, &str)]) -> DynamicObject {
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(
            entries
                .iter()
                .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    };
    typed::to_dynamic(&secret).unwrap()
}

pub fn valid_credentials() -> Vec<(&'static str, &'static str)> {
    vec![
        ("clientid", "test-client"),
        ("clientsecret", "test-secret"),
        ("sm_url", "https://service-manager.example.com"),
        ("tokenurl", "https://auth.example.com"),
        ("cluster_id", "test-cluster"),
    ]
}

pub fn seed_credentials(gateway: &InMemoryGateway) {
    gateway
        .insert(&credentials_secret(NAMESPACE, "sap-btp-manager", &valid_credentials()))
        .unwrap();
}

pub fn operator(name: &str, created: &str) -> BtpOperator {
    let mut cr = BtpOperator::new(name, Default::default());
    cr.metadata.namespace = Some(NAMESPACE.to_string());
    cr.metadata.creation_timestamp = Some(serde_json::from_value::<Time>(json!(created)).unwrap());
    cr
}

pub fn insert_operator(gateway: &InMemoryGateway, cr: &BtpOperator) {
    gateway.insert(&typed::to_dynamic(cr).unwrap()).unwrap();
}

pub fn namespace(name: &str) -> DynamicObject {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {"name": name}
    }))
    .unwrap()
}

pub fn context(gateway: &Arc<InMemoryGateway>, config: OperatorConfig) -> Reconciler {
    Reconciler::new(
        Arc::clone(gateway) as Arc<dyn ClusterGateway>,
        SharedOperatorConfig::new(config),
    )
}

pub async fn fetch_operator(gateway: &InMemoryGateway, name: &str) -> BtpOperator {
    typed::get_typed::<BtpOperator>(gateway, Some(NAMESPACE), name)
        .await
        .unwrap()
}

pub fn state_of(cr: &BtpOperator) -> State {
    cr.status.as_ref().map(|s| s.state).unwrap_or_default()
}

/// Reconcile `name` repeatedly until it reaches `target` or `max_steps` runs out
pub async fn reconcile_until(
    ctx: &Reconciler,
    gateway: &InMemoryGateway,
    name: &str,
    target: State,
    max_steps: usize,
) -> BtpOperator {
    for _ in 0..max_steps {
        reconcile_operator(ctx, NAMESPACE, name).await.unwrap();
        let cr = fetch_operator(gateway, name).await;
        if state_of(&cr) == target {
            return cr;
        }
    }
    fetch_operator(gateway, name).await
}
