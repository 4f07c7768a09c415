//! Preparation of loaded manifests before they are applied.

use super::ManifestError;
use crate::constants::{
    BTP_SERVICE_OPERATOR_CONFIG_MAP, BTP_SERVICE_OPERATOR_SECRET, CHART_VERSION_LABEL_KEY,
    CLUSTER_ID_CONFIG_KEY, CLUSTER_ID_SECRET_KEY, MANAGED_BY_LABEL_KEY, OPERATOR_NAME,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use kube::core::DynamicObject;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Values injected into the module manifests
#[derive(Debug, Clone)]
pub struct ModuleInputs<'a> {
    pub namespace: &'a str,
    pub chart_version: &'a str,
    /// Decoded data of the credential Secret
    pub credentials: &'a BTreeMap<String, Vec<u8>>,
}

fn is_object(obj: &DynamicObject, kind: &str, name: &str) -> bool {
    obj.types.as_ref().is_some_and(|t| t.kind == kind) && obj.metadata.name.as_deref() == Some(name)
}

fn find_object<'o>(
    objects: &'o mut [DynamicObject],
    kind: &str,
    name: &str,
) -> Result<&'o mut DynamicObject, ManifestError> {
    objects
        .iter_mut()
        .find(|obj| is_object(obj, kind, name))
        .ok_or_else(|| ManifestError::MissingObject {
            kind: kind.to_string(),
            name: name.to_string(),
        })
}

fn insert_data(obj: &mut DynamicObject, key: &str, value: Value) {
    if !obj.data["data"].is_object() {
        obj.data["data"] = json!({});
    }
    obj.data["data"][key] = value;
}

/// Stamp labels and namespace on every object and inject credentials
///
/// The module ConfigMap receives the cluster id; the module Secret receives
/// every credential key base64-encoded. Both must be present in `objects`.
pub fn prepare_module_resources(
    objects: &mut [DynamicObject],
    inputs: &ModuleInputs<'_>,
) -> Result<(), ManifestError> {
    for obj in objects.iter_mut() {
        let labels = obj.metadata.labels.get_or_insert_with(BTreeMap::new);
        labels.insert(MANAGED_BY_LABEL_KEY.to_string(), OPERATOR_NAME.to_string());
        labels.insert(
            CHART_VERSION_LABEL_KEY.to_string(),
            inputs.chart_version.to_string(),
        );
        obj.metadata.namespace = Some(inputs.namespace.to_string());
        obj.metadata.creation_timestamp = None;
    }

    let cluster_id = inputs
        .credentials
        .get(CLUSTER_ID_SECRET_KEY)
        .map(|value| String::from_utf8_lossy(value).into_owned())
        .unwrap_or_default();
    let config_map = find_object(objects, "ConfigMap", BTP_SERVICE_OPERATOR_CONFIG_MAP)?;
    insert_data(config_map, CLUSTER_ID_CONFIG_KEY, json!(cluster_id));

    let secret = find_object(objects, "Secret", BTP_SERVICE_OPERATOR_SECRET)?;
    for (key, value) in inputs.credentials {
        insert_data(secret, key, json!(STANDARD.encode(value)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(value: Value) -> DynamicObject {
        serde_json::from_value(value).unwrap()
    }

    fn manifests() -> Vec<DynamicObject> {
        vec![
            object(json!({
                "apiVersion": "v1", "kind": "ConfigMap",
                "metadata": {"name": "sap-btp-operator-config", "namespace": "elsewhere",
                             "creationTimestamp": "2024-01-01T00:00:00Z"},
                "data": {"OTHER": "kept"}
            })),
            object(json!({
                "apiVersion": "v1", "kind": "Secret",
                "metadata": {"name": "sap-btp-service-operator", "labels": {"app": "x"}}
            })),
            object(json!({
                "apiVersion": "apps/v1", "kind": "Deployment",
                "metadata": {"name": "sap-btp-operator-controller-manager"}
            })),
        ]
    }

    fn credentials() -> BTreeMap<String, Vec<u8>> {
        BTreeMap::from([
            ("clientid".to_string(), b"id".to_vec()),
            ("cluster_id".to_string(), b"c-1".to_vec()),
        ])
    }

    #[test]
    fn test_stamps_labels_and_namespace() {
        let mut objects = manifests();
        let creds = credentials();
        let inputs = ModuleInputs {
            namespace: "kyma-system",
            chart_version: "1.2.3",
            credentials: &creds,
        };
        prepare_module_resources(&mut objects, &inputs).unwrap();

        for obj in &objects {
            let labels = obj.metadata.labels.as_ref().unwrap();
            assert_eq!(labels[MANAGED_BY_LABEL_KEY], "btp-manager");
            assert_eq!(labels[CHART_VERSION_LABEL_KEY], "1.2.3");
            assert_eq!(obj.metadata.namespace.as_deref(), Some("kyma-system"));
            assert!(obj.metadata.creation_timestamp.is_none());
        }
        assert_eq!(objects[1].metadata.labels.as_ref().unwrap()["app"], "x");
    }

    #[test]
    fn test_injects_cluster_id_and_credentials() {
        let mut objects = manifests();
        let creds = credentials();
        let inputs = ModuleInputs {
            namespace: "kyma-system",
            chart_version: "1.2.3",
            credentials: &creds,
        };
        prepare_module_resources(&mut objects, &inputs).unwrap();

        assert_eq!(objects[0].data["data"]["CLUSTER_ID"], "c-1");
        assert_eq!(objects[0].data["data"]["OTHER"], "kept");
        assert_eq!(objects[1].data["data"]["clientid"], "aWQ=");
        assert_eq!(objects[1].data["data"]["cluster_id"], "Yy0x");
    }

    #[test]
    fn test_missing_module_secret_is_an_error() {
        let mut objects = manifests();
        objects.remove(1);
        let creds = credentials();
        let inputs = ModuleInputs {
            namespace: "kyma-system",
            chart_version: "1.2.3",
            credentials: &creds,
        };
        assert!(matches!(
            prepare_module_resources(&mut objects, &inputs),
            Err(ManifestError::MissingObject { .. })
        ));
    }
}
