//! # CRD Validation Tests
//!
//! Guards the BtpOperator schema against drift: sample resources as the API
//! server returns them must deserialize, and the generated CRD must keep its
//! identity and subresources.

use btp_manager::crd::{BtpOperator, State, READY_CONDITION_TYPE};
use kube::CustomResourceExt;

#[test]
fn test_minimal_resource() {
    let yaml = r"
apiVersion: operator.kyma-project.io/v1alpha1
kind: BtpOperator
metadata:
  name: btpoperator
  namespace: kyma-system
spec: {}
";
    let cr: BtpOperator = serde_yaml::from_str(yaml).expect("Should deserialize minimal CR");
    assert_eq!(cr.metadata.name.as_deref(), Some("btpoperator"));
    assert!(cr.status.is_none());
}

#[test]
fn test_resource_with_status() {
    let yaml = r#"
apiVersion: operator.kyma-project.io/v1alpha1
kind: BtpOperator
metadata:
  name: btpoperator
  namespace: kyma-system
  finalizers:
    - custom-deletion-finalizer
spec: {}
status:
  state: Error
  conditions:
    - type: Ready
      status: "False"
      lastTransitionTime: "2024-03-01T10:00:00Z"
      reason: InvalidSecret
      message: Secret validation failed
"#;
    let cr: BtpOperator = serde_yaml::from_str(yaml).expect("Should deserialize CR with status");
    let status = cr.status.unwrap();
    assert_eq!(status.state, State::Error);
    let ready = status.condition(READY_CONDITION_TYPE).unwrap();
    assert_eq!(ready.status, "False");
    assert_eq!(ready.reason.as_deref(), Some("InvalidSecret"));
    assert_eq!(ready.last_transition_time.as_deref(), Some("2024-03-01T10:00:00Z"));
}

#[test]
fn test_empty_state_is_initial() {
    let yaml = r#"
apiVersion: operator.kyma-project.io/v1alpha1
kind: BtpOperator
metadata:
  name: btpoperator
spec: {}
status:
  state: ""
"#;
    let cr: BtpOperator = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cr.status.unwrap().state, State::Initial);
}

#[test]
fn test_unknown_state_is_rejected() {
    let yaml = r"
apiVersion: operator.kyma-project.io/v1alpha1
kind: BtpOperator
metadata:
  name: btpoperator
spec: {}
status:
  state: Warning
";
    assert!(serde_yaml::from_str::<BtpOperator>(yaml).is_err());
}

#[test]
fn test_generated_crd_identity() {
    let crd = BtpOperator::crd();
    assert_eq!(
        crd.metadata.name.as_deref(),
        Some("btpoperators.operator.kyma-project.io")
    );
    assert_eq!(crd.spec.group, "operator.kyma-project.io");
    assert_eq!(crd.spec.scope, "Namespaced");
    assert_eq!(crd.spec.names.kind, "BtpOperator");
    assert_eq!(crd.spec.names.short_names, Some(vec!["btpop".to_string()]));

    let version = &crd.spec.versions[0];
    assert_eq!(version.name, "v1alpha1");
    assert!(version
        .subresources
        .as_ref()
        .is_some_and(|s| s.status.is_some()));
    let columns = version.additional_printer_columns.as_ref().unwrap();
    assert!(columns.iter().any(|c| c.name == "State" && c.json_path == ".status.state"));
}
