//! # BtpOperator Spec
//!
//! The custom resource that requests installation of the SAP BTP service operator module.

use serde::{Deserialize, Serialize};

/// BtpOperator Custom Resource Definition
///
/// The resource carries no settings of its own: its presence requests the module,
/// its deletion requests removal. When several exist, only the oldest one is
/// reconciled; the others are parked in `Error`.
///
/// # Example
///
/// ```yaml
/// apiVersion: operator.kyma-project.io/v1alpha1
/// kind: BtpOperator
/// metadata:
///   name: btpoperator
///   namespace: kyma-system
/// spec: {}
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "BtpOperator",
    group = "operator.kyma-project.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::BtpOperatorStatus",
    shortname = "btpop",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct BtpOperatorSpec {}
