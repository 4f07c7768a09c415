//! # Webhook CA Bundles
//!
//! Adapters that keep the `caBundle` of admission webhook configurations in
//! sync with the current CA certificate.

use super::CertificateError;
use crate::gateway::{gvk_of, typed};
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::ByteString;
use kube::core::DynamicObject;
use serde_json::json;

pub const MUTATING_WEBHOOK_KIND: &str = "MutatingWebhookConfiguration";
pub const VALIDATING_WEBHOOK_KIND: &str = "ValidatingWebhookConfiguration";
pub const ADMISSION_REGISTRATION_GROUP: &str = "admissionregistration.k8s.io";

/// An object embedding CA bundles that must match the current CA
pub trait CaBundleTarget: Send {
    /// Kind of the wrapped object
    fn kind(&self) -> &'static str;

    /// Location of the bundles inside the object
    fn ca_bundle_path(&self) -> &'static str {
        "webhooks[*].clientConfig.caBundle"
    }

    /// Set every bundle to `expected_ca`; returns whether anything changed
    fn patch_ca_bundle(&mut self, expected_ca: &[u8]) -> bool;

    /// Merge patch carrying the bundle-bearing fields
    fn bundle_patch(&self) -> Result<serde_json::Value, CertificateError>;

    /// Untyped form for the apply list
    fn to_dynamic(&self) -> Result<DynamicObject, CertificateError>;
}

fn sync_bundle(slot: &mut Option<ByteString>, expected_ca: &[u8]) -> bool {
    if slot.as_ref().is_some_and(|current| current.0 == expected_ca) {
        return false;
    }
    *slot = Some(ByteString(expected_ca.to_vec()));
    true
}

/// Mutating admission webhook adapter
#[derive(Debug, Clone)]
pub struct MutatingWebhookTarget(pub MutatingWebhookConfiguration);

impl CaBundleTarget for MutatingWebhookTarget {
    fn kind(&self) -> &'static str {
        MUTATING_WEBHOOK_KIND
    }

    fn patch_ca_bundle(&mut self, expected_ca: &[u8]) -> bool {
        let mut changed = false;
        for webhook in self.0.webhooks.iter_mut().flatten() {
            changed |= sync_bundle(&mut webhook.client_config.ca_bundle, expected_ca);
        }
        changed
    }

    fn bundle_patch(&self) -> Result<serde_json::Value, CertificateError> {
        Ok(json!({ "webhooks": serde_json::to_value(&self.0.webhooks)? }))
    }

    fn to_dynamic(&self) -> Result<DynamicObject, CertificateError> {
        Ok(typed::to_dynamic(&self.0)?)
    }
}

/// Validating admission webhook adapter
#[derive(Debug, Clone)]
pub struct ValidatingWebhookTarget(pub ValidatingWebhookConfiguration);

impl CaBundleTarget for ValidatingWebhookTarget {
    fn kind(&self) -> &'static str {
        VALIDATING_WEBHOOK_KIND
    }

    fn patch_ca_bundle(&mut self, expected_ca: &[u8]) -> bool {
        let mut changed = false;
        for webhook in self.0.webhooks.iter_mut().flatten() {
            changed |= sync_bundle(&mut webhook.client_config.ca_bundle, expected_ca);
        }
        changed
    }

    fn bundle_patch(&self) -> Result<serde_json::Value, CertificateError> {
        Ok(json!({ "webhooks": serde_json::to_value(&self.0.webhooks)? }))
    }

    fn to_dynamic(&self) -> Result<DynamicObject, CertificateError> {
        Ok(typed::to_dynamic(&self.0)?)
    }
}

/// Wrap an untyped object in its CA bundle adapter, if it is a webhook configuration
pub fn ca_bundle_target(
    obj: &DynamicObject,
) -> Result<Option<Box<dyn CaBundleTarget>>, CertificateError> {
    let gvk = gvk_of(obj)?;
    if gvk.group != ADMISSION_REGISTRATION_GROUP {
        return Ok(None);
    }
    Ok(match gvk.kind.as_str() {
        MUTATING_WEBHOOK_KIND => Some(Box::new(MutatingWebhookTarget(typed::from_dynamic(obj)?))),
        VALIDATING_WEBHOOK_KIND => {
            Some(Box::new(ValidatingWebhookTarget(typed::from_dynamic(obj)?)))
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutating(ca_bundle: Option<&str>) -> DynamicObject {
        let mut client_config = json!({"service": {"name": "svc", "namespace": "kyma-system"}});
        if let Some(bundle) = ca_bundle {
            client_config["caBundle"] = json!(bundle);
        }
        serde_json::from_value(json!({
            "apiVersion": "admissionregistration.k8s.io/v1",
            "kind": "MutatingWebhookConfiguration",
            "metadata": {"name": "sap-btp-operator-mutating-webhook-configuration"},
            "webhooks": [
                {"name": "a.example.com", "admissionReviewVersions": ["v1"], "sideEffects": "None", "clientConfig": client_config.clone()},
                {"name": "b.example.com", "admissionReviewVersions": ["v1"], "sideEffects": "None", "clientConfig": client_config}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_patches_every_webhook_entry() {
        let obj = mutating(None);
        let mut target = ca_bundle_target(&obj).unwrap().unwrap();
        assert_eq!(target.kind(), MUTATING_WEBHOOK_KIND);

        assert!(target.patch_ca_bundle(b"CA"));
        let patched = target.to_dynamic().unwrap();
        // caBundle is base64 on the wire
        assert_eq!(patched.data["webhooks"][0]["clientConfig"]["caBundle"], "Q0E=");
        assert_eq!(patched.data["webhooks"][1]["clientConfig"]["caBundle"], "Q0E=");
    }

    #[test]
    fn test_matching_bundle_is_left_untouched() {
        let obj = mutating(Some("Q0E="));
        let mut target = ca_bundle_target(&obj).unwrap().unwrap();
        assert!(!target.patch_ca_bundle(b"CA"));
    }

    #[test]
    fn test_other_kinds_have_no_target() {
        let cm: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "x"}
        }))
        .unwrap();
        assert!(ca_bundle_target(&cm).unwrap().is_none());
    }
}
