//! # X.509 Material
//!
//! Generation and inspection of the webhook CA and leaf certificates.
//!
//! Certificates and keys are exchanged as PEM bytes, the form in which they
//! are stored in the cluster Secrets. Private keys are held in [`Zeroizing`]
//! buffers and wiped on drop.

use super::CertificateError;
use chrono::{DateTime, TimeDelta, Utc};
use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use std::fmt;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;
use zeroize::Zeroizing;

const CA_COMMON_NAME: &str = "btp-manager-webhook-ca";
const ORGANIZATION: &str = "kyma-project";

/// A certificate and its private key, both PEM encoded
#[derive(Clone)]
pub struct CertificateMaterial {
    pub certificate: Vec<u8>,
    pub private_key: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("certificate_len", &self.certificate.len())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

fn to_offset_date_time(at: DateTime<Utc>) -> Result<::time::OffsetDateTime, CertificateError> {
    ::time::OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| CertificateError::Generation(format!("invalid validity bound {at}: {e}")))
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, DnValue::Utf8String(common_name.to_string()));
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String(ORGANIZATION.to_string()),
    );
    dn
}

/// Generate a self-signed CA valid from now until `not_after`
pub fn generate_self_signed_ca(
    not_after: DateTime<Utc>,
) -> Result<CertificateMaterial, CertificateError> {
    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(CA_COMMON_NAME);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params.not_before = to_offset_date_time(Utc::now())?;
    params.not_after = to_offset_date_time(not_after)?;

    let key_pair = KeyPair::generate()
        .map_err(|e| CertificateError::Generation(format!("failed to generate CA key: {e}")))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CertificateError::Generation(format!("failed to self-sign CA: {e}")))?;

    Ok(CertificateMaterial {
        certificate: cert.pem().into_bytes(),
        private_key: Zeroizing::new(key_pair.serialize_pem().into_bytes()),
    })
}

/// Generate a server certificate for `dns_names`, signed by the given CA
pub fn generate_signed_cert(
    not_after: DateTime<Utc>,
    ca_certificate: &[u8],
    ca_private_key: &[u8],
    dns_names: &[String],
) -> Result<CertificateMaterial, CertificateError> {
    let ca_cert_pem = std::str::from_utf8(ca_certificate)
        .map_err(|e| CertificateError::Parse(format!("CA certificate is not valid PEM: {e}")))?;
    let ca_key_pem = Zeroizing::new(
        std::str::from_utf8(ca_private_key)
            .map_err(|e| CertificateError::Parse(format!("CA key is not valid PEM: {e}")))?
            .to_string(),
    );
    let ca_key = KeyPair::from_pem(&ca_key_pem)
        .map_err(|e| CertificateError::Parse(format!("failed to load CA key: {e}")))?;
    let issuer = Issuer::from_ca_cert_pem(ca_cert_pem, &ca_key)
        .map_err(|e| CertificateError::Parse(format!("failed to create issuer: {e}")))?;

    let mut params = CertificateParams::default();
    params.distinguished_name =
        distinguished_name(dns_names.first().map_or("webhook", String::as_str));
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.not_before = to_offset_date_time(Utc::now())?;
    params.not_after = to_offset_date_time(not_after)?;
    params.subject_alt_names = dns_names
        .iter()
        .map(|name| {
            Ia5String::try_from(name.as_str())
                .map(SanType::DnsName)
                .map_err(|e| CertificateError::Generation(format!("invalid DNS name {name}: {e}")))
        })
        .collect::<Result<_, _>>()?;

    let key_pair = KeyPair::generate()
        .map_err(|e| CertificateError::Generation(format!("failed to generate key: {e}")))?;
    let cert = params
        .signed_by(&key_pair, &issuer)
        .map_err(|e| CertificateError::Generation(format!("failed to sign certificate: {e}")))?;

    Ok(CertificateMaterial {
        certificate: cert.pem().into_bytes(),
        private_key: Zeroizing::new(key_pair.serialize_pem().into_bytes()),
    })
}

fn certificate_der(pem_bytes: &[u8]) -> Result<Vec<u8>, CertificateError> {
    let parsed = ::pem::parse(pem_bytes)
        .map_err(|e| CertificateError::Parse(format!("failed to decode PEM: {e}")))?;
    Ok(parsed.contents().to_vec())
}

/// Whether `certificate` was signed by `ca_certificate`'s key
///
/// Parse failures are errors; a well-formed certificate with a foreign
/// signature yields `Ok(false)`.
pub fn is_signed_by(ca_certificate: &[u8], certificate: &[u8]) -> Result<bool, CertificateError> {
    let ca_der = certificate_der(ca_certificate)?;
    let cert_der = certificate_der(certificate)?;
    let (_, ca) = X509Certificate::from_der(&ca_der)
        .map_err(|e| CertificateError::Parse(format!("failed to parse CA certificate: {e}")))?;
    let (_, cert) = X509Certificate::from_der(&cert_der)
        .map_err(|e| CertificateError::Parse(format!("failed to parse certificate: {e}")))?;

    Ok(cert.verify_signature(Some(ca.public_key())).is_ok())
}

/// NotAfter of a PEM certificate
pub fn not_after(certificate: &[u8]) -> Result<DateTime<Utc>, CertificateError> {
    let der = certificate_der(certificate)?;
    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| CertificateError::Parse(format!("failed to parse certificate: {e}")))?;
    let timestamp = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| CertificateError::Parse(format!("NotAfter out of range: {timestamp}")))
}

/// A certificate expires soon once `now > NotAfter + boundary`
///
/// `boundary` is normally negative so the check fires shortly before NotAfter.
pub fn expires_soon(
    certificate: &[u8],
    boundary: TimeDelta,
    now: DateTime<Utc>,
) -> Result<bool, CertificateError> {
    Ok(now > not_after(certificate)? + boundary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sans() -> Vec<String> {
        vec![
            "sap-btp-operator-webhook-service.kyma-system.svc".to_string(),
            "sap-btp-operator-webhook-service.kyma-system.svc.cluster.local".to_string(),
        ]
    }

    #[test]
    fn test_leaf_verifies_against_its_ca() {
        let ca = generate_self_signed_ca(Utc::now() + TimeDelta::hours(1)).unwrap();
        let leaf = generate_signed_cert(
            Utc::now() + TimeDelta::minutes(5),
            &ca.certificate,
            &ca.private_key,
            &sans(),
        )
        .unwrap();

        assert!(is_signed_by(&ca.certificate, &leaf.certificate).unwrap());
    }

    #[test]
    fn test_leaf_does_not_verify_against_foreign_ca() {
        let ca = generate_self_signed_ca(Utc::now() + TimeDelta::hours(1)).unwrap();
        let other = generate_self_signed_ca(Utc::now() + TimeDelta::hours(1)).unwrap();
        let leaf = generate_signed_cert(
            Utc::now() + TimeDelta::minutes(5),
            &ca.certificate,
            &ca.private_key,
            &sans(),
        )
        .unwrap();

        assert!(!is_signed_by(&other.certificate, &leaf.certificate).unwrap());
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let ca = generate_self_signed_ca(Utc::now() + TimeDelta::hours(1)).unwrap();
        assert!(matches!(
            is_signed_by(&ca.certificate, b"not a certificate"),
            Err(CertificateError::Parse(_))
        ));
    }

    #[test]
    fn test_expires_soon_honours_boundary() {
        let expiry = Utc::now() + TimeDelta::hours(1);
        let ca = generate_self_signed_ca(expiry).unwrap();
        let boundary = TimeDelta::seconds(-5);

        assert!(!expires_soon(&ca.certificate, boundary, Utc::now()).unwrap());
        // Inside the boundary window, before NotAfter
        assert!(expires_soon(&ca.certificate, boundary, expiry - TimeDelta::seconds(2)).unwrap());
        assert!(expires_soon(&ca.certificate, boundary, expiry + TimeDelta::minutes(1)).unwrap());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let ca = generate_self_signed_ca(Utc::now() + TimeDelta::hours(1)).unwrap();
        let rendered = format!("{ca:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("PRIVATE KEY"));
    }
}
