//! X.509 certificate facts used by the session layer
//!
//! Parsing arithmetic is delegated to `x509-cert`; this module only extracts what the
//! manager needs: the printable subject, the validity window, the key type a server
//! negotiates with and a fingerprint for log correlation.
//!
//! - `name`: distinguished name rendering
//! - `key`: public key algorithm and size

pub mod key;
pub mod name;

use std::time::Duration;

use chrono::{DateTime, Utc};
use der::Decode;
use x509_cert::Certificate as X509Certificate;

use crate::error::{BackendError, ErrorReason};

pub use key::KeyAlgorithm;

/// Facts extracted from a DER certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFacts {
    /// RFC 2253 subject
    pub subject_name: String,
    /// RFC 2253 issuer
    pub issuer_name: String,
    /// Serial number, lowercase hex
    pub serial_number: String,
    /// Start of validity
    pub not_before: DateTime<Utc>,
    /// End of validity
    pub not_after: DateTime<Utc>,
    /// Public key algorithm
    pub key_algorithm: KeyAlgorithm,
    /// Public key size in bits, when it can be determined
    pub key_size: Option<u32>,
    /// SHA-256 of the DER encoding, lowercase hex
    pub fingerprint: String,
}

impl CertificateFacts {
    /// Extract the facts from a DER certificate
    ///
    /// # Errors
    ///
    /// Returns [`ErrorReason::BadEncoding`] if the certificate does not decode.
    pub fn parse(der: &[u8]) -> Result<Self, BackendError> {
        let cert = X509Certificate::from_der(der).map_err(|e| {
            BackendError::new(
                ErrorReason::BadEncoding,
                format!("X.509 parsing failed: {e}"),
            )
        })?;
        let tbs = &cert.tbs_certificate;

        let (key_algorithm, key_size) = key::key_info(&tbs.subject_public_key_info);

        Ok(Self {
            subject_name: name::format_name(&tbs.subject),
            issuer_name: name::format_name(&tbs.issuer),
            serial_number: hex::encode(tbs.serial_number.as_bytes()),
            not_before: tbs.validity.not_before.to_system_time().into(),
            not_after: tbs.validity.not_after.to_system_time().into(),
            key_algorithm,
            key_size,
            fingerprint: fingerprint(der),
        })
    }

    /// Whether `now` lies inside the validity window
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// Still valid now but not after `window` has elapsed
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match chrono::Duration::from_std(window) {
            Ok(window) => self.is_valid_at(now) && self.not_after < now + window,
            Err(_) => self.is_valid_at(now),
        }
    }

    /// Key type as shown in handshake logs, e.g. `ECDSA P-256`
    pub fn key_exchange_type(&self) -> String {
        match self.key_size {
            Some(bits) => self.key_algorithm.label(bits),
            None => self.key_algorithm.to_string(),
        }
    }
}

fn fingerprint(der: &[u8]) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, der);
    hex::encode(digest.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    fn self_signed(common_name: &str) -> Vec<u8> {
        let mut params =
            CertificateParams::new(vec!["localhost".to_string()]).expect("certificate params");
        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, "CRYYPT");
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;
        let key_pair = KeyPair::generate().expect("key pair");
        params.self_signed(&key_pair).expect("self-signed").der().to_vec()
    }

    #[test]
    fn extracts_subject_and_validity() {
        let der = self_signed("test");
        let facts = CertificateFacts::parse(&der).expect("parse");

        assert_eq!(facts.subject_name, "CN=test,O=CRYYPT");
        assert_eq!(facts.subject_name, facts.issuer_name);
        assert!(facts.is_valid_at(Utc::now()));
        assert!(!facts.serial_number.is_empty());
        assert_eq!(facts.fingerprint.len(), 64);
    }

    #[test]
    fn reports_ecdsa_key_type() {
        let facts = CertificateFacts::parse(&self_signed("ec")).expect("parse");
        assert_eq!(facts.key_algorithm, KeyAlgorithm::Ecdsa);
        assert_eq!(facts.key_size, Some(256));
        assert_eq!(facts.key_exchange_type(), "ECDSA P-256");
    }

    #[test]
    fn expiry_window_is_relative_to_now() {
        let facts = CertificateFacts::parse(&self_signed("window")).expect("parse");
        let now = Utc::now();
        // rcgen certificates default to a validity ending in 4096
        assert!(!facts.expires_within(now, Duration::from_secs(30 * 24 * 3600)));
        assert!(!facts.is_valid_at(facts.not_after + chrono::Duration::seconds(1)));
    }

    #[test]
    fn garbage_is_an_encoding_error() {
        let err = CertificateFacts::parse(b"not a certificate").expect_err("must fail");
        assert_eq!(err.code, ErrorReason::BadEncoding.code());
    }
}
