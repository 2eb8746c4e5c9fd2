//! Trust database: certificate authorities and revocation lists

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rustls::RootCertStore;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use webpki::{
    CertRevocationList, EndEntityCert, KeyUsage, OwnedCertRevocationList,
    RevocationOptionsBuilder, UnknownStatusPolicy,
};

use crate::backend::CertificateUsage;
use crate::error::{BackendError, ErrorReason};
use crate::params::SslParams;

#[derive(Debug)]
pub(super) struct TrustDatabase {
    roots: RootCertStore,
    crls: Vec<CertRevocationList<'static>>,
    has_ca: bool,
}

impl TrustDatabase {
    pub(super) fn load(params: &SslParams) -> Result<Self, BackendError> {
        let (roots, has_ca) = match &params.ca_file {
            Some(path) => (load_ca_file(path)?, true),
            None => (system_roots(), false),
        };
        let crls = match &params.crl_file {
            Some(path) => load_crls(path)?,
            None => Vec::new(),
        };
        tracing::debug!(
            "Trust database holds {} authorities and {} revocation lists",
            roots.len(),
            crls.len()
        );
        Ok(Self { roots, crls, has_ca })
    }

    pub(super) fn has_ca(&self) -> bool {
        self.has_ca
    }

    pub(super) fn roots(&self) -> &RootCertStore {
        &self.roots
    }

    /// Build a path from `chain[0]` to a trust anchor, checking validity now,
    /// the key usage and revocation
    pub(super) fn verify(
        &self,
        provider: &CryptoProvider,
        chain: &[CertificateDer<'static>],
        usage: CertificateUsage,
    ) -> Result<(), BackendError> {
        let Some((end_entity, intermediates)) = chain.split_first() else {
            return Err(BackendError::new(
                ErrorReason::NoPeerCertificate,
                "peer presented an empty certificate chain",
            ));
        };
        let cert = EndEntityCert::try_from(end_entity).map_err(|e| verify_error(&e))?;

        let crl_refs: Vec<&CertRevocationList<'static>> = self.crls.iter().collect();
        let revocation = RevocationOptionsBuilder::new(&crl_refs)
            .ok()
            .map(|builder| builder.with_status_policy(UnknownStatusPolicy::Allow).build());

        let key_usage = match usage {
            CertificateUsage::Client => KeyUsage::client_auth(),
            CertificateUsage::Server => KeyUsage::server_auth(),
        };

        cert.verify_for_usage(
            provider.signature_verification_algorithms.all,
            &self.roots.roots,
            intermediates,
            UnixTime::now(),
            key_usage,
            revocation,
            None,
        )
        .map(|_| ())
        .map_err(|e| verify_error(&e))
    }
}

pub(super) fn verify_hostname(
    end_entity: &CertificateDer<'static>,
    host: &str,
) -> Result<(), BackendError> {
    let name = ServerName::try_from(host).map_err(|_| {
        BackendError::new(
            ErrorReason::UnsupportedNameType,
            format!("'{host}' is neither a DNS name nor an IP address"),
        )
    })?;
    let cert = EndEntityCert::try_from(end_entity).map_err(|e| verify_error(&e))?;
    cert.verify_is_valid_for_subject_name(&name)
        .map_err(|e| verify_error(&e))
}

fn open(path: &Path) -> Result<BufReader<File>, BackendError> {
    File::open(path).map(BufReader::new).map_err(|e| {
        BackendError::new(
            ErrorReason::ReadFailed,
            format!("failed to open {}: {e}", path.display()),
        )
    })
}

fn load_ca_file(path: &Path) -> Result<RootCertStore, BackendError> {
    let mut reader = open(path)?;
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|e| {
            BackendError::new(
                ErrorReason::BadPemEncoding,
                format!("invalid PEM in {}: {e}", path.display()),
            )
        })?;
        roots.add(cert).map_err(|e| {
            BackendError::new(
                ErrorReason::BadEncoding,
                format!("unusable CA certificate in {}: {e}", path.display()),
            )
        })?;
    }
    if roots.is_empty() {
        return Err(BackendError::new(
            ErrorReason::NoStartLine,
            format!("no CA certificates found in {}", path.display()),
        ));
    }
    Ok(roots)
}

fn system_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        tracing::warn!("Failed to load a system certificate: {}", e);
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    if ignored > 0 {
        tracing::debug!("Ignored {} unparsable system certificates", ignored);
    }
    if added == 0 {
        tracing::warn!("No system trust anchors found, using bundled Mozilla roots");
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    roots
}

fn load_crls(path: &Path) -> Result<Vec<CertRevocationList<'static>>, BackendError> {
    let mut reader = open(path)?;
    let mut crls = Vec::new();
    for der in rustls_pemfile::crls(&mut reader) {
        let der = der.map_err(|e| {
            BackendError::new(
                ErrorReason::BadPemEncoding,
                format!("invalid PEM in {}: {e}", path.display()),
            )
        })?;
        let crl = OwnedCertRevocationList::from_der(der.as_ref()).map_err(|e| {
            BackendError::new(
                ErrorReason::BadCrl,
                format!("invalid revocation list in {}: {e}", path.display()),
            )
        })?;
        crls.push(CertRevocationList::from(crl));
    }
    Ok(crls)
}

fn verify_error(err: &webpki::Error) -> BackendError {
    use webpki::Error;

    let reason = match err {
        Error::CertExpired { .. } => ErrorReason::CertificateExpired,
        Error::CertNotValidYet { .. } => ErrorReason::CertificateNotYetValid,
        Error::UnknownIssuer { .. } => ErrorReason::UnknownIssuer,
        Error::CertRevoked { .. } => ErrorReason::CertificateRevoked,
        Error::RequiredEkuNotFoundContext { .. } => ErrorReason::InvalidPurpose,
        Error::InvalidSignatureForPublicKey { .. }
        | Error::UnsupportedSignatureAlgorithmContext { .. }
        | Error::UnsupportedSignatureAlgorithmForPublicKeyContext { .. } => {
            ErrorReason::BadSignature
        }
        Error::BadDer { .. } | Error::BadDerTime { .. } => ErrorReason::BadEncoding,
        Error::CertNotValidForName { .. } => ErrorReason::HostnameMismatch,
        _ => ErrorReason::CertificateVerifyError,
    };
    BackendError::new(reason, err.to_string())
}
