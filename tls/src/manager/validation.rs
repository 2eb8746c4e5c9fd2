//! Peer certificate validation

use super::SslManager;
use crate::backend::CertificateUsage;
use crate::certificate::CertificateFacts;
use crate::connection::{Connection, Operation};
use crate::error::{BackendError, ErrorReason, Result, SslError};

impl SslManager {
    /// Verify the peer's certificate chain and return its subject name.
    ///
    /// An empty `expected_remote_host` means this side accepted the connection and the
    /// peer must hold a client certificate; otherwise the peer must hold a server
    /// certificate. The subject is not compared with `expected_remote_host`; see
    /// [`check_peer_hostname`](Self::check_peer_hostname).
    ///
    /// With `weakValidation` or `allowInvalidCertificates` a peer without a certificate
    /// yields an empty subject. With `allowInvalidCertificates` a chain that fails
    /// verification is logged and its subject returned.
    ///
    /// # Errors
    ///
    /// Returns `SslError::CertificateValidation` if the peer presented no certificate or
    /// the chain does not verify. The caller must not trust the connection afterwards.
    pub fn parse_and_validate_peer_certificate(
        &self,
        conn: &mut Connection,
        expected_remote_host: &str,
    ) -> Result<String> {
        conn.check_usable(Operation::Validate)
            .map_err(|e| self.validation_failure(e))?;

        let Some(chain) = conn.session().peer_certificates().filter(|c| !c.is_empty()) else {
            if self.params.weak_validation || self.params.allow_invalid_certificates {
                tracing::warn!("No SSL certificate provided by peer {}", conn.remote());
                return Ok(String::new());
            }
            return Err(self.validation_failure(BackendError::new(
                ErrorReason::NoPeerCertificate,
                format!("no SSL certificate provided by peer {}", conn.remote()),
            )));
        };

        let usage = if expected_remote_host.is_empty() {
            CertificateUsage::Client
        } else {
            CertificateUsage::Server
        };

        let facts = CertificateFacts::parse(chain[0].as_ref())
            .map_err(|e| self.validation_failure(e))?;

        if let Err(e) = self.backend.verify_chain(&chain, usage) {
            if !self.params.allow_invalid_certificates {
                tracing::debug!(
                    "Certificate {} from {} rejected: {}",
                    facts.subject_name,
                    conn.remote(),
                    e
                );
                return Err(SslError::validation_from(e));
            }
            tracing::warn!(
                "SSL peer certificate validation failed for {} ({}), allowed by configuration: {}",
                facts.subject_name,
                conn.remote(),
                e
            );
        }

        tracing::debug!(
            "Accepted {:?} certificate {} from {} (fingerprint {})",
            usage,
            facts.subject_name,
            conn.remote(),
            facts.fingerprint
        );
        conn.set_peer_subject(facts.subject_name.clone());
        Ok(facts.subject_name)
    }

    /// Check that the peer's certificate names `host`.
    ///
    /// A mismatch is logged and accepted when `allowInvalidHostnames` is set.
    ///
    /// # Errors
    ///
    /// Returns `SslError::CertificateValidation` if the peer presented no certificate or
    /// the certificate is not valid for `host`.
    pub fn check_peer_hostname(&self, conn: &Connection, host: &str) -> Result<()> {
        conn.check_usable(Operation::Validate)
            .map_err(|e| self.validation_failure(e))?;

        let Some(end_entity) = conn
            .session()
            .peer_certificates()
            .and_then(|chain| chain.into_iter().next())
        else {
            return Err(self.validation_failure(BackendError::new(
                ErrorReason::NoPeerCertificate,
                format!("no SSL certificate provided by peer {}", conn.remote()),
            )));
        };

        match self.backend.verify_hostname(&end_entity, host) {
            Ok(()) => Ok(()),
            Err(e) if self.params.allow_invalid_hostnames => {
                tracing::warn!(
                    "Peer {} is not valid for hostname '{}', allowed by configuration: {}",
                    conn.remote(),
                    host,
                    e
                );
                Ok(())
            }
            Err(e) => Err(SslError::validation_from(e)),
        }
    }

    fn validation_failure(&self, err: BackendError) -> SslError {
        self.record(&err);
        SslError::validation_from(err)
    }
}
