//! rustls variant of the crypto backend
//!
//! - `session`: blocking client and server sessions
//! - `verifier`: inspection hooks that defer trust decisions
//! - `trust`: trust database, chain and hostname verification
//! - `error_queue`: per-thread error codes

mod error_queue;
mod session;
mod trust;
mod verifier;

use std::io;
use std::sync::{Arc, Once};

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, ServerConfig, ServerConnection, SupportedProtocolVersion};

use crate::backend::{BackendSession, CertificateUsage, TlsBackend};
use crate::error::{BackendError, ErrorCode, ErrorReason, SslErrorKind};
use crate::keystore::{KeyStore, LocalIdentity};
use crate::params::{SslParams, TlsProtocol};
use crate::socket::Transport;

use session::RustlsSession;
use trust::TrustDatabase;
use verifier::{DeferredClientVerifier, DeferredServerVerifier};

static GLOBAL_INIT: Once = Once::new();

/// Backend built on rustls with the `ring` provider
#[derive(Debug)]
pub struct RustlsBackend {
    provider: Arc<CryptoProvider>,
    trust: TrustDatabase,
    client_config: Arc<ClientConfig>,
    server_config: Option<Arc<ServerConfig>>,
}

impl RustlsBackend {
    fn protocol_versions(params: &SslParams) -> Vec<&'static SupportedProtocolVersion> {
        let mut versions = Vec::with_capacity(2);
        if params.protocol_enabled(TlsProtocol::Tls13) {
            versions.push(&rustls::version::TLS13);
        }
        if params.protocol_enabled(TlsProtocol::Tls12) {
            versions.push(&rustls::version::TLS12);
        }
        versions
    }

    fn build_client_config(
        provider: &Arc<CryptoProvider>,
        versions: &[&'static SupportedProtocolVersion],
        identity: Option<&LocalIdentity>,
    ) -> Result<ClientConfig, BackendError> {
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(versions)
            .map_err(|e| tls_error(&e))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DeferredServerVerifier::new(
                provider.clone(),
            )));

        match identity {
            Some(identity) => builder
                .with_client_auth_cert(identity.chain().to_vec(), identity.key().clone_key())
                .map_err(|e| tls_error(&e)),
            None => Ok(builder.with_no_client_auth()),
        }
    }

    fn build_server_config(
        provider: &Arc<CryptoProvider>,
        versions: &[&'static SupportedProtocolVersion],
        trust: &TrustDatabase,
        identity: &LocalIdentity,
    ) -> Result<ServerConfig, BackendError> {
        // System roots are not advertised; the list would only bloat the request
        let hints = if trust.has_ca() {
            trust.roots().subjects()
        } else {
            Vec::new()
        };
        let mut config = ServerConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(versions)
            .map_err(|e| tls_error(&e))?
            .with_client_cert_verifier(Arc::new(DeferredClientVerifier::new(
                provider.clone(),
                hints,
            )))
            .with_single_cert(identity.chain().to_vec(), identity.key().clone_key())
            .map_err(|e| tls_error(&e))?;
        config.ignore_client_order = true;
        Ok(config)
    }
}

impl TlsBackend for RustlsBackend {
    fn initialize_global() -> Result<(), BackendError> {
        GLOBAL_INIT.call_once(|| {
            if rustls::crypto::ring::default_provider()
                .install_default()
                .is_err()
            {
                tracing::debug!("A process-wide crypto provider was already installed");
            }
        });
        Ok(())
    }

    fn open(params: &SslParams, key_store: &KeyStore) -> Result<Self, BackendError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let versions = Self::protocol_versions(params);
        let trust = TrustDatabase::load(params)?;

        let client_config = Self::build_client_config(&provider, &versions, key_store.client())?;
        let server_config = key_store
            .server()
            .map(|identity| Self::build_server_config(&provider, &versions, &trust, identity))
            .transpose()?;

        Ok(Self {
            provider,
            trust,
            client_config: Arc::new(client_config),
            server_config: server_config.map(Arc::new),
        })
    }

    fn name(&self) -> &'static str {
        "rustls"
    }

    fn has_ca(&self) -> bool {
        self.trust.has_ca()
    }

    fn client_session(
        &self,
        transport: Transport,
        server_name: &str,
    ) -> Result<Box<dyn BackendSession>, BackendError> {
        let name = ServerName::try_from(server_name.to_string()).map_err(|_| {
            error_queue::record(BackendError::new(
                ErrorReason::UnsupportedNameType,
                format!("'{server_name}' is neither a DNS name nor an IP address"),
            ))
        })?;
        let conn = ClientConnection::new(self.client_config.clone(), name)
            .map_err(|e| error_queue::record(tls_error(&e)))?;
        Ok(Box::new(RustlsSession::client(conn, transport)))
    }

    fn server_session(&self, transport: Transport) -> Result<Box<dyn BackendSession>, BackendError> {
        let config = self.server_config.clone().ok_or_else(|| {
            error_queue::record(BackendError::new(
                ErrorReason::NoServerCertificate,
                "no server certificate is configured",
            ))
        })?;
        let conn = ServerConnection::new(config).map_err(|e| error_queue::record(tls_error(&e)))?;
        Ok(Box::new(RustlsSession::server(conn, transport)))
    }

    fn verify_chain(
        &self,
        chain: &[CertificateDer<'static>],
        usage: CertificateUsage,
    ) -> Result<(), BackendError> {
        self.trust
            .verify(&self.provider, chain, usage)
            .map_err(error_queue::record)
    }

    fn verify_hostname(
        &self,
        end_entity: &CertificateDer<'static>,
        host: &str,
    ) -> Result<(), BackendError> {
        trust::verify_hostname(end_entity, host).map_err(error_queue::record)
    }

    fn push_error(&self, err: &BackendError) {
        error_queue::push(err.code);
    }

    fn get_error(&self) -> ErrorCode {
        error_queue::pop()
    }

    fn peek_error(&self) -> ErrorCode {
        error_queue::peek()
    }

    fn cleanup_thread_locals(&self) {
        error_queue::clear();
    }
}

/// Classify a rustls protocol failure
pub(super) fn tls_error(err: &rustls::Error) -> BackendError {
    use rustls::Error;

    let reason = match err {
        Error::InappropriateMessage { .. } => ErrorReason::UnexpectedMessage,
        Error::InappropriateHandshakeMessage { .. } => ErrorReason::UnexpectedHandshakeMessage,
        Error::InvalidMessage(_) => ErrorReason::InvalidMessage,
        Error::NoCertificatesPresented => ErrorReason::NoCertificatesPresented,
        Error::UnsupportedNameType => ErrorReason::UnsupportedNameType,
        Error::DecryptError => ErrorReason::DecryptFailed,
        Error::EncryptError => ErrorReason::EncryptFailed,
        Error::PeerIncompatible(_) => ErrorReason::PeerIncompatible,
        Error::PeerMisbehaved(_) => ErrorReason::PeerMisbehaved,
        Error::AlertReceived(_) => ErrorReason::AlertReceived,
        Error::InvalidCertificate(_) | Error::InvalidCertRevocationList(_) => {
            ErrorReason::CertificateVerifyFailed
        }
        Error::HandshakeNotComplete => ErrorReason::HandshakeNotComplete,
        Error::PeerSentOversizedRecord => ErrorReason::RecordTooLarge,
        Error::NoApplicationProtocol => ErrorReason::NoApplicationProtocol,
        Error::InconsistentKeys(_) => ErrorReason::KeyMismatch,
        _ => ErrorReason::UnknownSslError,
    };
    BackendError::new(reason, err.to_string())
}

/// Classify a failure surfaced through the `io::Read`/`io::Write` adapters.
/// Protocol failures travel inside `InvalidData` errors.
pub(super) fn io_error(err: &io::Error, writing: bool) -> BackendError {
    if let Some(inner) = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    {
        return tls_error(inner);
    }
    BackendError::new(ErrorReason::from_io(err), err.to_string())
        .with_kind(SslErrorKind::from_io(err, writing))
}
