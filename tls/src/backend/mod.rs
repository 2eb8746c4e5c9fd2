//! Crypto backend capability interface
//!
//! The manager talks to the TLS library only through [`TlsBackend`] and
//! [`BackendSession`]. A backend owns its process-wide state, the trust database and the
//! per-thread error queue; a session owns one imported transport and its handshake state.
//!
//! - `rustls_backend`: the default variant built on rustls and rustls-webpki

pub mod rustls_backend;

use std::fmt;

use rustls::pki_types::CertificateDer;

use crate::error::{BackendError, ErrorCode};
use crate::keystore::KeyStore;
use crate::params::SslParams;
use crate::socket::Transport;

pub use rustls_backend::RustlsBackend;

/// Which side of a connection a peer certificate must be valid for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateUsage {
    /// The peer is a client authenticating to this server
    Client,
    /// The peer is a server this node connected to
    Server,
}

/// Outcome of a close-notify request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStatus {
    /// Our close-notify went out; the peer's has not arrived yet
    Sent,
    /// Both sides have sent close-notify
    Complete,
}

/// Parameters negotiated by a finished handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// Negotiated protocol version, e.g. `TLSv1_3`
    pub protocol: Option<String>,
    /// Negotiated cipher suite
    pub cipher_suite: Option<String>,
}

/// A crypto library able to run the session layer
pub trait TlsBackend: Send + Sync + fmt::Debug {
    /// One-time process-wide setup; later calls are no-ops
    fn initialize_global() -> Result<(), BackendError>
    where
        Self: Sized;

    /// Open the trust database and bind the identities held in `key_store`
    fn open(params: &SslParams, key_store: &KeyStore) -> Result<Self, BackendError>
    where
        Self: Sized;

    /// Short backend name for status reports
    fn name(&self) -> &'static str;

    /// Whether the trust database came from a configured CA file
    fn has_ca(&self) -> bool;

    /// Import a connected transport as the client end of a session.
    ///
    /// The session never rejects the server's certificate during the handshake.
    fn client_session(
        &self,
        transport: Transport,
        server_name: &str,
    ) -> Result<Box<dyn BackendSession>, BackendError>;

    /// Import an accepted transport as the server end of a session, requesting but not
    /// requiring a client certificate
    fn server_session(&self, transport: Transport) -> Result<Box<dyn BackendSession>, BackendError>;

    /// Verify a peer chain (leaf first) against the trust database as of now
    fn verify_chain(
        &self,
        chain: &[CertificateDer<'static>],
        usage: CertificateUsage,
    ) -> Result<(), BackendError>;

    /// Check that `end_entity` names `host`
    fn verify_hostname(
        &self,
        end_entity: &CertificateDer<'static>,
        host: &str,
    ) -> Result<(), BackendError>;

    /// Append a failure to the calling thread's error queue
    fn push_error(&self, err: &BackendError);

    /// Pop the oldest queued error code; [`ErrorCode::NONE`] when the queue is empty
    fn get_error(&self) -> ErrorCode;

    /// Read the oldest queued error code without removing it
    fn peek_error(&self) -> ErrorCode;

    /// Render `code` as `error:XXXXXXXX:library:reason`
    fn error_string(&self, code: ErrorCode) -> String {
        code.error_string()
    }

    /// Release the calling thread's error state; safe to repeat
    fn cleanup_thread_locals(&self);
}

/// One TLS session over an imported transport
pub trait BackendSession: Send + fmt::Debug {
    /// Remote endpoint of the underlying transport
    fn remote(&self) -> &str;

    /// Drive the handshake to completion, blocking the calling thread
    fn force_handshake(&mut self) -> Result<SessionInfo, BackendError>;

    /// Decrypted bytes into `buf`; `Ok(0)` for a non-empty `buf` means the peer sent
    /// close-notify
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BackendError>;

    /// Plaintext bytes accepted from `buf`, possibly fewer than offered
    fn write(&mut self, buf: &[u8]) -> Result<usize, BackendError>;

    /// Send close-notify, or on a repeated call wait for the peer's
    fn shutdown(&mut self) -> Result<ShutdownStatus, BackendError>;

    /// Chain presented by the peer, leaf first
    fn peer_certificates(&self) -> Option<Vec<CertificateDer<'static>>>;
}
