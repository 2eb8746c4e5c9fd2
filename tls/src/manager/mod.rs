//! Session-layer entry point
//!
//! [`SslManager`] owns the configuration snapshot, the key store and the backend. It
//! creates [`Connection`](crate::Connection)s by running handshakes, validates peer
//! certificates and forwards I/O. Construction happens once per process; afterwards the
//! manager is read-only and shared freely between threads.
//!
//! - `handshake`: `connect` and `accept`
//! - `validation`: peer certificate and hostname checks
//! - `io`: read, write, shutdown and destruction

mod handshake;
mod io;
mod validation;

use crate::backend::{RustlsBackend, TlsBackend};
use crate::configuration::SslConfiguration;
use crate::connection::Connection;
use crate::error::{BackendError, ErrorCode, Result, SslError, SslErrorKind};
use crate::keystore::{KeyStore, PasswordCallback};
use crate::params::SslParams;

/// The single entry point to the TLS session layer
#[derive(Debug)]
pub struct SslManager {
    backend: Box<dyn TlsBackend>,
    params: SslParams,
    key_store: KeyStore,
    configuration: SslConfiguration,
    is_server: bool,
}

impl SslManager {
    /// Create a manager on the rustls backend, forwarding the configured passwords to
    /// encrypted keys
    ///
    /// # Errors
    ///
    /// Returns `SslError::Initialization` if:
    /// - SSL is disabled or the parameters are inconsistent
    /// - A key store or the trust database cannot be loaded
    /// - A local certificate is expired or not yet valid
    pub fn create(params: SslParams, is_server: bool) -> Result<Self> {
        Self::create_with::<RustlsBackend>(params, is_server, None)
    }

    /// Create a manager on backend `B`, unlocking encrypted keys through
    /// `password_callback` when one is registered
    ///
    /// # Errors
    ///
    /// Returns `SslError::Initialization` under the same conditions as [`Self::create`].
    pub fn create_with<B: TlsBackend + 'static>(
        params: SslParams,
        is_server: bool,
        password_callback: Option<&PasswordCallback<'_>>,
    ) -> Result<Self> {
        if !params.ssl_mode.is_enabled() {
            return Err(SslError::initialization(
                "no SSL manager is created when sslMode is disabled",
            ));
        }
        params.validate(is_server)?;

        B::initialize_global()
            .map_err(|e| SslError::initialization_from("backend initialization failed", e))?;

        let key_store = match password_callback {
            Some(callback) => KeyStore::open_with(&params, is_server, callback),
            None => KeyStore::open(&params, is_server),
        }
        .map_err(|e| SslError::initialization_from("failed to load key store", e))?;

        let backend = B::open(&params, &key_store)
            .map_err(|e| SslError::initialization_from("failed to configure backend", e))?;

        let configuration = Self::snapshot(&key_store, backend.has_ca());
        tracing::info!(
            "SSL manager ready: backend={}, mode={}, server={}, subject='{}', CA configured={}",
            backend.name(),
            params.ssl_mode,
            is_server,
            configuration.server_subject_name,
            configuration.has_ca
        );

        Ok(Self {
            backend: Box::new(backend),
            params,
            key_store,
            configuration,
            is_server,
        })
    }

    fn snapshot(key_store: &KeyStore, has_ca: bool) -> SslConfiguration {
        let (server_subject, expiration) = key_store
            .server()
            .map(|identity| (identity.subject_name().to_string(), identity.facts().not_after))
            .unwrap_or_default();
        let client_subject = key_store
            .client()
            .map(|identity| identity.subject_name().to_string())
            .unwrap_or_default();
        SslConfiguration::new(server_subject, client_subject, expiration, has_ca)
    }

    /// Facts about this node's identity, frozen at creation
    pub fn ssl_configuration(&self) -> &SslConfiguration {
        &self.configuration
    }

    /// Parameters the manager was created with
    pub fn params(&self) -> &SslParams {
        &self.params
    }

    /// Identities loaded at creation
    pub fn key_store(&self) -> &KeyStore {
        &self.key_store
    }

    /// Whether this manager was created to accept connections
    pub fn is_server(&self) -> bool {
        self.is_server
    }

    /// Name of the crypto backend in use
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Classification of the last I/O call on `conn`, in the `SSL_get_error` shape
    pub fn ssl_get_error(&self, conn: &Connection) -> SslErrorKind {
        conn.last_error()
    }

    /// Pop the oldest error code from the calling thread's queue
    pub fn err_get_error(&self) -> ErrorCode {
        self.backend.get_error()
    }

    /// Read the oldest error code from the calling thread's queue without removing it
    pub fn err_peek_error(&self) -> ErrorCode {
        self.backend.peek_error()
    }

    /// Render `code` as `error:XXXXXXXX:library:reason`
    pub fn err_error_string(&self, code: ErrorCode) -> String {
        self.backend.error_string(code)
    }

    /// Human-readable text for an error code, without a manager instance
    pub fn get_error_message(code: ErrorCode) -> String {
        code.error_string()
    }

    /// Release the calling thread's backend error state.
    ///
    /// Threads that used the session layer call this before exiting. It is safe to call
    /// repeatedly and from threads that never handled a connection.
    pub fn cleanup_thread_locals(&self) {
        self.backend.cleanup_thread_locals();
    }

    /// Queue a manager-level failure alongside the backend's own
    fn record(&self, err: &BackendError) {
        self.backend.push_error(err);
    }
}
