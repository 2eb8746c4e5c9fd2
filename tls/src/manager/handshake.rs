//! Client and server handshakes

use super::SslManager;
use crate::connection::{Connection, Role};
use crate::error::{BackendError, ErrorReason, Result, SslError};
use crate::keystore::KeyStore;
use crate::socket::Socket;

impl SslManager {
    /// Run a client handshake over an already-connected socket.
    ///
    /// The server's certificate is not judged here; call
    /// [`parse_and_validate_peer_certificate`](Self::parse_and_validate_peer_certificate)
    /// before trusting the channel. The client identity, if configured, is presented
    /// when the server asks for one.
    ///
    /// # Errors
    ///
    /// Returns `SslError::Connect` if the session cannot be set up or the handshake
    /// fails. No connection is returned in that case and the socket is closed.
    pub fn connect(&self, socket: Socket) -> Result<Connection> {
        let remote = socket.remote().to_string();
        let server_name = socket.remote_host().to_string();

        if let Some(identity) = self.key_store.client() {
            tracing::debug!(
                "Offering client certificate {} to {}",
                identity.subject_name(),
                remote
            );
        }

        let session = self
            .backend
            .client_session(socket.into_transport(&[]), &server_name)
            .map_err(|e| SslError::connect_from(&remote, e))?;
        self.finish_handshake(Connection::new(session, Role::Client))
    }

    /// Run a server handshake over an accepted socket.
    ///
    /// `initial_bytes` are bytes the transport already read while sniffing for TLS; the
    /// backend sees them before anything still on the socket. A client certificate is
    /// requested but its absence only surfaces at validation time.
    ///
    /// # Errors
    ///
    /// Returns `SslError::Connect` if no server certificate is loaded, the session cannot
    /// be set up, or the handshake fails.
    pub fn accept(&self, socket: Socket, initial_bytes: &[u8]) -> Result<Connection> {
        let remote = socket.remote().to_string();

        let identity = self.key_store.find(KeyStore::SERVER_SLOT).ok_or_else(|| {
            let err = BackendError::new(
                ErrorReason::NoServerCertificate,
                format!("key store has no '{}' slot", KeyStore::SERVER_SLOT),
            );
            self.record(&err);
            SslError::connect_from(&remote, err)
        })?;
        tracing::debug!(
            "Accepting TLS from {} as {} ({})",
            remote,
            identity.subject_name(),
            identity.facts().key_exchange_type()
        );

        let session = self
            .backend
            .server_session(socket.into_transport(initial_bytes))
            .map_err(|e| SslError::connect_from(&remote, e))?;
        self.finish_handshake(Connection::new(session, Role::Server))
    }

    fn finish_handshake(&self, mut conn: Connection) -> Result<Connection> {
        if let Err(e) = conn.handshake() {
            tracing::debug!(
                "{:?} handshake with {} failed: {}",
                conn.role(),
                conn.remote(),
                e
            );
            // Dropping the half-built connection releases the session and the socket
            return Err(SslError::connect_from(conn.remote(), e));
        }

        let info = conn.session_info();
        tracing::debug!(
            "{:?} handshake with {} complete: {} {}",
            conn.role(),
            conn.remote(),
            info.protocol.as_deref().unwrap_or("unknown protocol"),
            info.cipher_suite.as_deref().unwrap_or("unknown cipher suite")
        );
        Ok(conn)
    }
}
