//! One TLS session handed to the caller by the manager
//!
//! A [`Connection`] only exists once its handshake has finished. All operations on it go
//! through [`SslManager`](crate::SslManager); the connection itself tracks its state,
//! the classification of its last I/O call and the subject of the last validated peer
//! certificate. Dropping it releases the backend session and closes the socket.

use std::fmt;

use crate::backend::{BackendSession, SessionInfo};
use crate::error::{BackendError, ErrorReason, SslErrorKind};

/// Lifecycle of a connection
///
/// `Created -> Handshaking -> Established -> (ShutdownRequested) -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket wrapped, no handshake bytes exchanged
    Created,
    /// Handshake in progress
    Handshaking,
    /// Handshake finished; reads and writes are allowed
    Established,
    /// Close-notify sent, waiting for the peer's
    ShutdownRequested,
    /// Session finished or failed; only freeing remains
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Handshaking => "handshaking",
            Self::Established => "established",
            Self::ShutdownRequested => "shutdown requested",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Which end of the handshake this node played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Initiated the handshake
    Client,
    /// Accepted the handshake
    Server,
}

/// Operations gated by the connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Read,
    Write,
    Shutdown,
    Validate,
}

/// An established TLS session, exclusively owned by the caller
pub struct Connection {
    session: Box<dyn BackendSession>,
    role: Role,
    remote: String,
    state: ConnectionState,
    info: SessionInfo,
    last_error: SslErrorKind,
    peer_subject: Option<String>,
}

impl Connection {
    pub(crate) fn new(session: Box<dyn BackendSession>, role: Role) -> Self {
        let remote = session.remote().to_string();
        Self {
            session,
            role,
            remote,
            state: ConnectionState::Created,
            info: SessionInfo::default(),
            last_error: SslErrorKind::None,
            peer_subject: None,
        }
    }

    /// Run the handshake; the connection is `Established` on success and `Closed` otherwise
    pub(crate) fn handshake(&mut self) -> Result<(), BackendError> {
        self.state = ConnectionState::Handshaking;
        match self.session.force_handshake() {
            Ok(info) => {
                self.info = info;
                self.state = ConnectionState::Established;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Closed;
                self.last_error = e.kind;
                Err(e)
            }
        }
    }

    pub(crate) fn check_usable(&self, operation: Operation) -> Result<(), BackendError> {
        let allowed = match (self.state, operation) {
            (ConnectionState::Established, _) => true,
            (ConnectionState::ShutdownRequested, Operation::Read | Operation::Shutdown) => true,
            _ => false,
        };
        if allowed {
            return Ok(());
        }
        let reason = match self.state {
            ConnectionState::Created | ConnectionState::Handshaking => {
                ErrorReason::HandshakeNotComplete
            }
            _ => ErrorReason::ConnectionClosed,
        };
        Err(BackendError::new(
            reason,
            format!(
                "{operation:?} is not permitted on a {} connection to {}",
                self.state, self.remote
            ),
        ))
    }

    pub(crate) fn session_mut(&mut self) -> &mut dyn BackendSession {
        self.session.as_mut()
    }

    pub(crate) fn session(&self) -> &dyn BackendSession {
        self.session.as_ref()
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    /// Remember how the last I/O call ended; fatal kinds close the connection
    pub(crate) fn set_last_error(&mut self, kind: SslErrorKind) {
        self.last_error = kind;
        if matches!(kind, SslErrorKind::Ssl | SslErrorKind::Syscall) {
            self.state = ConnectionState::Closed;
        }
    }

    pub(crate) fn set_peer_subject(&mut self, subject: String) {
        self.peer_subject = Some(subject);
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether this end connected or accepted
    pub fn role(&self) -> Role {
        self.role
    }

    /// Remote endpoint as reported by the transport
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Protocol version and cipher suite negotiated by the handshake
    pub fn session_info(&self) -> &SessionInfo {
        &self.info
    }

    /// Classification of the last I/O call
    pub fn last_error(&self) -> SslErrorKind {
        self.last_error
    }

    /// Subject returned by the last successful peer validation
    pub fn peer_subject_name(&self) -> Option<&str> {
        self.peer_subject.as_deref()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("remote", &self.remote)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .field("peer_subject", &self.peer_subject)
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        tracing::trace!(
            "Releasing {:?} connection to {} ({})",
            self.role,
            self.remote,
            self.state
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ShutdownStatus;
    use rustls::pki_types::CertificateDer;

    #[derive(Debug)]
    struct ScriptedSession {
        handshake_ok: bool,
    }

    impl BackendSession for ScriptedSession {
        fn remote(&self) -> &str {
            "10.0.0.1:27017"
        }

        fn force_handshake(&mut self) -> Result<SessionInfo, BackendError> {
            if self.handshake_ok {
                Ok(SessionInfo {
                    protocol: Some("TLSv1_3".to_string()),
                    cipher_suite: None,
                })
            } else {
                Err(BackendError::new(ErrorReason::AlertReceived, "handshake failure"))
            }
        }

        fn read(&mut self, _buf: &mut [u8]) -> Result<usize, BackendError> {
            Ok(0)
        }

        fn write(&mut self, buf: &[u8]) -> Result<usize, BackendError> {
            Ok(buf.len())
        }

        fn shutdown(&mut self) -> Result<ShutdownStatus, BackendError> {
            Ok(ShutdownStatus::Sent)
        }

        fn peer_certificates(&self) -> Option<Vec<CertificateDer<'static>>> {
            None
        }
    }

    fn connection(handshake_ok: bool) -> Connection {
        Connection::new(Box::new(ScriptedSession { handshake_ok }), Role::Client)
    }

    #[test]
    fn new_connections_refuse_io() {
        let conn = connection(true);
        assert_eq!(conn.state(), ConnectionState::Created);
        let err = conn.check_usable(Operation::Read).expect_err("must refuse");
        assert_eq!(err.code, ErrorReason::HandshakeNotComplete.code());
    }

    #[test]
    fn handshake_establishes_or_closes() {
        let mut ok = connection(true);
        ok.handshake().expect("handshake");
        assert_eq!(ok.state(), ConnectionState::Established);
        assert_eq!(ok.session_info().protocol.as_deref(), Some("TLSv1_3"));
        assert_eq!(ok.remote(), "10.0.0.1:27017");

        let mut failed = connection(false);
        assert!(failed.handshake().is_err());
        assert_eq!(failed.state(), ConnectionState::Closed);
        assert_eq!(failed.last_error(), SslErrorKind::Ssl);
    }

    #[test]
    fn shutdown_requested_allows_reads_only() {
        let mut conn = connection(true);
        conn.handshake().expect("handshake");
        conn.set_state(ConnectionState::ShutdownRequested);

        assert!(conn.check_usable(Operation::Read).is_ok());
        assert!(conn.check_usable(Operation::Shutdown).is_ok());
        assert!(conn.check_usable(Operation::Write).is_err());
        assert!(conn.check_usable(Operation::Validate).is_err());
    }

    #[test]
    fn fatal_errors_close_the_connection() {
        let mut conn = connection(true);
        conn.handshake().expect("handshake");

        conn.set_last_error(SslErrorKind::WantRead);
        assert_eq!(conn.state(), ConnectionState::Established);

        conn.set_last_error(SslErrorKind::Syscall);
        assert_eq!(conn.state(), ConnectionState::Closed);
        let err = conn.check_usable(Operation::Write).expect_err("closed");
        assert_eq!(err.code, ErrorReason::ConnectionClosed.code());
    }
}
