//! I/O forwarding, shutdown and destruction

use super::SslManager;
use crate::backend::ShutdownStatus;
use crate::connection::{Connection, ConnectionState, Operation};
use crate::error::{BackendError, Result, SslError, SslErrorKind};

impl SslManager {
    /// Read decrypted bytes into `buf`, blocking as the socket does.
    ///
    /// Returns the backend's byte count unchanged; `Ok(0)` for a non-empty `buf` means
    /// the peer sent close-notify and [`ssl_get_error`](Self::ssl_get_error) reports
    /// `ZeroReturn`.
    ///
    /// # Errors
    ///
    /// Returns `SslError::Io` if the connection is closed or the backend read fails.
    pub fn ssl_read(&self, conn: &mut Connection, buf: &mut [u8]) -> Result<usize> {
        self.guard(conn, Operation::Read)?;
        match conn.session_mut().read(buf) {
            Ok(0) if !buf.is_empty() => {
                conn.set_last_error(SslErrorKind::ZeroReturn);
                Ok(0)
            }
            Ok(n) => {
                conn.set_last_error(SslErrorKind::None);
                Ok(n)
            }
            Err(e) => Err(self.io_failure(conn, e)),
        }
    }

    /// Write plaintext from `buf`; the count may be less than `buf.len()`.
    ///
    /// # Errors
    ///
    /// Returns `SslError::Io` if the connection is closed or shutting down, or the
    /// backend write fails.
    pub fn ssl_write(&self, conn: &mut Connection, buf: &[u8]) -> Result<usize> {
        self.guard(conn, Operation::Write)?;
        match conn.session_mut().write(buf) {
            Ok(n) => {
                conn.set_last_error(SslErrorKind::None);
                Ok(n)
            }
            Err(e) => Err(self.io_failure(conn, e)),
        }
    }

    /// Send close-notify. A second call waits for the peer's.
    ///
    /// The connection stays owned by the caller; dropping it is still required and is
    /// safe whether or not this succeeded.
    ///
    /// # Errors
    ///
    /// Returns `SslError::Io` if the connection is closed or the alert cannot be sent.
    pub fn ssl_shutdown(&self, conn: &mut Connection) -> Result<ShutdownStatus> {
        self.guard(conn, Operation::Shutdown)?;
        conn.set_state(ConnectionState::ShutdownRequested);
        match conn.session_mut().shutdown() {
            Ok(status) => {
                conn.set_last_error(SslErrorKind::None);
                if status == ShutdownStatus::Complete {
                    conn.set_state(ConnectionState::Closed);
                }
                tracing::debug!("Shutdown of {} {:?}", conn.remote(), status);
                Ok(status)
            }
            Err(e) => Err(self.io_failure(conn, e)),
        }
    }

    /// Destroy a connection explicitly; equivalent to dropping it
    pub fn ssl_free(&self, conn: Connection) {
        tracing::debug!("Freeing connection to {} ({})", conn.remote(), conn.state());
        drop(conn);
    }

    fn guard(&self, conn: &Connection, operation: Operation) -> Result<()> {
        conn.check_usable(operation).map_err(|e| {
            self.record(&e);
            SslError::io_from(e)
        })
    }

    fn io_failure(&self, conn: &mut Connection, err: BackendError) -> SslError {
        conn.set_last_error(err.kind);
        if err.kind != SslErrorKind::WantRead && err.kind != SslErrorKind::WantWrite {
            tracing::debug!("SSL I/O with {} failed ({}): {}", conn.remote(), err.kind, err);
        }
        SslError::io_from(err)
    }
}
