//! Blocking rustls session over an imported transport

use std::io::{Read, Write};

use rustls::pki_types::CertificateDer;
use rustls::{ClientConnection, ServerConnection, StreamOwned};

use super::{error_queue, io_error, tls_error};
use crate::backend::{BackendSession, SessionInfo, ShutdownStatus};
use crate::error::BackendError;
use crate::socket::Transport;

#[derive(Debug)]
enum Stream {
    Client(StreamOwned<ClientConnection, Transport>),
    Server(StreamOwned<ServerConnection, Transport>),
}

/// Runs `$body` with `$stream` bound to whichever side this session is
macro_rules! with_stream {
    ($stream_enum:expr, $stream:ident => $body:expr) => {
        match $stream_enum {
            Stream::Client($stream) => $body,
            Stream::Server($stream) => $body,
        }
    };
}

#[derive(Debug)]
pub(super) struct RustlsSession {
    stream: Stream,
    close_notify_sent: bool,
}

impl RustlsSession {
    pub(super) fn client(conn: ClientConnection, transport: Transport) -> Self {
        Self {
            stream: Stream::Client(StreamOwned::new(conn, transport)),
            close_notify_sent: false,
        }
    }

    pub(super) fn server(conn: ServerConnection, transport: Transport) -> Self {
        Self {
            stream: Stream::Server(StreamOwned::new(conn, transport)),
            close_notify_sent: false,
        }
    }
}

impl BackendSession for RustlsSession {
    fn remote(&self) -> &str {
        with_stream!(&self.stream, s => s.sock.remote())
    }

    fn force_handshake(&mut self) -> Result<SessionInfo, BackendError> {
        with_stream!(&mut self.stream, s => {
            while s.conn.is_handshaking() {
                s.conn
                    .complete_io(&mut s.sock)
                    .map_err(|e| error_queue::record(io_error(&e, false)))?;
            }
            // Flush whatever the final flight left behind, e.g. session tickets
            while s.conn.wants_write() {
                s.conn
                    .write_tls(&mut s.sock)
                    .map_err(|e| error_queue::record(io_error(&e, true)))?;
            }
            Ok(SessionInfo {
                protocol: s.conn.protocol_version().map(|v| format!("{v:?}")),
                cipher_suite: s
                    .conn
                    .negotiated_cipher_suite()
                    .map(|suite| format!("{:?}", suite.suite())),
            })
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BackendError> {
        with_stream!(&mut self.stream, s => s.read(buf))
            .map_err(|e| error_queue::record(io_error(&e, false)))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, BackendError> {
        with_stream!(&mut self.stream, s => s.write(buf))
            .map_err(|e| error_queue::record(io_error(&e, true)))
    }

    fn shutdown(&mut self) -> Result<ShutdownStatus, BackendError> {
        let first_call = !self.close_notify_sent;
        self.close_notify_sent = true;

        with_stream!(&mut self.stream, s => {
            if first_call {
                s.conn.send_close_notify();
                s.flush()
                    .map_err(|e| error_queue::record(io_error(&e, true)))?;
            } else if !s.conn.is_handshaking() {
                // Wait for the peer's close-notify; end of stream counts as closed
                let read = s
                    .conn
                    .read_tls(&mut s.sock)
                    .map_err(|e| error_queue::record(io_error(&e, false)))?;
                if read == 0 {
                    return Ok(ShutdownStatus::Complete);
                }
            }
            let state = s
                .conn
                .process_new_packets()
                .map_err(|e| error_queue::record(tls_error(&e)))?;
            if state.peer_has_closed() {
                Ok(ShutdownStatus::Complete)
            } else {
                Ok(ShutdownStatus::Sent)
            }
        })
    }

    fn peer_certificates(&self) -> Option<Vec<CertificateDer<'static>>> {
        with_stream!(&self.stream, s => s.conn.peer_certificates().map(|chain| {
            chain.iter().map(|cert| cert.clone().into_owned()).collect()
        }))
    }
}
