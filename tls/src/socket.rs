//! Transport socket handed to the manager for a handshake
//!
//! The transport layer owns accepting and connecting; a [`Socket`] is an
//! already-connected stream plus the human-readable endpoint it talks to. Once a
//! backend imports it, the socket becomes a [`Transport`] that replays any bytes the
//! caller already consumed while sniffing for TLS.

use std::io::{self, Cursor, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

/// An already-connected or already-accepted stream socket
#[derive(Debug)]
pub struct Socket {
    stream: TcpStream,
    remote: String,
    remote_host: String,
}

impl Socket {
    /// Wrap a connected stream; the remote endpoint is taken from the peer address
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self {
            stream,
            remote: peer.to_string(),
            remote_host: peer.ip().to_string(),
        })
    }

    /// Wrap a connected stream that was dialed by host name
    pub fn with_remote_host(stream: TcpStream, remote_host: impl Into<String>) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self {
            stream,
            remote: peer.to_string(),
            remote_host: remote_host.into(),
        })
    }

    /// Dial `host:port` and wrap the resulting stream
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect(addr) {
                Ok(stream) => return Self::with_remote_host(stream, host),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{host}:{port} did not resolve"),
            )
        }))
    }

    /// Remote endpoint as `address:port`
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Host name (or address) used to identify the peer during the handshake
    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    /// A second handle to the same descriptor, e.g. to interrupt a blocked call by
    /// shutting the socket down from another thread
    pub fn try_clone_stream(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }

    pub(crate) fn into_transport(self, initial_bytes: &[u8]) -> Transport {
        Transport {
            pending: Cursor::new(initial_bytes.to_vec()),
            stream: self.stream,
            remote: self.remote,
        }
    }
}

#[cfg(unix)]
impl std::os::fd::AsRawFd for Socket {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.stream.as_raw_fd()
    }
}

/// A socket owned by a backend session
#[derive(Debug)]
pub struct Transport {
    pending: Cursor<Vec<u8>>,
    stream: TcpStream,
    remote: String,
}

impl Transport {
    /// Remote endpoint of the wrapped stream
    pub fn remote(&self) -> &str {
        &self.remote
    }

    fn has_pending(&self) -> bool {
        (self.pending.position() as usize) < self.pending.get_ref().len()
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.has_pending() {
            return self.pending.read(buf);
        }
        self.stream.read(buf)
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}
