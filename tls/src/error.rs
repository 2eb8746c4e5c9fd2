//! Error taxonomy for TLS session management
//!
//! Every backend failure crosses the manager boundary as exactly one [`SslError`] kind,
//! with the backend's diagnostic string and packed [`ErrorCode`] attached.

use std::fmt;
use std::io;

/// Result type for TLS session operations
pub type Result<T> = std::result::Result<T, SslError>;

/// Errors surfaced by the TLS session layer
#[derive(Debug, Clone, thiserror::Error)]
pub enum SslError {
    /// Backend or key-store setup failed; no manager can exist
    #[error("SSL initialization failed: {message}")]
    Initialization {
        /// Backend diagnostic
        message: String,
        /// Packed backend code, or [`ErrorCode::NONE`]
        code: ErrorCode,
    },

    /// Handshake could not be negotiated, or local identity material is missing
    #[error("SSL handshake with {remote} failed: {message}")]
    Connect {
        /// Remote endpoint of the socket
        remote: String,
        /// Backend diagnostic
        message: String,
        /// Packed backend code
        code: ErrorCode,
    },

    /// Handshake succeeded but the peer's identity failed verification
    #[error("SSL peer certificate validation failed: {message}")]
    CertificateValidation {
        /// Why the peer was rejected
        message: String,
        /// Packed backend code, or [`ErrorCode::NONE`]
        code: ErrorCode,
    },

    /// Read, write or shutdown failed in the backend
    #[error("SSL I/O error ({kind}): {message}")]
    Io {
        /// Classification of the failed call
        kind: SslErrorKind,
        /// Backend diagnostic
        message: String,
        /// Packed backend code
        code: ErrorCode,
    },
}

impl SslError {
    /// Create an `Initialization` error without a backend code
    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization {
            message: msg.into(),
            code: ErrorCode::NONE,
        }
    }

    /// Create a `CertificateValidation` error without a backend code
    pub fn certificate_validation(msg: impl Into<String>) -> Self {
        Self::CertificateValidation {
            message: msg.into(),
            code: ErrorCode::NONE,
        }
    }

    pub(crate) fn initialization_from(context: &str, err: BackendError) -> Self {
        Self::Initialization {
            message: format!("{context}: {}", err.message),
            code: err.code,
        }
    }

    pub(crate) fn connect_from(remote: &str, err: BackendError) -> Self {
        Self::Connect {
            remote: remote.to_string(),
            message: err.message,
            code: err.code,
        }
    }

    pub(crate) fn validation_from(err: BackendError) -> Self {
        Self::CertificateValidation {
            message: err.message,
            code: err.code,
        }
    }

    pub(crate) fn io_from(err: BackendError) -> Self {
        Self::Io {
            kind: err.kind,
            message: err.message,
            code: err.code,
        }
    }

    /// Packed backend error code attached to this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Initialization { code, .. }
            | Self::Connect { code, .. }
            | Self::CertificateValidation { code, .. }
            | Self::Io { code, .. } => *code,
        }
    }

    /// Backend diagnostic string
    pub fn message(&self) -> &str {
        match self {
            Self::Initialization { message, .. }
            | Self::Connect { message, .. }
            | Self::CertificateValidation { message, .. }
            | Self::Io { message, .. } => message,
        }
    }
}

/// Failure reported by a backend primitive, before the manager classifies it
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    /// Packed code pushed onto the error queue
    pub code: ErrorCode,
    /// How an I/O caller should classify the failure
    pub kind: SslErrorKind,
    /// Human-readable diagnostic
    pub message: String,
}

impl BackendError {
    /// A protocol-level failure for `reason`
    pub fn new(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            code: reason.code(),
            kind: SslErrorKind::Ssl,
            message: message.into(),
        }
    }

    /// Reclassify the failure, e.g. as a transport error
    #[must_use]
    pub fn with_kind(self, kind: SslErrorKind) -> Self {
        Self { kind, ..self }
    }
}

/// Classification of the last I/O call on a connection, in the `SSL_get_error` shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum SslErrorKind {
    /// The call succeeded
    #[default]
    None,
    /// The peer sent close-notify; the session is finished
    ZeroReturn,
    /// The socket had no data; retry the read later
    WantRead,
    /// The socket could not take data; retry the write later
    WantWrite,
    /// The transport failed underneath the session
    Syscall,
    /// A TLS protocol failure
    Ssl,
}

impl SslErrorKind {
    /// Classify a transport error raised during a read (`writing = false`) or write
    pub fn from_io(err: &io::Error, writing: bool) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock if writing => Self::WantWrite,
            io::ErrorKind::WouldBlock => Self::WantRead,
            io::ErrorKind::InvalidData => Self::Ssl,
            _ => Self::Syscall,
        }
    }
}

impl fmt::Display for SslErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "SSL_ERROR_NONE",
            Self::ZeroReturn => "SSL_ERROR_ZERO_RETURN",
            Self::WantRead => "SSL_ERROR_WANT_READ",
            Self::WantWrite => "SSL_ERROR_WANT_WRITE",
            Self::Syscall => "SSL_ERROR_SYSCALL",
            Self::Ssl => "SSL_ERROR_SSL",
        };
        f.write_str(name)
    }
}

/// Library a packed error code originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorLibrary {
    /// Operating system and transport
    Sys = 2,
    /// PEM decoding
    Pem = 9,
    /// Certificate parsing and verification
    X509 = 11,
    /// Handshake, session and key store
    Ssl = 20,
}

impl ErrorLibrary {
    /// Name used in rendered error strings
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sys => "system library",
            Self::Pem => "PEM routines",
            Self::X509 => "X509 certificate routines",
            Self::Ssl => "SSL routines",
        }
    }

    fn from_raw(raw: u64) -> Option<Self> {
        match raw {
            2 => Some(Self::Sys),
            9 => Some(Self::Pem),
            11 => Some(Self::X509),
            20 => Some(Self::Ssl),
            _ => None,
        }
    }
}

/// Packed backend error code: library in bits 24 and up, reason in the low 24 bits.
/// Zero means "no error".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ErrorCode(u64);

impl ErrorCode {
    /// No error
    pub const NONE: Self = Self(0);

    const REASON_MASK: u64 = 0x00FF_FFFF;

    /// Combine a library and a reason number
    pub const fn pack(library: ErrorLibrary, reason: u32) -> Self {
        Self(((library as u64) << 24) | (reason as u64 & Self::REASON_MASK))
    }

    /// Wrap an already packed value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The packed value
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this is [`ErrorCode::NONE`]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Originating library, `None` if the library bits are unknown
    pub fn library(self) -> Option<ErrorLibrary> {
        ErrorLibrary::from_raw(self.0 >> 24)
    }

    /// Reason number within the library
    pub const fn reason(self) -> u32 {
        (self.0 & Self::REASON_MASK) as u32
    }

    /// Render as `error:XXXXXXXX:library:reason`
    pub fn error_string(self) -> String {
        let library = match self.library() {
            Some(library) => library.name().to_string(),
            None => format!("lib({})", self.0 >> 24),
        };
        let reason = match ErrorReason::from_code(self) {
            Some(reason) => reason.text().to_string(),
            None => format!("reason({})", self.reason()),
        };
        format!("error:{self}:{library}:{reason}")
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// Every reason the session layer can report, with its library and reason number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorReason {
    // SSL routines
    /// Unexpected message
    UnexpectedMessage,
    /// Unexpected handshake message
    UnexpectedHandshakeMessage,
    /// Invalid message
    InvalidMessage,
    /// Peer did not return a certificate
    NoCertificatesPresented,
    /// Unsupported name type
    UnsupportedNameType,
    /// Decryption failed
    DecryptFailed,
    /// Encryption failed
    EncryptFailed,
    /// Peer is incompatible
    PeerIncompatible,
    /// Peer misbehaved
    PeerMisbehaved,
    /// Tlsv1 alert received
    AlertReceived,
    /// Certificate verify failed
    CertificateVerifyFailed,
    /// Handshake not complete
    HandshakeNotComplete,
    /// Record too large
    RecordTooLarge,
    /// No application protocol
    NoApplicationProtocol,
    /// Internal error
    InternalError,
    /// No server certificate configured
    NoServerCertificate,
    /// Connection is closed
    ConnectionClosed,
    /// Unknown error
    UnknownSslError,
    // system library
    /// Connection reset by peer
    ConnectionReset,
    /// Connection aborted
    ConnectionAborted,
    /// Broken pipe
    BrokenPipe,
    /// Unexpected eof while reading
    UnexpectedEof,
    /// Operation would block
    WouldBlock,
    /// Operation timed out
    TimedOut,
    /// Interrupted system call
    Interrupted,
    /// Socket is not connected
    NotConnected,
    /// System error
    SystemError,
    // X509 certificate routines
    /// Certificate has expired
    CertificateExpired,
    /// Certificate is not yet valid
    CertificateNotYetValid,
    /// Unable to get local issuer certificate
    UnknownIssuer,
    /// Certificate revoked
    CertificateRevoked,
    /// Unsupported certificate purpose
    InvalidPurpose,
    /// Certificate signature failure
    BadSignature,
    /// Certificate encoding error
    BadEncoding,
    /// Hostname mismatch
    HostnameMismatch,
    /// No certificate provided by peer
    NoPeerCertificate,
    /// Certificate verify error
    CertificateVerifyError,
    // PEM routines
    /// No start line
    NoStartLine,
    /// Bad base64 decode
    BadPemEncoding,
    /// Bad decrypt
    BadDecrypt,
    /// Password required
    PasswordRequired,
    /// Unsupported private key type
    UnsupportedKeyType,
    /// Read failed
    ReadFailed,
    /// Key values mismatch
    KeyMismatch,
    /// Invalid certificate revocation list
    BadCrl,
}

impl ErrorReason {
    /// Every reason, in catalogue order
    pub const ALL: [Self; 45] = [
        Self::UnexpectedMessage,
        Self::UnexpectedHandshakeMessage,
        Self::InvalidMessage,
        Self::NoCertificatesPresented,
        Self::UnsupportedNameType,
        Self::DecryptFailed,
        Self::EncryptFailed,
        Self::PeerIncompatible,
        Self::PeerMisbehaved,
        Self::AlertReceived,
        Self::CertificateVerifyFailed,
        Self::HandshakeNotComplete,
        Self::RecordTooLarge,
        Self::NoApplicationProtocol,
        Self::InternalError,
        Self::NoServerCertificate,
        Self::ConnectionClosed,
        Self::UnknownSslError,
        Self::ConnectionReset,
        Self::ConnectionAborted,
        Self::BrokenPipe,
        Self::UnexpectedEof,
        Self::WouldBlock,
        Self::TimedOut,
        Self::Interrupted,
        Self::NotConnected,
        Self::SystemError,
        Self::CertificateExpired,
        Self::CertificateNotYetValid,
        Self::UnknownIssuer,
        Self::CertificateRevoked,
        Self::InvalidPurpose,
        Self::BadSignature,
        Self::BadEncoding,
        Self::HostnameMismatch,
        Self::NoPeerCertificate,
        Self::CertificateVerifyError,
        Self::NoStartLine,
        Self::BadPemEncoding,
        Self::BadDecrypt,
        Self::PasswordRequired,
        Self::UnsupportedKeyType,
        Self::ReadFailed,
        Self::KeyMismatch,
        Self::BadCrl,
    ];

    const fn parts(self) -> (ErrorLibrary, u32, &'static str) {
        use ErrorLibrary::{Pem, Ssl, Sys, X509};
        match self {
            Self::UnexpectedMessage => (Ssl, 1, "unexpected message"),
            Self::UnexpectedHandshakeMessage => (Ssl, 2, "unexpected handshake message"),
            Self::InvalidMessage => (Ssl, 3, "invalid message"),
            Self::NoCertificatesPresented => (Ssl, 4, "peer did not return a certificate"),
            Self::UnsupportedNameType => (Ssl, 5, "unsupported name type"),
            Self::DecryptFailed => (Ssl, 6, "decryption failed"),
            Self::EncryptFailed => (Ssl, 7, "encryption failed"),
            Self::PeerIncompatible => (Ssl, 8, "peer is incompatible"),
            Self::PeerMisbehaved => (Ssl, 9, "peer misbehaved"),
            Self::AlertReceived => (Ssl, 10, "tlsv1 alert received"),
            Self::CertificateVerifyFailed => (Ssl, 11, "certificate verify failed"),
            Self::HandshakeNotComplete => (Ssl, 12, "handshake not complete"),
            Self::RecordTooLarge => (Ssl, 13, "record too large"),
            Self::NoApplicationProtocol => (Ssl, 14, "no application protocol"),
            Self::InternalError => (Ssl, 15, "internal error"),
            Self::NoServerCertificate => (Ssl, 16, "no server certificate configured"),
            Self::ConnectionClosed => (Ssl, 17, "connection is closed"),
            Self::UnknownSslError => (Ssl, 18, "unknown error"),
            Self::ConnectionReset => (Sys, 1, "connection reset by peer"),
            Self::ConnectionAborted => (Sys, 2, "connection aborted"),
            Self::BrokenPipe => (Sys, 3, "broken pipe"),
            Self::UnexpectedEof => (Sys, 4, "unexpected eof while reading"),
            Self::WouldBlock => (Sys, 5, "operation would block"),
            Self::TimedOut => (Sys, 6, "operation timed out"),
            Self::Interrupted => (Sys, 7, "interrupted system call"),
            Self::NotConnected => (Sys, 8, "socket is not connected"),
            Self::SystemError => (Sys, 9, "system error"),
            Self::CertificateExpired => (X509, 1, "certificate has expired"),
            Self::CertificateNotYetValid => (X509, 2, "certificate is not yet valid"),
            Self::UnknownIssuer => (X509, 3, "unable to get local issuer certificate"),
            Self::CertificateRevoked => (X509, 4, "certificate revoked"),
            Self::InvalidPurpose => (X509, 5, "unsupported certificate purpose"),
            Self::BadSignature => (X509, 6, "certificate signature failure"),
            Self::BadEncoding => (X509, 7, "certificate encoding error"),
            Self::HostnameMismatch => (X509, 8, "hostname mismatch"),
            Self::NoPeerCertificate => (X509, 9, "no certificate provided by peer"),
            Self::CertificateVerifyError => (X509, 10, "certificate verify error"),
            Self::NoStartLine => (Pem, 1, "no start line"),
            Self::BadPemEncoding => (Pem, 2, "bad base64 decode"),
            Self::BadDecrypt => (Pem, 3, "bad decrypt"),
            Self::PasswordRequired => (Pem, 4, "password required"),
            Self::UnsupportedKeyType => (Pem, 5, "unsupported private key type"),
            Self::ReadFailed => (Pem, 6, "read failed"),
            Self::KeyMismatch => (Pem, 7, "key values mismatch"),
            Self::BadCrl => (Pem, 8, "invalid certificate revocation list"),
        }
    }

    /// Packed code pushed onto the error queue
    pub const fn code(self) -> ErrorCode {
        let (library, reason, _) = self.parts();
        ErrorCode::pack(library, reason)
    }

    /// Library the reason belongs to
    pub const fn library(self) -> ErrorLibrary {
        self.parts().0
    }

    /// Reason text used in rendered error strings
    pub const fn text(self) -> &'static str {
        self.parts().2
    }

    /// Reverse of [`code`](Self::code)
    pub fn from_code(code: ErrorCode) -> Option<Self> {
        Self::ALL.into_iter().find(|reason| reason.code() == code)
    }

    /// Reason for a transport failure
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset => Self::ConnectionReset,
            io::ErrorKind::ConnectionAborted => Self::ConnectionAborted,
            io::ErrorKind::BrokenPipe => Self::BrokenPipe,
            io::ErrorKind::UnexpectedEof => Self::UnexpectedEof,
            io::ErrorKind::WouldBlock => Self::WouldBlock,
            io::ErrorKind::TimedOut => Self::TimedOut,
            io::ErrorKind::Interrupted => Self::Interrupted,
            io::ErrorKind::NotConnected => Self::NotConnected,
            _ => Self::SystemError,
        }
    }
}
