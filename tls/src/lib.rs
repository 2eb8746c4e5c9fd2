#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::result_large_err)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::new_without_default)]

//! Blocking TLS session management
//!
//! This crate establishes, operates and validates TLS connections on top of ordinary
//! stream sockets while keeping the crypto library behind the [`TlsBackend`] interface.
//! The flow for a caller is:
//!
//! 1. install the process-wide [`SslManager`] once with [`ManagerRegistry::install`]
//! 2. hand a connected [`Socket`] to [`SslManager::connect`] or [`SslManager::accept`]
//! 3. decide whether to trust the peer with
//!    [`SslManager::parse_and_validate_peer_certificate`]
//! 4. exchange data with [`SslManager::ssl_read`] / [`SslManager::ssl_write`]
//! 5. optionally [`SslManager::ssl_shutdown`], then drop the [`Connection`]
//!
//! Threads that used the layer call [`SslManager::cleanup_thread_locals`] before exiting.

pub mod backend;
pub mod certificate;
pub mod configuration;
pub mod connection;
pub mod error;
pub mod keystore;
pub mod manager;
pub mod params;
pub mod registry;
pub mod socket;

pub use backend::{
    BackendSession, CertificateUsage, RustlsBackend, SessionInfo, ShutdownStatus, TlsBackend,
};
pub use configuration::{ServerStatus, SslConfiguration};
pub use connection::{Connection, ConnectionState, Role};
pub use error::{ErrorCode, ErrorReason, Result, SslError, SslErrorKind};
pub use keystore::{KeyStore, KeyStoreSlot, LocalIdentity, PasswordCallback};
pub use manager::SslManager;
pub use params::{SslMode, SslParams, TlsProtocol};
pub use registry::{
    ManagerRegistry, get_ssl_manager, global_registry, is_ssl_server, set_ssl_server,
};
pub use socket::Socket;
