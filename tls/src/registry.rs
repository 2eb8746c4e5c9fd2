//! Process-wide manager singleton
//!
//! The manager is built once during startup under a lock and published; every later
//! lookup is a lock-free read. Code below the process boundary should receive the
//! manager by reference instead of reaching for [`get_ssl_manager`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use once_cell::sync::OnceCell;

use crate::error::Result;
use crate::manager::SslManager;
use crate::params::SslParams;

/// Holder for at most one [`SslManager`]
#[derive(Debug)]
pub struct ManagerRegistry {
    lock: Mutex<()>,
    cell: OnceCell<SslManager>,
}

impl ManagerRegistry {
    /// An empty registry
    pub const fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            cell: OnceCell::new(),
        }
    }

    /// Create and publish the manager.
    ///
    /// Returns `None` without doing any backend work when SSL is disabled. A second call
    /// returns the manager that is already installed.
    ///
    /// # Errors
    ///
    /// Returns `SslError::Initialization` if the manager cannot be created; nothing is
    /// published and a later call may try again.
    pub fn install(&self, params: &SslParams, is_server: bool) -> Result<Option<&SslManager>> {
        self.install_with(params, || SslManager::create(params.clone(), is_server))
    }

    /// Like [`install`](Self::install) with a caller-supplied constructor, e.g. one that
    /// selects another backend or registers a password callback
    ///
    /// # Errors
    ///
    /// Returns whatever `create` returns.
    pub fn install_with<F>(&self, params: &SslParams, create: F) -> Result<Option<&SslManager>>
    where
        F: FnOnce() -> Result<SslManager>,
    {
        if !params.ssl_mode.is_enabled() {
            tracing::debug!("sslMode is disabled, no SSL manager installed");
            return Ok(None);
        }

        // The guard protects no data, so a poisoned lock is still usable
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = self.cell.get() {
            tracing::debug!("SSL manager already installed");
            return Ok(Some(existing));
        }

        let manager = create()?;
        if std::ptr::eq(self, &GLOBAL_REGISTRY) {
            set_ssl_server(manager.is_server());
        }
        Ok(Some(self.cell.get_or_init(|| manager)))
    }

    /// The published manager, if any
    pub fn get(&self) -> Option<&SslManager> {
        self.cell.get()
    }
}

impl Default for ManagerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_REGISTRY: ManagerRegistry = ManagerRegistry::new();
static IS_SSL_SERVER: AtomicBool = AtomicBool::new(false);

/// The process-wide registry
pub fn global_registry() -> &'static ManagerRegistry {
    &GLOBAL_REGISTRY
}

/// The process-wide manager; `None` until installed, and always `None` when SSL is
/// disabled
pub fn get_ssl_manager() -> Option<&'static SslManager> {
    GLOBAL_REGISTRY.get()
}

/// Record whether this process runs the session layer as a server
pub fn set_ssl_server(is_server: bool) {
    IS_SSL_SERVER.store(is_server, Ordering::Release);
}

/// Whether this process runs the session layer as a server
pub fn is_ssl_server() -> bool {
    IS_SSL_SERVER.load(Ordering::Acquire)
}
