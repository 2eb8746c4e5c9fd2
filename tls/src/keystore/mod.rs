//! Local certificate and private key material
//!
//! A PEM file acts as a key store with a single logical slot. The server identity
//! lives in the [`KeyStore::SERVER_SLOT`] slot and the identity presented on outgoing
//! connections in [`KeyStore::CLIENT_SLOT`]. Encrypted keys are unlocked through a
//! [`PasswordCallback`].

mod pem_file;

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use secrecy::{ExposeSecret, SecretString};

use crate::certificate::CertificateFacts;
use crate::error::{BackendError, ErrorReason};
use crate::params::SslParams;

use pem_file::KeyBlock;

/// Attempts made to unlock an encrypted key before giving up
pub const MAX_PASSWORD_ATTEMPTS: u32 = 3;

const EXPIRY_WARNING_WINDOW: std::time::Duration = std::time::Duration::from_secs(30 * 24 * 3600);

/// Handle to one logical entry of a key store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStoreSlot {
    name: String,
    path: PathBuf,
}

impl KeyStoreSlot {
    /// Slot `name` backed by the PEM file at `path`
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Logical slot name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the slot is read from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for KeyStoreSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.path.display())
    }
}

/// Supplies the secret that unlocks a slot.
///
/// Receives the slot and the retry counter (0 on the first attempt) and returns the
/// secret, or `None` to abort unlocking.
pub type PasswordCallback<'a> =
    dyn Fn(&KeyStoreSlot, u32) -> Option<SecretString> + Send + Sync + 'a;

/// Callback that forwards a configured password once and refuses retries
pub fn forwarding_password_callback(password: Option<String>) -> Box<PasswordCallback<'static>> {
    Box::new(move |_slot: &KeyStoreSlot, retry: u32| {
        if retry > 0 {
            return None;
        }
        password.as_deref().map(SecretString::from)
    })
}

/// A certificate chain with its private key
pub struct LocalIdentity {
    slot: KeyStoreSlot,
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    facts: CertificateFacts,
}

impl LocalIdentity {
    /// Where the identity was loaded from
    pub fn slot(&self) -> &KeyStoreSlot {
        &self.slot
    }

    /// Leaf certificate first
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// Private key matching the leaf certificate
    pub fn key(&self) -> &PrivateKeyDer<'static> {
        &self.key
    }

    /// Facts about the leaf certificate
    pub fn facts(&self) -> &CertificateFacts {
        &self.facts
    }

    /// RFC 2253 subject of the leaf certificate
    pub fn subject_name(&self) -> &str {
        &self.facts.subject_name
    }

    /// The same chain and key filed under another slot
    fn reslotted(&self, slot: KeyStoreSlot) -> Self {
        Self {
            slot,
            chain: self.chain.clone(),
            key: self.key.clone_key(),
            facts: self.facts.clone(),
        }
    }
}

impl fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("slot", &self.slot)
            .field("chain_len", &self.chain.len())
            .field("subject", &self.facts.subject_name)
            .finish_non_exhaustive()
    }
}

/// The identities this node can present
#[derive(Debug, Default)]
pub struct KeyStore {
    identities: Vec<LocalIdentity>,
}

impl KeyStore {
    /// Slot holding the identity presented when accepting
    pub const SERVER_SLOT: &'static str = "server";
    /// Slot holding the identity presented when connecting
    pub const CLIENT_SLOT: &'static str = "client";

    /// Open the slots named by `params`, forwarding the configured passwords
    ///
    /// # Errors
    ///
    /// Returns the first slot's loading failure, see [`load_slot`](Self::load_slot).
    pub fn open(params: &SslParams, is_server: bool) -> Result<Self, BackendError> {
        let server_callback = forwarding_password_callback(params.pem_password.clone());
        let client_callback = forwarding_password_callback(
            params
                .client_identity_file()
                .and_then(|(_, password)| password)
                .map(str::to_owned),
        );
        Self::open_slots(
            params,
            is_server,
            server_callback.as_ref(),
            client_callback.as_ref(),
        )
    }

    /// Open the slots named by `params`, asking `callback` for every password
    ///
    /// # Errors
    ///
    /// Returns the first slot's loading failure, see [`load_slot`](Self::load_slot).
    pub fn open_with(
        params: &SslParams,
        is_server: bool,
        callback: &PasswordCallback<'_>,
    ) -> Result<Self, BackendError> {
        Self::open_slots(params, is_server, callback, callback)
    }

    fn open_slots(
        params: &SslParams,
        is_server: bool,
        server_callback: &PasswordCallback<'_>,
        client_callback: &PasswordCallback<'_>,
    ) -> Result<Self, BackendError> {
        let mut store = Self::default();

        if is_server {
            if let Some(path) = &params.pem_key_file {
                let slot = KeyStoreSlot::new(Self::SERVER_SLOT, path);
                store.insert(Self::load_slot(slot, server_callback)?);
            }
        }

        if let Some((path, _)) = params.client_identity_file() {
            let slot = KeyStoreSlot::new(Self::CLIENT_SLOT, path);
            // The server's own file is read and unlocked only once
            let shared = store
                .server()
                .filter(|server| server.slot.path == *path)
                .map(|server| server.reslotted(slot.clone()));
            let identity = match shared {
                Some(identity) => identity,
                None => Self::load_slot(slot, client_callback)?,
            };
            store.insert(identity);
        }

        Ok(store)
    }

    /// Load the certificate chain and key stored in `slot`
    pub fn load_slot(
        slot: KeyStoreSlot,
        callback: &PasswordCallback<'_>,
    ) -> Result<LocalIdentity, BackendError> {
        let blocks = pem_file::read_blocks(slot.path())?;
        let (chain, key_block) = pem_file::split_identity(blocks)?;

        let leaf = chain.first().ok_or_else(|| {
            BackendError::new(
                ErrorReason::NoStartLine,
                format!("no certificate found in {slot}"),
            )
        })?;
        let key_block = key_block.ok_or_else(|| {
            BackendError::new(
                ErrorReason::NoStartLine,
                format!("no private key found in {slot}"),
            )
        })?;

        let facts = CertificateFacts::parse(leaf.as_ref())?;
        check_validity(&slot, &facts)?;

        let key = match key_block {
            KeyBlock::Plain(key) => key,
            KeyBlock::Encrypted(encrypted) => unlock(&slot, &encrypted, callback)?,
        };

        tracing::info!(
            "Loaded {} identity {} ({}, expires {})",
            slot.name(),
            facts.subject_name,
            facts.key_exchange_type(),
            facts.not_after
        );

        Ok(LocalIdentity {
            slot,
            chain,
            key,
            facts,
        })
    }

    /// Replaces any identity already held under the same slot name
    pub fn insert(&mut self, identity: LocalIdentity) {
        self.identities
            .retain(|existing| existing.slot.name != identity.slot.name);
        self.identities.push(identity);
    }

    /// Look up an identity by logical slot name
    pub fn find(&self, name: &str) -> Option<&LocalIdentity> {
        self.identities
            .iter()
            .find(|identity| identity.slot.name == name)
    }

    /// The [`SERVER_SLOT`](Self::SERVER_SLOT) identity
    pub fn server(&self) -> Option<&LocalIdentity> {
        self.find(Self::SERVER_SLOT)
    }

    /// The [`CLIENT_SLOT`](Self::CLIENT_SLOT) identity
    pub fn client(&self) -> Option<&LocalIdentity> {
        self.find(Self::CLIENT_SLOT)
    }

    /// Whether no slot was loaded
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

fn check_validity(slot: &KeyStoreSlot, facts: &CertificateFacts) -> Result<(), BackendError> {
    let now = Utc::now();
    if now < facts.not_before {
        return Err(BackendError::new(
            ErrorReason::CertificateNotYetValid,
            format!("certificate in {slot} is not valid before {}", facts.not_before),
        ));
    }
    if now > facts.not_after {
        return Err(BackendError::new(
            ErrorReason::CertificateExpired,
            format!("certificate in {slot} expired on {}", facts.not_after),
        ));
    }
    if facts.expires_within(now, EXPIRY_WARNING_WINDOW) {
        tracing::warn!(
            "Certificate in {} will expire on {}",
            slot,
            facts.not_after
        );
    }
    Ok(())
}

fn unlock(
    slot: &KeyStoreSlot,
    encrypted: &[u8],
    callback: &PasswordCallback<'_>,
) -> Result<PrivateKeyDer<'static>, BackendError> {
    let mut last_error = None;
    for retry in 0..MAX_PASSWORD_ATTEMPTS {
        let Some(password) = callback(slot, retry) else {
            break;
        };
        match pem_file::decrypt_pkcs8(encrypted, password.expose_secret().as_bytes()) {
            Ok(key) => return Ok(key),
            Err(e) => {
                tracing::warn!("Failed to unlock {} (attempt {}): {}", slot, retry + 1, e);
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        BackendError::new(
            ErrorReason::PasswordRequired,
            format!("private key in {slot} is encrypted and no password was supplied"),
        )
    }))
}
