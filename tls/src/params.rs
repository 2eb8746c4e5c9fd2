//! TLS parameters supplied by the configuration loader
//!
//! Loading and parsing the parameters from files or the command line happens elsewhere;
//! this module defines their shape, their defaults and the consistency checks a manager
//! runs before it touches any key material.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SslError;

/// Whether and how connections use TLS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SslMode {
    /// No TLS; no manager is ever created
    #[default]
    #[serde(rename = "disabled")]
    Disabled,
    /// Plain connections by default, TLS accepted
    #[serde(rename = "allowSSL", alias = "allowed")]
    AllowSsl,
    /// TLS by default, plain connections accepted
    #[serde(rename = "preferSSL", alias = "preferred")]
    PreferSsl,
    /// TLS only
    #[serde(rename = "requireSSL", alias = "required")]
    RequireSsl,
}

impl SslMode {
    /// Anything but `Disabled`
    pub fn is_enabled(self) -> bool {
        self != Self::Disabled
    }

    /// Configuration spelling of the mode
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::AllowSsl => "allowSSL",
            Self::PreferSsl => "preferSSL",
            Self::RequireSsl => "requireSSL",
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SslMode {
    type Err = SslError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(Self::Disabled),
            "allowSSL" | "allowed" => Ok(Self::AllowSsl),
            "preferSSL" | "preferred" => Ok(Self::PreferSsl),
            "requireSSL" | "required" => Ok(Self::RequireSsl),
            other => Err(SslError::initialization(format!(
                "unknown sslMode '{other}'"
            ))),
        }
    }
}

/// Protocol versions that can be switched off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TlsProtocol {
    /// TLS 1.2
    #[serde(rename = "TLS1_2")]
    Tls12,
    /// TLS 1.3
    #[serde(rename = "TLS1_3")]
    Tls13,
}

/// TLS configuration, immutable once the process has started
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SslParams {
    /// Whether TLS is in use at all
    pub ssl_mode: SslMode,
    /// PEM file holding this node's certificate chain and private key
    pub pem_key_file: Option<PathBuf>,
    /// Unlocks an encrypted key in `pem_key_file`
    #[serde(skip_serializing)]
    pub pem_password: Option<String>,
    /// Separate identity presented on outgoing connections
    pub cluster_file: Option<PathBuf>,
    /// Unlocks an encrypted key in `cluster_file`
    #[serde(skip_serializing)]
    pub cluster_password: Option<String>,
    /// Certificate authorities that make up the trust database
    pub ca_file: Option<PathBuf>,
    /// Revocation lists honored during chain verification
    pub crl_file: Option<PathBuf>,
    /// Accept peers that present no certificate at all
    pub weak_validation: bool,
    /// Downgrade chain verification failures to warnings
    pub allow_invalid_certificates: bool,
    /// Downgrade hostname mismatches to warnings
    pub allow_invalid_hostnames: bool,
    /// Versions never offered or accepted
    pub disabled_protocols: Vec<TlsProtocol>,
}

impl SslParams {
    /// Parameters with TLS required and the given key and CA files
    pub fn require_ssl(pem_key_file: impl Into<PathBuf>, ca_file: impl Into<PathBuf>) -> Self {
        Self {
            ssl_mode: SslMode::RequireSsl,
            pem_key_file: Some(pem_key_file.into()),
            ca_file: Some(ca_file.into()),
            ..Self::default()
        }
    }

    /// File holding the identity presented on outgoing connections
    pub fn client_identity_file(&self) -> Option<(&PathBuf, Option<&str>)> {
        match &self.cluster_file {
            Some(path) => Some((path, self.cluster_password.as_deref())),
            None => self
                .pem_key_file
                .as_ref()
                .map(|path| (path, self.pem_password.as_deref())),
        }
    }

    /// Whether `protocol` may be negotiated
    pub fn protocol_enabled(&self, protocol: TlsProtocol) -> bool {
        !self.disabled_protocols.contains(&protocol)
    }

    /// Consistency checks run before any key material is loaded
    pub fn validate(&self, is_server: bool) -> Result<(), SslError> {
        if !self.ssl_mode.is_enabled() {
            return Ok(());
        }
        if is_server && self.pem_key_file.is_none() {
            return Err(SslError::initialization(format!(
                "need sslPEMKeyFile when sslMode is {}",
                self.ssl_mode
            )));
        }
        if self.crl_file.is_some() && self.ca_file.is_none() {
            return Err(SslError::initialization(
                "need sslCAFile when sslCRLFile is set",
            ));
        }
        if !self.protocol_enabled(TlsProtocol::Tls12) && !self.protocol_enabled(TlsProtocol::Tls13)
        {
            return Err(SslError::initialization(
                "every TLS protocol version is disabled",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for SslParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SslParams")
            .field("ssl_mode", &self.ssl_mode)
            .field("pem_key_file", &self.pem_key_file)
            .field("pem_password", &self.pem_password.as_ref().map(|_| "<redacted>"))
            .field("cluster_file", &self.cluster_file)
            .field(
                "cluster_password",
                &self.cluster_password.as_ref().map(|_| "<redacted>"),
            )
            .field("ca_file", &self.ca_file)
            .field("crl_file", &self.crl_file)
            .field("weak_validation", &self.weak_validation)
            .field("allow_invalid_certificates", &self.allow_invalid_certificates)
            .field("allow_invalid_hostnames", &self.allow_invalid_hostnames)
            .field("disabled_protocols", &self.disabled_protocols)
            .finish()
    }
}
