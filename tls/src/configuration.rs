//! Read-only facts about this node's TLS identity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot computed once when the manager is created and never mutated
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SslConfiguration {
    /// RFC 2253 subject of the server certificate, empty without one
    pub server_subject_name: String,
    /// RFC 2253 subject of the identity presented on outgoing connections
    pub client_subject_name: String,
    /// End of the server certificate's validity
    pub server_certificate_expiration_date: DateTime<Utc>,
    /// Whether a CA file was configured
    pub has_ca: bool,
}

/// Server-status section for operational monitoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Subject of the server certificate
    #[serde(rename = "SSLServerSubjectName")]
    pub server_subject_name: String,
    /// Whether a CA file was configured
    #[serde(rename = "SSLServerHasCertificateAuthority")]
    pub has_certificate_authority: bool,
    /// End of the server certificate's validity
    #[serde(rename = "SSLServerCertificateExpirationDate")]
    pub certificate_expiration_date: DateTime<Utc>,
}

impl SslConfiguration {
    /// Snapshot from already extracted facts
    pub fn new(
        server_subject_name: impl Into<String>,
        client_subject_name: impl Into<String>,
        server_certificate_expiration_date: DateTime<Utc>,
        has_ca: bool,
    ) -> Self {
        Self {
            server_subject_name: server_subject_name.into(),
            client_subject_name: client_subject_name.into(),
            server_certificate_expiration_date,
            has_ca,
        }
    }

    /// The server-status section as a typed value
    pub fn server_status(&self) -> ServerStatus {
        ServerStatus {
            server_subject_name: self.server_subject_name.clone(),
            has_certificate_authority: self.has_ca,
            certificate_expiration_date: self.server_certificate_expiration_date,
        }
    }

    /// The server-status section as a structured document
    pub fn server_status_document(&self) -> serde_json::Value {
        serde_json::json!({
            "SSLServerSubjectName": self.server_subject_name,
            "SSLServerHasCertificateAuthority": self.has_ca,
            "SSLServerCertificateExpirationDate": self.server_certificate_expiration_date,
        })
    }
}
