//! API types for request context and response bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use utoipa::ToSchema;

// ============================================================================
// Connection Context
// ============================================================================

/// Per-connection facts captured by the listener and attached to every request
/// served on that connection.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    /// DER certificates presented by the client, leaf first. Empty when the
    /// client did not authenticate.
    pub peer_chain: Arc<[Vec<u8>]>,

    /// Remote socket address
    pub remote_addr: SocketAddr,

    /// Local port the connection was accepted on
    pub server_port: u16,

    /// Whether the connection is TLS protected
    pub is_secure: bool,
}

impl ClientConnection {
    pub fn new(peer_chain: Vec<Vec<u8>>, remote_addr: SocketAddr, server_port: u16, is_secure: bool) -> Self {
        Self {
            peer_chain: peer_chain.into(),
            remote_addr,
            server_port,
            is_secure,
        }
    }

    /// Remote IP without the port, the form recorded in audit lines.
    pub fn remote_ip(&self) -> String {
        self.remote_addr.ip().to_string()
    }

    pub fn scheme(&self) -> &'static str {
        if self.is_secure {
            "https"
        } else {
            "http"
        }
    }

    pub fn has_certificates(&self) -> bool {
        !self.peer_chain.is_empty()
    }
}

// ============================================================================
// Certificate Debug
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDebugInfo {
    /// A client certificate chain was presented
    pub certificates_found: bool,

    /// Number of certificates in the presented chain
    pub certificate_count: usize,

    pub remote_addr: String,

    #[schema(example = "https")]
    pub scheme: String,

    #[schema(example = 8443)]
    pub server_port: u16,

    pub is_secure: bool,
}

impl From<&ClientConnection> for CertificateDebugInfo {
    fn from(connection: &ClientConnection) -> Self {
        Self {
            certificates_found: connection.has_certificates(),
            certificate_count: connection.peer_chain.len(),
            remote_addr: connection.remote_ip(),
            scheme: connection.scheme().to_string(),
            server_port: connection.server_port,
            is_secure: connection.is_secure,
        }
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    #[schema(example = "UP")]
    pub status: String,

    pub timestamp: DateTime<Utc>,

    pub message: String,

    /// TLS status of the listener
    #[schema(example = "Enabled on port 8443")]
    pub ssl: String,
}

// ============================================================================
// Error Response
// ============================================================================

/// Error body: a list of messages.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorMessage {
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            errors: vec![ErrorMessage {
                message: message.into(),
            }],
        }
    }
}
