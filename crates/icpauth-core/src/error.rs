//! Error types for the ICP-Brasil certificate authenticator.
//!
//! The taxonomy mirrors how failures are handled at the HTTP boundary:
//!
//! - [`InputError`]: the caller did not hand over a certificate chain. This is a
//!   precondition violation and maps to a client error.
//! - [`ExtractionError`]: the chain was there but deriving the identity failed.
//!   Only a message is kept, never the underlying error type.
//! - [`CertificateError`]: DER/PEM decoding failures, raised before the pipeline.
//! - [`ConfigError`]: configuration loading and validation.
//!
//! All errors are serializable so they can be embedded in API responses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using IcpAuthError as the error type.
pub type Result<T> = std::result::Result<T, IcpAuthError>;

/// Top-level error type for all authenticator operations.
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum IcpAuthError {
    /// Caller precondition violations
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Identity extraction failures
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Certificate decoding errors
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal errors that shouldn't normally occur
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IcpAuthError {
    /// Returns true if the error was caused by the caller rather than by the
    /// certificate content or the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, IcpAuthError::Input(_))
    }
}

/// Caller precondition violations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum InputError {
    /// No certificate chain, or an empty one, was supplied
    #[error("certificate chain not provided")]
    MissingCertificateChain,
}

/// Failure while deriving identity fields from a well-formed chain.
///
/// Carries only the message of the underlying cause.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("failed to process certificate: {message}")]
pub struct ExtractionError {
    pub message: String,
}

impl ExtractionError {
    /// Creates an extraction error from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<CertificateError> for ExtractionError {
    fn from(err: CertificateError) -> Self {
        Self::new(err.to_string())
    }
}

/// Errors raised while decoding certificates.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CertificateError {
    /// DER structure could not be parsed
    #[error("Invalid certificate encoding: {reason}")]
    InvalidFormat { reason: String },

    /// PEM bundle could not be parsed
    #[error("Invalid PEM data: {reason}")]
    InvalidPem { reason: String },

    /// A field could not be represented (e.g. timestamp out of range)
    #[error("Invalid value for certificate field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// The encoded form of the certificate is not available
    #[error("Encoded certificate not available")]
    EncodingUnavailable,
}

impl CertificateError {
    /// Creates an invalid format error.
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors related to configuration.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
