//! Certificate fingerprints.

use icpauth_core::channel::TRANSACTION_TARGET;
use sha2::{Digest, Sha256};
use tracing::error;

use crate::certificate::CertificateView;

/// Recorded in place of a fingerprint when the digest cannot be computed.
pub const FINGERPRINT_ERROR: &str = "ERRO_FINGERPRINT";

/// Digest over a certificate's encoded form.
pub trait Fingerprinter: Send + Sync {
    /// Returns the fingerprint, or [`FINGERPRINT_ERROR`] on failure.
    fn fingerprint(&self, certificate: &dyn CertificateView) -> String;
}

/// Uppercase hex SHA-256 over the DER encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Fingerprinter;

impl Fingerprinter for Sha256Fingerprinter {
    fn fingerprint(&self, certificate: &dyn CertificateView) -> String {
        match certificate.encoded() {
            Ok(der) => sha256_fingerprint(der),
            Err(e) => {
                error!(target: TRANSACTION_TARGET, error = %e, "Error generating certificate fingerprint");
                FINGERPRINT_ERROR.to_string()
            }
        }
    }
}

/// 64 uppercase hex characters, two per digest byte.
pub fn sha256_fingerprint(der: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(der))
}
