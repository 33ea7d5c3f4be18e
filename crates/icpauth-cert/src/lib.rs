//! ICP-Brasil client certificate identity extraction
//!
//! Turns a client certificate chain, already verified by the TLS layer, into
//! an [`IdentityRecord`] and a `LOGIN_CERTIFICADO` audit line.
//!
//! ```no_run
//! use icpauth_cert::{IdentityExtractor, ParsedCertificate};
//!
//! # fn main() -> anyhow::Result<()> {
//! let pem = std::fs::read("client-chain.pem")?;
//! let chain = ParsedCertificate::chain_from_pem(&pem)?;
//!
//! let record = IdentityExtractor::default().extract(&chain, "10.0.0.7", Some("curl/8.5.0"))?;
//! println!("{} ({:?})", record.subject_name, record.national_id);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod certificate;
pub mod chain;
pub mod dn;
pub mod fingerprint;
pub mod generator;
pub mod identity;
pub mod session;
pub mod validity;

pub use audit::{AuditLine, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use certificate::{CertificateView, ParsedCertificate};
pub use chain::{summarize, ChainLinkSummary};
pub use dn::{
    attribute_value, email_attribute, extract_common_name, extract_email, extract_national_id,
    national_id_from_common_name,
};
pub use fingerprint::{sha256_fingerprint, Fingerprinter, Sha256Fingerprinter, FINGERPRINT_ERROR};
pub use generator::{CaConfig, ClientCertConfig, GeneratedCa, GeneratedClientCert, ServerCertConfig};
pub use identity::{IdentityExtractor, IdentityRecord};
pub use session::{SessionIdGenerator, UuidSessionIds};
pub use validity::{Clock, FixedClock, SystemClock, ValidityChecker};
