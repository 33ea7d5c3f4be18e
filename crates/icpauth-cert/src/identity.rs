//! Certificate chain to identity record.
//!
//! [`IdentityExtractor`] turns a chain the transport layer has already
//! verified into an [`IdentityRecord`] and writes the audit line. It performs
//! no trust or revocation checks of its own.
//!
//! Failure policy:
//! - an empty chain is the caller's mistake and yields [`InputError`] without
//!   logging an audit line;
//! - anything going wrong while reading the chain yields [`ExtractionError`]
//!   carrying only a message;
//! - a missing CPF or email, an uncomputable fingerprint or an expired
//!   certificate degrade one field and still produce a record.

use chrono::{DateTime, Utc};
use icpauth_core::channel::TRANSACTION_TARGET;
use icpauth_core::{CertificateError, ExtractionError, InputError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::audit::{AuditSink, TracingAuditSink};
use crate::certificate::{CertificateView, ParsedCertificate};
use crate::chain::{summarize, ChainLinkSummary};
use crate::dn::{extract_common_name, SubjectAttributes};
use crate::fingerprint::{Fingerprinter, Sha256Fingerprinter};
use crate::session::{SessionIdGenerator, UuidSessionIds};
use crate::validity::{Clock, SystemClock, ValidityChecker};

/// Identity and audit data derived from one authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    /// Common name of the holder, `NAME:CPF` for e-CPF certificates
    pub subject_name: String,
    /// Common name of the issuing CA
    pub issuer_name: String,
    /// 11 digit CPF found in the subject DN
    #[serde(rename = "cpf")]
    pub national_id: Option<String>,
    pub email: Option<String>,
    pub serial_number: String,
    pub signature_algorithm: String,
    pub version: u32,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Inside the validity window at extraction time. Says nothing about trust.
    pub valid: bool,
    /// Uppercase hex SHA-256 of the leaf DER, or `ERRO_FINGERPRINT`
    pub fingerprint: String,
    #[serde(rename = "subjectDN")]
    pub subject_dn: String,
    #[serde(rename = "issuerDN")]
    pub issuer_dn: String,
    /// One entry per presented certificate, leaf first
    #[serde(rename = "certificateChain")]
    pub chain: Vec<ChainLinkSummary>,
    pub validation_timestamp: DateTime<Utc>,
    pub remote_address: String,
    pub user_agent: Option<String>,
    pub session_id: String,
}

/// Builds [`IdentityRecord`]s. Stateless apart from its injected
/// collaborators, so one instance can serve every request.
#[derive(Clone)]
pub struct IdentityExtractor {
    validity: ValidityChecker,
    fingerprinter: Arc<dyn Fingerprinter>,
    session_ids: Arc<dyn SessionIdGenerator>,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for IdentityExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityExtractor").finish_non_exhaustive()
    }
}

impl Default for IdentityExtractor {
    fn default() -> Self {
        Self::new(
            Arc::new(SystemClock),
            Arc::new(Sha256Fingerprinter),
            Arc::new(UuidSessionIds),
            Arc::new(TracingAuditSink),
        )
    }
}

impl IdentityExtractor {
    pub fn new(
        clock: Arc<dyn Clock>,
        fingerprinter: Arc<dyn Fingerprinter>,
        session_ids: Arc<dyn SessionIdGenerator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            validity: ValidityChecker::new(clock),
            fingerprinter,
            session_ids,
            audit,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.validity = ValidityChecker::new(clock);
        self
    }

    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    pub fn with_session_ids(mut self, session_ids: Arc<dyn SessionIdGenerator>) -> Self {
        self.session_ids = session_ids;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Extracts the identity of the leaf (`chain[0]`) and summarizes the chain.
    pub fn extract<C: CertificateView>(
        &self,
        chain: &[C],
        remote_address: &str,
        user_agent: Option<&str>,
    ) -> Result<IdentityRecord> {
        info!(target: TRANSACTION_TARGET, "Processing client certificate");

        if chain.is_empty() {
            return Err(InputError::MissingCertificateChain.into());
        }

        let record = self
            .build(chain, remote_address, user_agent)
            .map_err(|e| {
                error!(target: TRANSACTION_TARGET, error = %e, "Certificate processing failed");
                ExtractionError::from(e)
            })?;

        self.audit.record_login(&record);
        Ok(record)
    }

    /// Decodes a DER chain, leaf first, then runs [`IdentityExtractor::extract`].
    pub fn extract_der<B: AsRef<[u8]>>(
        &self,
        ders: &[B],
        remote_address: &str,
        user_agent: Option<&str>,
    ) -> Result<IdentityRecord> {
        if ders.is_empty() {
            return Err(InputError::MissingCertificateChain.into());
        }

        let chain = ParsedCertificate::chain_from_der(ders).map_err(|e| {
            error!(target: TRANSACTION_TARGET, error = %e, "Certificate processing failed");
            ExtractionError::from(e)
        })?;

        self.extract(&chain, remote_address, user_agent)
    }

    fn build<C: CertificateView>(
        &self,
        chain: &[C],
        remote_address: &str,
        user_agent: Option<&str>,
    ) -> std::result::Result<IdentityRecord, CertificateError> {
        let leaf = &chain[0];
        let subject_dn = leaf.subject_dn()?;
        let issuer_dn = leaf.issuer_dn()?;
        let subject = SubjectAttributes::parse(subject_dn);

        let fingerprint = self.fingerprinter.fingerprint(leaf);
        let valid = self
            .validity
            .is_currently_valid(leaf.not_before(), leaf.not_after());

        let links = chain
            .iter()
            .map(summarize)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(
            target: TRANSACTION_TARGET,
            links = links.len(),
            valid,
            "Certificate chain summarized"
        );

        Ok(IdentityRecord {
            subject_name: subject.common_name,
            issuer_name: extract_common_name(issuer_dn),
            national_id: subject.national_id,
            email: subject.email,
            serial_number: leaf.serial_number().to_string(),
            signature_algorithm: leaf.signature_algorithm().to_string(),
            version: leaf.version(),
            not_before: leaf.not_before(),
            not_after: leaf.not_after(),
            valid,
            fingerprint,
            subject_dn: subject_dn.to_string(),
            issuer_dn: issuer_dn.to_string(),
            chain: links,
            validation_timestamp: self.validity.now(),
            remote_address: remote_address.to_string(),
            user_agent: user_agent.map(str::to_string),
            session_id: self.session_ids.next_id(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::fingerprint::FINGERPRINT_ERROR;
    use crate::generator::{CaConfig, ClientCertConfig, GeneratedCa};
    use crate::validity::FixedClock;
    use chrono::{Duration, TimeZone};
    use icpauth_core::IcpAuthError;

    /// Leaf whose DN cannot be read.
    struct BrokenSubject;

    impl CertificateView for BrokenSubject {
        fn subject_dn(&self) -> std::result::Result<&str, CertificateError> {
            Err(CertificateError::invalid_field("subject", "unsupported string type"))
        }
        fn issuer_dn(&self) -> std::result::Result<&str, CertificateError> {
            Ok("CN=AC")
        }
        fn serial_number(&self) -> &str {
            "1"
        }
        fn signature_algorithm(&self) -> &str {
            "SHA256withRSA"
        }
        fn version(&self) -> u32 {
            3
        }
        fn not_before(&self) -> DateTime<Utc> {
            DateTime::UNIX_EPOCH
        }
        fn not_after(&self) -> DateTime<Utc> {
            DateTime::UNIX_EPOCH
        }
        fn encoded(&self) -> std::result::Result<&[u8], CertificateError> {
            Err(CertificateError::EncodingUnavailable)
        }
    }

    /// Wraps a real certificate but hides its encoding.
    struct NoEncoding(ParsedCertificate);

    impl CertificateView for NoEncoding {
        fn subject_dn(&self) -> std::result::Result<&str, CertificateError> {
            self.0.subject_dn()
        }
        fn issuer_dn(&self) -> std::result::Result<&str, CertificateError> {
            self.0.issuer_dn()
        }
        fn serial_number(&self) -> &str {
            self.0.serial_number()
        }
        fn signature_algorithm(&self) -> &str {
            self.0.signature_algorithm()
        }
        fn version(&self) -> u32 {
            self.0.version()
        }
        fn not_before(&self) -> DateTime<Utc> {
            self.0.not_before()
        }
        fn not_after(&self) -> DateTime<Utc> {
            self.0.not_after()
        }
        fn encoded(&self) -> std::result::Result<&[u8], CertificateError> {
            Err(CertificateError::EncodingUnavailable)
        }
    }

    fn extractor_with(sink: Arc<MemoryAuditSink>) -> IdentityExtractor {
        IdentityExtractor::default().with_audit_sink(sink)
    }

    fn issued_chain(config: ClientCertConfig) -> Vec<ParsedCertificate> {
        let ca = GeneratedCa::generate(&CaConfig::new("AC SOLUTI").with_organization("Test CA"))
            .unwrap();
        ca.issue_client_cert(&config).unwrap().chain().unwrap()
    }

    #[test]
    fn test_empty_chain_is_input_error() {
        let sink = Arc::new(MemoryAuditSink::new());
        let extractor = extractor_with(sink.clone());

        let chain: Vec<ParsedCertificate> = Vec::new();
        let err = extractor.extract(&chain, "127.0.0.1", None).unwrap_err();

        assert!(matches!(
            err,
            IcpAuthError::Input(InputError::MissingCertificateChain)
        ));
        assert!(sink.is_empty());

        let ders: Vec<Vec<u8>> = Vec::new();
        assert!(extractor
            .extract_der(&ders, "127.0.0.1", None)
            .unwrap_err()
            .is_client_error());
    }

    #[test]
    fn test_record_fields() {
        let sink = Arc::new(MemoryAuditSink::new());
        let chain = issued_chain(
            ClientCertConfig::new("Maria Souza")
                .with_cpf("98765432100")
                .with_email("maria.souza@example.com.br")
                .with_organization("Test"),
        );

        let record = extractor_with(sink.clone())
            .extract(&chain, "192.168.0.10", Some("Mozilla/5.0"))
            .unwrap();

        assert_eq!(record.subject_name, "Maria Souza:98765432100");
        assert_eq!(record.national_id.as_deref(), Some("98765432100"));
        assert_eq!(record.email.as_deref(), Some("maria.souza@example.com.br"));
        assert_eq!(record.issuer_name, "AC SOLUTI");
        assert_eq!(record.issuer_dn, "CN=AC SOLUTI, O=Test CA");
        assert_eq!(record.version, 3);
        assert_eq!(record.fingerprint.len(), 64);
        assert_eq!(record.chain.len(), chain.len());
        assert_eq!(record.remote_address, "192.168.0.10");
        assert_eq!(record.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert!(record.valid);

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("|cpf=98765432100|"));
        assert!(lines[0].contains(&format!("|sessionId={}|", record.session_id)));
    }

    #[test]
    fn test_expired_certificate_degrades_valid_flag() {
        let chain = issued_chain(ClientCertConfig::new("Ana").with_cpf("11122233344"));
        let later = Utc::now() + Duration::days(4000);

        let record = IdentityExtractor::default()
            .with_clock(Arc::new(FixedClock(later)))
            .with_audit_sink(Arc::new(MemoryAuditSink::new()))
            .extract(&chain, "10.0.0.1", None)
            .unwrap();

        assert!(!record.valid);
        assert_eq!(record.validation_timestamp, later);
    }

    #[test]
    fn test_missing_encoding_uses_sentinel() {
        let chain: Vec<NoEncoding> = issued_chain(ClientCertConfig::new("Sem Fingerprint"))
            .into_iter()
            .map(NoEncoding)
            .collect();

        let record = extractor_with(Arc::new(MemoryAuditSink::new()))
            .extract(&chain, "10.0.0.1", None)
            .unwrap();

        assert_eq!(record.fingerprint, FINGERPRINT_ERROR);
        assert!(record.national_id.is_none());
    }

    #[test]
    fn test_unreadable_dn_is_extraction_error() {
        let sink = Arc::new(MemoryAuditSink::new());
        let err = extractor_with(sink.clone())
            .extract(&[BrokenSubject], "10.0.0.1", None)
            .unwrap_err();

        match err {
            IcpAuthError::Extraction(e) => assert!(e.message.contains("subject")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(sink.is_empty());
    }

    #[test]
    fn test_undecodable_der_is_extraction_error() {
        let err = extractor_with(Arc::new(MemoryAuditSink::new()))
            .extract_der(&[vec![0x30, 0x00]], "10.0.0.1", None)
            .unwrap_err();
        assert!(matches!(err, IcpAuthError::Extraction(_)));
    }

    #[test]
    fn test_fresh_session_per_call() {
        let chain = issued_chain(ClientCertConfig::new("Ana"));
        let extractor = extractor_with(Arc::new(MemoryAuditSink::new()));

        let a = extractor.extract(&chain, "10.0.0.1", None).unwrap();
        let b = extractor.extract(&chain, "10.0.0.1", None).unwrap();
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn test_record_json_names() {
        let chain = issued_chain(ClientCertConfig::new("Ana").with_cpf("11122233344"));
        let fixed = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let record = extractor_with(Arc::new(MemoryAuditSink::new()))
            .with_clock(Arc::new(FixedClock(fixed)))
            .extract(&chain, "10.0.0.1", None)
            .unwrap();

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["cpf"], "11122233344");
        assert!(json["email"].is_null());
        assert!(json["userAgent"].is_null());
        assert_eq!(json["subjectDN"], record.subject_dn);
        assert_eq!(json["certificateChain"].as_array().unwrap().len(), 2);
        assert_eq!(json["certificateChain"][1]["isRoot"], true);
        assert_eq!(json["validationTimestamp"], "2026-03-15T12:00:00Z");
    }
}
