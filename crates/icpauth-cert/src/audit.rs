//! The `LOGIN_CERTIFICADO` audit line.
//!
//! One line per successful extraction, pipe delimited `key=value` pairs in a
//! fixed order. Downstream log parsers consume this format; field names and
//! order must not change. Absent values render as `null`.

use chrono::SecondsFormat;
use icpauth_core::channel::TRANSACTION_TARGET;
use parking_lot::Mutex;
use std::fmt;
use tracing::info;

use crate::identity::IdentityRecord;

/// Event tag that opens every audit line.
pub const AUDIT_EVENT: &str = "LOGIN_CERTIFICADO";

/// Formats an [`IdentityRecord`] as an audit line.
pub struct AuditLine<'a>(pub &'a IdentityRecord);

impl fmt::Display for AuditLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.0;
        write!(
            f,
            "{}|timestamp={}|ip={}|cpf={}|serialNumber={}|fingerprint={}|issuer={}|subject={}|validUntil={}|algorithm={}|sessionId={}|userAgent={}",
            AUDIT_EVENT,
            r.validation_timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            r.remote_address,
            or_null(r.national_id.as_deref()),
            r.serial_number,
            r.fingerprint,
            r.issuer_dn,
            r.subject_dn,
            r.not_after.to_rfc3339_opts(SecondsFormat::Secs, true),
            r.signature_algorithm,
            r.session_id,
            or_null(r.user_agent.as_deref()),
        )
    }
}

fn or_null(value: Option<&str>) -> &str {
    value.unwrap_or("null")
}

/// Destination of audit lines.
pub trait AuditSink: Send + Sync {
    fn record_login(&self, record: &IdentityRecord);
}

/// Writes the audit line as an info event on the transaction channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record_login(&self, record: &IdentityRecord) {
        info!(target: TRANSACTION_TARGET, "{}", AuditLine(record));
    }
}

/// Keeps audit lines in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    lines: Mutex<Vec<String>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record_login(&self, record: &IdentityRecord) {
        self.lines.lock().push(AuditLine(record).to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record() -> IdentityRecord {
        IdentityRecord {
            subject_name: "Maria Souza:98765432100".to_string(),
            issuer_name: "AC SOLUTI".to_string(),
            national_id: Some("98765432100".to_string()),
            email: None,
            serial_number: "4660".to_string(),
            signature_algorithm: "SHA256withRSA".to_string(),
            version: 3,
            not_before: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            not_after: Utc.with_ymd_and_hms(2028, 1, 1, 0, 0, 0).unwrap(),
            valid: true,
            fingerprint: "AB".repeat(32),
            subject_dn: "CN=Maria Souza:98765432100, O=Test".to_string(),
            issuer_dn: "CN=AC SOLUTI, O=Test CA".to_string(),
            chain: Vec::new(),
            validation_timestamp: Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap(),
            remote_address: "10.0.0.7".to_string(),
            user_agent: None,
            session_id: "7d1c2a9e-1111-4222-8333-944445555666".to_string(),
        }
    }

    #[test]
    fn test_audit_line_format() {
        let line = AuditLine(&record()).to_string();
        assert_eq!(
            line,
            format!(
                "LOGIN_CERTIFICADO|timestamp=2026-03-15T12:00:00.000Z|ip=10.0.0.7|cpf=98765432100|serialNumber=4660|fingerprint={}|issuer=CN=AC SOLUTI, O=Test CA|subject=CN=Maria Souza:98765432100, O=Test|validUntil=2028-01-01T00:00:00Z|algorithm=SHA256withRSA|sessionId=7d1c2a9e-1111-4222-8333-944445555666|userAgent=null",
                "AB".repeat(32)
            )
        );
    }

    #[test]
    fn test_audit_line_missing_cpf() {
        let mut r = record();
        r.national_id = None;
        r.user_agent = Some("curl/8.5.0".to_string());

        let line = AuditLine(&r).to_string();
        assert!(line.contains("|cpf=null|"));
        assert!(line.ends_with("|userAgent=curl/8.5.0"));
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());
        sink.record_login(&record());
        assert_eq!(sink.len(), 1);
        assert!(sink.lines()[0].starts_with(AUDIT_EVENT));
    }
}
