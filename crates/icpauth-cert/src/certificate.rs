//! X.509 decoding and the read-only certificate view used by the pipeline.
//!
//! [`ParsedCertificate`] decodes DER once with `x509-parser` and keeps owned
//! copies of every field the identity pipeline needs, so it can be shared
//! across tasks without borrowing the original buffer.

use chrono::{DateTime, Utc};
use icpauth_core::CertificateError;
use std::io::{BufReader, Cursor};
use x509_parser::certificate::X509Certificate;
use x509_parser::objects::oid_registry;
use x509_parser::prelude::FromDer;
use x509_parser::time::ASN1Time;

/// Read access to the certificate fields the identity pipeline consumes.
///
/// DN and encoding accessors are fallible so alternative implementations
/// (lazy decoders, test doubles) can surface content anomalies.
pub trait CertificateView {
    /// Subject DN as x509-parser renders it: attributes in DER order joined
    /// with `, `, e.g. `CN=NAME:CPF, O=ICP-Brasil, C=BR`.
    ///
    /// This is not the RFC 2253 form (reversed order, `,` only) that Java's
    /// `X500Principal.getName()` produces. The `subject=` and `issuer=`
    /// fields of the audit line carry this form.
    fn subject_dn(&self) -> Result<&str, CertificateError>;

    /// Issuer DN in the same form as [`CertificateView::subject_dn`].
    fn issuer_dn(&self) -> Result<&str, CertificateError>;

    /// Serial number in decimal.
    fn serial_number(&self) -> &str;

    /// Signature algorithm name, e.g. `SHA256withRSA`.
    fn signature_algorithm(&self) -> &str;

    /// X.509 version, 1 to 3.
    fn version(&self) -> u32;

    fn not_before(&self) -> DateTime<Utc>;

    fn not_after(&self) -> DateTime<Utc>;

    /// Canonical DER encoding.
    fn encoded(&self) -> Result<&[u8], CertificateError>;
}

/// A decoded X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    der: Vec<u8>,
    subject_dn: String,
    issuer_dn: String,
    serial_number: String,
    signature_algorithm: String,
    version: u32,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl ParsedCertificate {
    /// Decodes a single DER certificate.
    ///
    /// Trailing bytes after the certificate are rejected.
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateError> {
        let (rest, cert) = X509Certificate::from_der(der)
            .map_err(|e| CertificateError::invalid_format(e.to_string()))?;
        if !rest.is_empty() {
            return Err(CertificateError::invalid_format(format!(
                "{} trailing bytes after certificate",
                rest.len()
            )));
        }

        let subject_dn = cert
            .subject()
            .to_string_with_registry(oid_registry())
            .map_err(|e| CertificateError::invalid_field("subject", e.to_string()))?;
        let issuer_dn = cert
            .issuer()
            .to_string_with_registry(oid_registry())
            .map_err(|e| CertificateError::invalid_field("issuer", e.to_string()))?;

        let validity = cert.validity();

        Ok(Self {
            der: der.to_vec(),
            subject_dn,
            issuer_dn,
            serial_number: cert.tbs_certificate.serial.to_string(),
            signature_algorithm: signature_algorithm_name(
                &cert.signature_algorithm.algorithm.to_id_string(),
            ),
            version: cert.version().0 + 1,
            not_before: to_utc("notBefore", &validity.not_before)?,
            not_after: to_utc("notAfter", &validity.not_after)?,
        })
    }

    /// Decodes every `CERTIFICATE` block of a PEM bundle, in file order.
    pub fn chain_from_pem(pem: &[u8]) -> Result<Vec<Self>, CertificateError> {
        let mut reader = BufReader::new(Cursor::new(pem));
        let ders = rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CertificateError::InvalidPem {
                reason: e.to_string(),
            })?;

        if ders.is_empty() {
            return Err(CertificateError::InvalidPem {
                reason: "no certificates found".to_string(),
            });
        }

        ders.iter().map(|der| Self::from_der(der)).collect()
    }

    /// Decodes a chain of DER certificates, leaf first.
    pub fn chain_from_der<B: AsRef<[u8]>>(ders: &[B]) -> Result<Vec<Self>, CertificateError> {
        ders.iter().map(|der| Self::from_der(der.as_ref())).collect()
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// True when subject and issuer DN strings are identical.
    pub fn is_self_signed(&self) -> bool {
        self.subject_dn == self.issuer_dn
    }
}

impl CertificateView for ParsedCertificate {
    fn subject_dn(&self) -> Result<&str, CertificateError> {
        Ok(&self.subject_dn)
    }

    fn issuer_dn(&self) -> Result<&str, CertificateError> {
        Ok(&self.issuer_dn)
    }

    fn serial_number(&self) -> &str {
        &self.serial_number
    }

    fn signature_algorithm(&self) -> &str {
        &self.signature_algorithm
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    fn encoded(&self) -> Result<&[u8], CertificateError> {
        Ok(&self.der)
    }
}

impl<T: CertificateView + ?Sized> CertificateView for &T {
    fn subject_dn(&self) -> Result<&str, CertificateError> {
        (**self).subject_dn()
    }

    fn issuer_dn(&self) -> Result<&str, CertificateError> {
        (**self).issuer_dn()
    }

    fn serial_number(&self) -> &str {
        (**self).serial_number()
    }

    fn signature_algorithm(&self) -> &str {
        (**self).signature_algorithm()
    }

    fn version(&self) -> u32 {
        (**self).version()
    }

    fn not_before(&self) -> DateTime<Utc> {
        (**self).not_before()
    }

    fn not_after(&self) -> DateTime<Utc> {
        (**self).not_after()
    }

    fn encoded(&self) -> Result<&[u8], CertificateError> {
        (**self).encoded()
    }
}

fn to_utc(field: &str, time: &ASN1Time) -> Result<DateTime<Utc>, CertificateError> {
    DateTime::from_timestamp(time.timestamp(), 0)
        .ok_or_else(|| CertificateError::invalid_field(field, "timestamp out of range"))
}

/// Maps a signature algorithm OID to its JCA name. Unknown OIDs are returned
/// in dotted form.
pub fn signature_algorithm_name(oid: &str) -> String {
    let name = match oid {
        "1.2.840.113549.1.1.4" => "MD5withRSA",
        "1.2.840.113549.1.1.5" => "SHA1withRSA",
        "1.2.840.113549.1.1.10" => "RSASSA-PSS",
        "1.2.840.113549.1.1.11" => "SHA256withRSA",
        "1.2.840.113549.1.1.12" => "SHA384withRSA",
        "1.2.840.113549.1.1.13" => "SHA512withRSA",
        "1.2.840.10045.4.1" => "SHA1withECDSA",
        "1.2.840.10045.4.3.2" => "SHA256withECDSA",
        "1.2.840.10045.4.3.3" => "SHA384withECDSA",
        "1.2.840.10045.4.3.4" => "SHA512withECDSA",
        "1.3.101.112" => "Ed25519",
        "1.3.101.113" => "Ed448",
        other => return other.to_string(),
    };
    name.to_string()
}
