//! Per-certificate summaries of a presented chain.

use chrono::{DateTime, Utc};
use icpauth_core::CertificateError;
use serde::{Deserialize, Serialize};

use crate::certificate::CertificateView;
use crate::dn::extract_common_name;

/// Compact view of one certificate in a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ChainLinkSummary {
    pub subject_name: String,
    pub issuer_name: String,
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Subject DN equals issuer DN, compared as exact strings
    pub is_root: bool,
}

/// Builds the summary for one certificate. No validity or trust judgement.
pub fn summarize<C: CertificateView + ?Sized>(
    certificate: &C,
) -> Result<ChainLinkSummary, CertificateError> {
    let subject_dn = certificate.subject_dn()?;
    let issuer_dn = certificate.issuer_dn()?;

    Ok(ChainLinkSummary {
        subject_name: extract_common_name(subject_dn),
        issuer_name: extract_common_name(issuer_dn),
        serial_number: certificate.serial_number().to_string(),
        not_before: certificate.not_before(),
        not_after: certificate.not_after(),
        is_root: subject_dn == issuer_dn,
    })
}
