//! Distinguished Name attribute extraction.
//!
//! ICP-Brasil certificates carry the holder's CPF inside the common name
//! (`CN=NOME DO TITULAR:12345678901`) instead of a dedicated attribute, so the
//! CPF and email scans run over the whole DN string. The common name lookup is
//! attribute scoped.
//!
//! Matching is intentionally permissive: no RFC 4514 quoting or escaping, the
//! first match wins. Downstream audit parsers rely on these exact results.

use regex::Regex;
use std::sync::LazyLock;

static COMMON_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CN=([^,]+)").expect("common name pattern is valid"));

static DIGIT_RUN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("digit run pattern is valid"));

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email pattern is valid")
});

/// Number of digits in a CPF.
pub const NATIONAL_ID_LEN: usize = 11;

/// Returns the value of the first `CN=` attribute, trimmed, up to the next
/// comma. A DN without `CN=` is returned unchanged.
pub fn extract_common_name(dn: &str) -> String {
    COMMON_NAME_PATTERN
        .captures(dn)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| dn.to_string())
}

/// Returns the first run of exactly eleven consecutive ASCII digits.
///
/// Runs are maximal: a twelve digit serial never yields its first eleven
/// digits.
pub fn extract_national_id(subject: &str) -> Option<String> {
    DIGIT_RUN_PATTERN
        .find_iter(subject)
        .find(|m| m.as_str().len() == NATIONAL_ID_LEN)
        .map(|m| m.as_str().to_string())
}

/// Returns the first email-shaped substring.
pub fn extract_email(subject: &str) -> Option<String> {
    EMAIL_PATTERN
        .find(subject)
        .map(|m| m.as_str().to_string())
}

/// Attribute names the email address appears under, depending on which
/// library rendered the DN.
const EMAIL_ATTRIBUTES: [&str; 3] = ["EMAILADDRESS", "Email", "1.2.840.113549.1.9.1"];

/// Value of the first `NAME=value` component whose name matches `attribute`
/// (ASCII case-insensitive). Components are split on commas and trimmed.
///
/// Unlike [`extract_common_name`] this is attribute scoped: `OU=CN=x` does not
/// match `CN`.
pub fn attribute_value<'a>(dn: &'a str, attribute: &str) -> Option<&'a str> {
    dn.split(',').map(str::trim).find_map(|part| {
        let (name, value) = part.split_once('=')?;
        name.eq_ignore_ascii_case(attribute).then_some(value)
    })
}

/// Email address from the DN's email attribute, if any.
pub fn email_attribute(dn: &str) -> Option<&str> {
    EMAIL_ATTRIBUTES
        .iter()
        .find_map(|attribute| attribute_value(dn, attribute))
}

/// CPF carried in an e-CPF common name: the first `:`-separated segment that
/// is exactly eleven digits. A CN without a colon yields `None`.
pub fn national_id_from_common_name(common_name: &str) -> Option<&str> {
    if !common_name.contains(':') {
        return None;
    }
    common_name.split(':').map(str::trim).find(|part| {
        part.len() == NATIONAL_ID_LEN && part.bytes().all(|b| b.is_ascii_digit())
    })
}

/// Attributes derived from a subject DN in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectAttributes {
    pub common_name: String,
    pub national_id: Option<String>,
    pub email: Option<String>,
}

impl SubjectAttributes {
    pub fn parse(subject_dn: &str) -> Self {
        Self {
            common_name: extract_common_name(subject_dn),
            national_id: extract_national_id(subject_dn),
            email: extract_email(subject_dn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_name_stops_at_comma() {
        assert_eq!(
            extract_common_name("CN=Maria Souza:98765432100, O=Test"),
            "Maria Souza:98765432100"
        );
    }

    #[test]
    fn test_common_name_trimmed() {
        assert_eq!(extract_common_name("O=Test,CN= AC SOLUTI ,C=BR"), "AC SOLUTI");
    }

    #[test]
    fn test_common_name_first_match_wins() {
        assert_eq!(
            extract_common_name("CN=Primeiro, OU=x, CN=Segundo"),
            "Primeiro"
        );
    }

    #[test]
    fn test_common_name_missing_returns_input() {
        let dn = "O=ICP-Brasil, C=BR";
        assert_eq!(extract_common_name(dn), dn);
        assert_eq!(extract_common_name(""), "");
    }

    #[test]
    fn test_common_name_ignores_quoting() {
        // No escaping support: the quoted comma terminates the value.
        assert_eq!(
            extract_common_name("CN=\"Silva, Joao\", O=Test"),
            "\"Silva"
        );
    }

    #[test]
    fn test_national_id_from_common_name() {
        assert_eq!(
            extract_national_id("CN=Maria Souza:98765432100, O=Test"),
            Some("98765432100".to_string())
        );
    }

    #[test]
    fn test_national_id_rejects_ten_digits() {
        assert_eq!(extract_national_id("CN=Fulano:1234567890, O=Test"), None);
    }

    #[test]
    fn test_national_id_rejects_twelve_digits() {
        assert_eq!(extract_national_id("SERIALNUMBER=123456789012"), None);
    }

    #[test]
    fn test_national_id_skips_longer_runs() {
        assert_eq!(
            extract_national_id("SERIALNUMBER=123456789012, CN=Ana:11122233344"),
            Some("11122233344".to_string())
        );
    }

    #[test]
    fn test_national_id_scans_whole_string() {
        // Not scoped to CN: an OU carrying eleven digits is picked up first.
        assert_eq!(
            extract_national_id("OU=05961854000117x, OU=12345678901, CN=Ana"),
            Some("12345678901".to_string())
        );
    }

    #[test]
    fn test_email_extracted() {
        assert_eq!(
            extract_email("CN=Joao, Email=joao.silva@tce.sp.gov.br, O=TCE"),
            Some("joao.silva@tce.sp.gov.br".to_string())
        );
    }

    #[test]
    fn test_email_requires_alpha_tld() {
        assert_eq!(extract_email("CN=user@host.1"), None);
        assert_eq!(extract_email("CN=Sem Email, O=Test"), None);
    }

    #[test]
    fn test_subject_attributes() {
        let attrs = SubjectAttributes::parse("CN=Maria Souza:98765432100, O=Test");
        assert_eq!(attrs.common_name, "Maria Souza:98765432100");
        assert_eq!(attrs.national_id.as_deref(), Some("98765432100"));
        assert!(attrs.email.is_none());
    }

    #[test]
    fn test_attribute_value_is_scoped() {
        let dn = "OU=CN=falso, CN=Maria Souza:98765432100, O=Test";
        assert_eq!(attribute_value(dn, "CN"), Some("Maria Souza:98765432100"));
        assert_eq!(attribute_value(dn, "o"), Some("Test"));
        assert_eq!(attribute_value(dn, "C"), None);
    }

    #[test]
    fn test_email_attribute_names() {
        assert_eq!(
            email_attribute("CN=Joao, Email=joao.silva@tce.sp.gov.br"),
            Some("joao.silva@tce.sp.gov.br")
        );
        assert_eq!(
            email_attribute("EMAILADDRESS=ana@example.com, CN=Ana"),
            Some("ana@example.com")
        );
        assert_eq!(email_attribute("CN=Sem Email, O=Test"), None);
    }

    #[test]
    fn test_national_id_from_common_name_segments() {
        assert_eq!(
            national_id_from_common_name("MARIA SOUZA:98765432100"),
            Some("98765432100")
        );
        assert_eq!(
            national_id_from_common_name("FULANO: 12345678901 :extra"),
            Some("12345678901")
        );
        assert_eq!(national_id_from_common_name("MARIA SOUZA 98765432100"), None);
        assert_eq!(national_id_from_common_name("FULANO:1234567890"), None);
    }
}
