//! Test PKI generation
//!
//! Issues a throwaway certificate authority, a server certificate for the mTLS
//! listener and ICP-Brasil style client certificates whose common name follows
//! the `NOME DO TITULAR:CPF` convention. Used by `icpauth-gen` and as test
//! fixtures; nothing here is meant for production issuance.

use anyhow::{Context, Result};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SanType,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::certificate::ParsedCertificate;

/// Configuration for the Certificate Authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaConfig {
    /// Common Name for the CA certificate
    pub common_name: String,
    /// Organization name
    pub organization: Option<String>,
    /// Organizational unit
    pub organizational_unit: Option<String>,
    /// Country code (2-letter)
    pub country: Option<String>,
    /// Validity period in days
    pub validity_days: u32,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            common_name: "AC ICPAUTH TESTE".to_string(),
            organization: Some("ICP-Brasil".to_string()),
            organizational_unit: Some("Autoridade Certificadora de Teste".to_string()),
            country: Some("BR".to_string()),
            validity_days: 3650, // 10 years
        }
    }
}

impl CaConfig {
    pub fn new(common_name: &str) -> Self {
        Self {
            common_name: common_name.to_string(),
            organization: None,
            organizational_unit: None,
            country: None,
            validity_days: 3650,
        }
    }

    pub fn with_organization(mut self, organization: &str) -> Self {
        self.organization = Some(organization.to_string());
        self
    }
}

/// Configuration for an end-user (e-CPF style) certificate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCertConfig {
    /// Holder name, first half of the common name
    pub holder_name: String,
    /// 11 digit CPF appended to the common name after a colon
    pub cpf: Option<String>,
    /// Email address, placed in the subject DN
    pub email: Option<String>,
    /// Organization name
    pub organization: Option<String>,
    /// Validity period in days, counted from now
    pub validity_days: u32,
    /// Explicit validity window, overrides `validity_days`
    #[serde(skip)]
    pub window: Option<(OffsetDateTime, OffsetDateTime)>,
}

impl ClientCertConfig {
    pub fn new(holder_name: &str) -> Self {
        Self {
            holder_name: holder_name.to_string(),
            cpf: None,
            email: None,
            organization: Some("ICP-Brasil".to_string()),
            validity_days: 365,
            window: None,
        }
    }

    pub fn with_cpf(mut self, cpf: &str) -> Self {
        self.cpf = Some(cpf.to_string());
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_organization(mut self, organization: &str) -> Self {
        self.organization = Some(organization.to_string());
        self
    }

    pub fn with_validity(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    pub fn with_window(mut self, not_before: OffsetDateTime, not_after: OffsetDateTime) -> Self {
        self.window = Some((not_before, not_after));
        self
    }

    /// The subject common name, `NAME:CPF` when a CPF is set.
    pub fn common_name(&self) -> String {
        match &self.cpf {
            Some(cpf) => format!("{}:{}", self.holder_name, cpf),
            None => self.holder_name.clone(),
        }
    }

    fn validity(&self) -> (OffsetDateTime, OffsetDateTime) {
        self.window.unwrap_or_else(|| {
            let now = OffsetDateTime::now_utc();
            (now, now + time::Duration::days(self.validity_days as i64))
        })
    }
}

/// Configuration for the listener's server certificate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCertConfig {
    pub common_name: String,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub validity_days: u32,
}

impl ServerCertConfig {
    pub fn new(common_name: &str) -> Self {
        Self {
            common_name: common_name.to_string(),
            dns_names: vec!["localhost".to_string()],
            ip_addresses: vec![IpAddr::from([127, 0, 0, 1])],
            validity_days: 825,
        }
    }
}

/// Generated Certificate Authority with private key
pub struct GeneratedCa {
    /// CA certificate in PEM format
    pub cert_pem: String,
    /// CA private key in PEM format
    pub key_pem: String,
}

impl std::fmt::Debug for GeneratedCa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedCa")
            .field("cert_pem", &"[CERTIFICATE]")
            .field("key_pem", &"[PRIVATE KEY]")
            .finish()
    }
}

impl GeneratedCa {
    /// Generate a new self-signed CA certificate
    pub fn generate(config: &CaConfig) -> Result<Self> {
        info!("Generating CA certificate: {}", config.common_name);

        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(DnType::CommonName, &config.common_name);
        if let Some(org) = &config.organization {
            distinguished_name.push(DnType::OrganizationName, org);
        }
        if let Some(ou) = &config.organizational_unit {
            distinguished_name.push(DnType::OrganizationalUnitName, ou);
        }
        if let Some(country) = &config.country {
            distinguished_name.push(DnType::CountryName, country);
        }

        let key_pair = KeyPair::generate().context("Failed to generate CA key pair")?;

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(config.validity_days as i64);

        let certificate = params
            .self_signed(&key_pair)
            .context("Failed to generate self-signed CA certificate")?;

        Ok(Self {
            cert_pem: certificate.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }

    /// Load CA from existing PEM strings
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        KeyPair::from_pem(key_pem).context("Failed to parse CA private key")?;
        CertificateParams::from_ca_cert_pem(cert_pem).context("Failed to parse CA certificate")?;

        Ok(Self {
            cert_pem: cert_pem.to_string(),
            key_pem: key_pem.to_string(),
        })
    }

    /// Load CA from PEM files on disk
    pub fn from_files(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert_pem = std::fs::read_to_string(cert_path)
            .with_context(|| format!("Failed to read CA cert: {}", cert_path.display()))?;
        let key_pem = std::fs::read_to_string(key_path)
            .with_context(|| format!("Failed to read CA key: {}", key_path.display()))?;

        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Save CA to PEM files
    pub fn save_to_files(&self, cert_path: &Path, key_path: &Path) -> Result<()> {
        write_pem(cert_path, &self.cert_pem)?;
        write_pem(key_path, &self.key_pem)?;

        info!("CA saved to {} and {}", cert_path.display(), key_path.display());
        Ok(())
    }

    /// DER encoding of the CA certificate
    pub fn cert_der(&self) -> Result<Vec<u8>> {
        first_der(&self.cert_pem)
    }

    /// Rebuilds a signing handle from the stored PEM pair.
    ///
    /// The returned certificate is only used as the issuer reference; its DN
    /// matches the stored CA so issued certificates chain to `cert_pem`.
    fn signer(&self) -> Result<(Certificate, KeyPair)> {
        let ca_key_pair =
            KeyPair::from_pem(&self.key_pem).context("Failed to parse CA private key")?;
        let ca_params = CertificateParams::from_ca_cert_pem(&self.cert_pem)
            .context("Failed to parse CA certificate")?;
        let ca_cert = ca_params
            .self_signed(&ca_key_pair)
            .context("Failed to recreate CA certificate for signing")?;
        Ok((ca_cert, ca_key_pair))
    }

    /// Issue an end-user certificate signed by this CA
    pub fn issue_client_cert(&self, config: &ClientCertConfig) -> Result<GeneratedClientCert> {
        let common_name = config.common_name();
        info!("Issuing client certificate for: {}", common_name);

        let (ca_cert, ca_key_pair) = self.signer()?;

        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(DnType::CommonName, common_name.as_str());
        if let Some(org) = &config.organization {
            distinguished_name.push(DnType::OrganizationName, org);
        }
        if let Some(email) = &config.email {
            // emailAddress, kept in the DN where ICP-Brasil certificates carry it
            distinguished_name.push(
                DnType::CustomDnType(vec![1, 2, 840, 113549, 1, 9, 1]),
                email.as_str(),
            );
        }

        let client_key_pair =
            KeyPair::generate().context("Failed to generate client key pair")?;

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

        if let Some(email) = &config.email {
            if let Ok(ia5_email) = rcgen::Ia5String::try_from(email.clone()) {
                params.subject_alt_names = vec![SanType::Rfc822Name(ia5_email)];
            }
        }

        let (not_before, not_after) = config.validity();
        params.not_before = not_before;
        params.not_after = not_after;

        let client_cert = params
            .signed_by(&client_key_pair, &ca_cert, &ca_key_pair)
            .context("Failed to sign client certificate with CA")?;

        debug!("Client certificate valid from {} to {}", not_before, not_after);

        Ok(GeneratedClientCert {
            cert_pem: client_cert.pem(),
            key_pem: client_key_pair.serialize_pem(),
            ca_cert_pem: self.cert_pem.clone(),
            common_name,
        })
    }

    /// Issue a TLS server certificate signed by this CA
    pub fn issue_server_cert(&self, config: &ServerCertConfig) -> Result<GeneratedClientCert> {
        info!("Issuing server certificate for: {}", config.common_name);

        let (ca_cert, ca_key_pair) = self.signer()?;

        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(DnType::CommonName, &config.common_name);

        let server_key_pair =
            KeyPair::generate().context("Failed to generate server key pair")?;

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        let mut sans = Vec::new();
        for dns in &config.dns_names {
            let name = rcgen::Ia5String::try_from(dns.clone())
                .with_context(|| format!("Invalid DNS name: {}", dns))?;
            sans.push(SanType::DnsName(name));
        }
        sans.extend(config.ip_addresses.iter().copied().map(SanType::IpAddress));
        params.subject_alt_names = sans;

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(config.validity_days as i64);

        let server_cert = params
            .signed_by(&server_key_pair, &ca_cert, &ca_key_pair)
            .context("Failed to sign server certificate with CA")?;

        Ok(GeneratedClientCert {
            cert_pem: server_cert.pem(),
            key_pem: server_key_pair.serialize_pem(),
            ca_cert_pem: self.cert_pem.clone(),
            common_name: config.common_name.clone(),
        })
    }
}

/// Generated leaf certificate with private key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedClientCert {
    /// Certificate in PEM format
    pub cert_pem: String,
    /// Private key in PEM format
    pub key_pem: String,
    /// Issuing CA certificate in PEM format
    pub ca_cert_pem: String,
    /// Common name from the certificate
    pub common_name: String,
}

impl GeneratedClientCert {
    /// DER encoding of the leaf certificate
    pub fn cert_der(&self) -> Result<Vec<u8>> {
        first_der(&self.cert_pem)
    }

    /// Leaf followed by its issuing CA, the order a TLS peer presents them.
    pub fn chain(&self) -> Result<Vec<ParsedCertificate>> {
        let mut bundle = self.cert_pem.clone();
        bundle.push_str(&self.ca_cert_pem);
        Ok(ParsedCertificate::chain_from_pem(bundle.as_bytes())?)
    }

    /// Save to PEM files
    pub fn save_to_files(
        &self,
        cert_path: &Path,
        key_path: &Path,
        ca_path: Option<&Path>,
    ) -> Result<()> {
        write_pem(cert_path, &self.cert_pem)?;
        write_pem(key_path, &self.key_pem)?;
        if let Some(ca_path) = ca_path {
            write_pem(ca_path, &self.ca_cert_pem)?;
        }

        info!("Certificate saved to {} and {}", cert_path.display(), key_path.display());
        Ok(())
    }
}

fn write_pem(path: &Path, pem: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, pem).with_context(|| format!("Failed to write {}", path.display()))
}

fn first_der(pem: &str) -> Result<Vec<u8>> {
    let chain = ParsedCertificate::chain_from_pem(pem.as_bytes())?;
    chain
        .into_iter()
        .next()
        .map(|cert| cert.der().to_vec())
        .context("No certificate found in PEM")
}
