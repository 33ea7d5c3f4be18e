//! rustls server configuration with client certificate verification

use anyhow::{anyhow, Context, Result};
use icpauth_core::config::{ClientAuthMode, TlsConfig};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig as TlsServerConfig};
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::info;

/// Loads every certificate from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open certificate file: {}", path.display()))?;
    let mut reader = std::io::BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse certificates: {}", path.display()))?;

    if certs.is_empty() {
        return Err(anyhow!("No certificates found in {}", path.display()));
    }
    Ok(certs)
}

/// Loads the first private key from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open private key: {}", path.display()))?;
    let mut reader = std::io::BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .context("Failed to read private key")?
        .ok_or_else(|| anyhow!("No private key found in {}", path.display()))
}

/// Server config that asks for (or requires) a client certificate issued by
/// the configured CA bundle.
///
/// Chains that do not verify against the bundle are always rejected during
/// the handshake; `optional` only admits clients that send no certificate.
pub fn build_server_config(tls: &TlsConfig) -> Result<Arc<TlsServerConfig>> {
    info!(
        cert_path = %tls.cert_path.display(),
        key_path = %tls.key_path.display(),
        client_ca_path = %tls.client_ca_path.display(),
        client_auth = ?tls.client_auth,
        "Building TLS server configuration"
    );

    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let certs = load_certs(&tls.cert_path)?;
    let key = load_private_key(&tls.key_path)?;

    let mut roots = RootCertStore::empty();
    for cert in load_certs(&tls.client_ca_path)? {
        roots.add(cert).context("Failed to add client CA certificate")?;
    }
    info!(trust_anchors = roots.len(), "Loaded client CA bundle");

    let builder = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone());
    let verifier = match tls.client_auth {
        ClientAuthMode::Required => builder.build(),
        ClientAuthMode::Optional => builder.allow_unauthenticated().build(),
    }
    .context("Failed to build client certificate verifier")?;

    let mut server_config = TlsServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("Unsupported TLS protocol versions")?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .context("Invalid server certificate or key")?;

    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(server_config))
}

pub fn build_tls_acceptor(tls: &TlsConfig) -> Result<TlsAcceptor> {
    Ok(TlsAcceptor::from(build_server_config(tls)?))
}
