//! icpauth-gen - test PKI for local mutual TLS runs
//!
//! Writes a certificate authority, a server certificate for the listener and
//! an ICP-Brasil style client certificate (`CN=NAME:CPF`) into one directory.

use anyhow::{bail, Context, Result};
use clap::Parser;
use icpauth_cert::{CaConfig, ClientCertConfig, GeneratedCa, ServerCertConfig};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::info;

/// Generate a test CA, server and client certificates for icpauth
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Output directory
    #[arg(short, long, default_value = "certs")]
    out_dir: PathBuf,

    /// Reuse an existing CA certificate (requires --ca-key)
    #[arg(long, requires = "ca_key")]
    ca_cert: Option<PathBuf>,

    /// Private key of the existing CA
    #[arg(long, requires = "ca_cert")]
    ca_key: Option<PathBuf>,

    /// Common name of a newly generated CA
    #[arg(long, default_value = "AC ICPAUTH TESTE")]
    ca_cn: String,

    /// Server certificate common name
    #[arg(long, default_value = "localhost")]
    server_cn: String,

    /// Extra DNS names for the server certificate
    #[arg(long = "dns")]
    dns_names: Vec<String>,

    /// Extra IP addresses for the server certificate
    #[arg(long = "ip")]
    ip_addresses: Vec<IpAddr>,

    /// Certificate holder name
    #[arg(long, default_value = "FULANO DE TAL")]
    name: String,

    /// Holder CPF, 11 digits
    #[arg(long, default_value = "12345678901")]
    cpf: String,

    /// Holder email address
    #[arg(long)]
    email: Option<String>,

    /// Client certificate organization
    #[arg(long)]
    organization: Option<String>,

    /// Client certificate validity in days
    #[arg(long, default_value = "365")]
    validity_days: u32,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn load_or_generate_ca(args: &Args) -> Result<GeneratedCa> {
    match (&args.ca_cert, &args.ca_key) {
        (Some(cert), Some(key)) => GeneratedCa::from_files(cert, key),
        _ => {
            let ca = GeneratedCa::generate(&CaConfig::new(&args.ca_cn))?;
            ca.save_to_files(&args.out_dir.join("ca.pem"), &args.out_dir.join("ca.key"))?;
            Ok(ca)
        }
    }
}

fn run(args: &Args) -> Result<()> {
    if args.cpf.len() != 11 || !args.cpf.bytes().all(|b| b.is_ascii_digit()) {
        bail!("CPF must be exactly 11 digits, got {:?}", args.cpf);
    }

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;

    let ca = load_or_generate_ca(args)?;
    let ca_bundle = args.out_dir.join("client-ca.pem");
    std::fs::write(&ca_bundle, &ca.cert_pem)
        .with_context(|| format!("Failed to write {}", ca_bundle.display()))?;

    let mut server_config = ServerCertConfig::new(&args.server_cn);
    server_config.dns_names.extend(args.dns_names.iter().cloned());
    server_config.ip_addresses.extend(args.ip_addresses.iter().copied());
    let server = ca.issue_server_cert(&server_config)?;
    server.save_to_files(
        &args.out_dir.join("server.pem"),
        &args.out_dir.join("server.key"),
        None,
    )?;

    let mut client_config = ClientCertConfig::new(&args.name)
        .with_cpf(&args.cpf)
        .with_validity(args.validity_days);
    if let Some(email) = &args.email {
        client_config = client_config.with_email(email);
    }
    if let Some(organization) = &args.organization {
        client_config = client_config.with_organization(organization);
    }
    let client = ca.issue_client_cert(&client_config)?;
    client.save_to_files(
        &args.out_dir.join("client.pem"),
        &args.out_dir.join("client.key"),
        None,
    )?;

    info!(common_name = %client.common_name, "Client certificate issued");
    print_usage(&args.out_dir);
    Ok(())
}

fn print_usage(dir: &Path) {
    println!("Certificates written to {}", dir.display());
    println!();
    println!("server:");
    println!("  tls:");
    println!("    cert_path: {}", dir.join("server.pem").display());
    println!("    key_path: {}", dir.join("server.key").display());
    println!("    client_ca_path: {}", dir.join("client-ca.pem").display());
    println!("    client_auth: required");
    println!();
    println!(
        "curl --cacert {} --cert {} --key {} https://localhost:8443/api/certificate/validate",
        dir.join("client-ca.pem").display(),
        dir.join("client.pem").display(),
        dir.join("client.key").display()
    );
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    run(&args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use icpauth_cert::{IdentityExtractor, ParsedCertificate};

    #[test]
    fn test_generates_usable_pki() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args::try_parse_from([
            "icpauth-gen",
            "--out-dir",
            dir.path().to_str().unwrap(),
            "--name",
            "MARIA SOUZA",
            "--cpf",
            "98765432100",
        ])
        .unwrap();

        run(&args).unwrap();

        for file in ["ca.pem", "ca.key", "client-ca.pem", "server.pem", "server.key", "client.pem", "client.key"] {
            assert!(dir.path().join(file).exists(), "{} missing", file);
        }

        let mut bundle = std::fs::read(dir.path().join("client.pem")).unwrap();
        bundle.extend(std::fs::read(dir.path().join("ca.pem")).unwrap());
        let chain = ParsedCertificate::chain_from_pem(&bundle).unwrap();

        let record = IdentityExtractor::default()
            .extract(&chain, "127.0.0.1", None)
            .unwrap();
        assert_eq!(record.subject_name, "MARIA SOUZA:98765432100");
        assert_eq!(record.national_id.as_deref(), Some("98765432100"));
    }

    #[test]
    fn test_rejects_malformed_cpf() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args::try_parse_from([
            "icpauth-gen",
            "--out-dir",
            dir.path().to_str().unwrap(),
            "--cpf",
            "123.456.789-01",
        ])
        .unwrap();

        assert!(run(&args).is_err());
    }
}
