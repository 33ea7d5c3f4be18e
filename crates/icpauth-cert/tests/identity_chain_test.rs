//! End-to-end extraction over generated ICP-Brasil style chains

use icpauth_cert::{
    CaConfig, ClientCertConfig, GeneratedCa, IdentityExtractor, MemoryAuditSink,
    ParsedCertificate,
};
use std::sync::Arc;

fn soluti_ca() -> GeneratedCa {
    GeneratedCa::generate(&CaConfig::new("AC SOLUTI").with_organization("Test CA"))
        .expect("CA generation")
}

#[test]
fn test_two_certificate_chain() {
    let ca = soluti_ca();
    let client = ca
        .issue_client_cert(
            &ClientCertConfig::new("João Silva")
                .with_cpf("12345678901")
                .with_organization("Test"),
        )
        .unwrap();
    let chain = client.chain().unwrap();
    assert_eq!(chain.len(), 2);

    let sink = Arc::new(MemoryAuditSink::new());
    let extractor = IdentityExtractor::default().with_audit_sink(sink.clone());
    let record = extractor
        .extract(&chain, "200.144.10.20", Some("Mozilla/5.0"))
        .unwrap();

    assert_eq!(record.subject_name, "João Silva:12345678901");
    assert_eq!(record.national_id.as_deref(), Some("12345678901"));
    assert_eq!(record.issuer_name, "AC SOLUTI");
    assert_eq!(record.subject_dn, "CN=João Silva:12345678901, O=Test");
    assert!(record.valid);
    assert_eq!(record.chain.len(), 2);
    assert!(!record.chain[0].is_root);
    assert!(record.chain[1].is_root);

    let lines = sink.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("LOGIN_CERTIFICADO|timestamp="));
    assert!(lines[0].contains("|ip=200.144.10.20|cpf=12345678901|"));
    assert!(lines[0].contains(&format!("|fingerprint={}|", record.fingerprint)));
    assert!(lines[0].contains("|issuer=CN=AC SOLUTI, O=Test CA|"));
    assert!(lines[0].ends_with("|userAgent=Mozilla/5.0"));
}

#[test]
fn test_der_chain_matches_parsed_chain() {
    let ca = soluti_ca();
    let client = ca
        .issue_client_cert(&ClientCertConfig::new("Maria Souza").with_cpf("98765432100"))
        .unwrap();
    let ders = vec![client.cert_der().unwrap(), ca.cert_der().unwrap()];

    let extractor = IdentityExtractor::default().with_audit_sink(Arc::new(MemoryAuditSink::new()));
    let from_der = extractor.extract_der(&ders, "10.0.0.1", None).unwrap();
    let parsed = ParsedCertificate::chain_from_der(&ders).unwrap();
    let from_parsed = extractor.extract(&parsed, "10.0.0.1", None).unwrap();

    assert_eq!(from_der.fingerprint, from_parsed.fingerprint);
    assert_eq!(from_der.serial_number, from_parsed.serial_number);
    assert_eq!(from_der.chain, from_parsed.chain);
}

#[test]
fn test_leaf_only_chain() {
    let ca = soluti_ca();
    let client = ca
        .issue_client_cert(&ClientCertConfig::new("Sem Cadeia").with_cpf("1234567890"))
        .unwrap();
    let leaf = ParsedCertificate::from_der(&client.cert_der().unwrap()).unwrap();

    let record = IdentityExtractor::default()
        .with_audit_sink(Arc::new(MemoryAuditSink::new()))
        .extract(&[leaf], "10.0.0.1", None)
        .unwrap();

    // Ten digits is not a CPF
    assert!(record.national_id.is_none());
    assert_eq!(record.chain.len(), 1);
    assert!(!record.chain[0].is_root);
}

#[test]
fn test_concurrent_extractions() {
    let ca = soluti_ca();
    let chain = Arc::new(
        ca.issue_client_cert(&ClientCertConfig::new("Ana").with_cpf("11122233344"))
            .unwrap()
            .chain()
            .unwrap(),
    );
    let sink = Arc::new(MemoryAuditSink::new());
    let extractor = IdentityExtractor::default().with_audit_sink(sink.clone());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let chain = chain.clone();
            let extractor = extractor.clone();
            std::thread::spawn(move || {
                extractor
                    .extract(chain.as_slice(), &format!("10.0.0.{}", i), None)
                    .unwrap()
                    .session_id
            })
        })
        .collect();

    let mut ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(sink.len(), 8);
}
