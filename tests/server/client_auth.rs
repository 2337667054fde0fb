//! Client certificate requests and CertificateVerify.

use tlspeer::certificate::{generate_self_signed_certificate, CertificateAuthority, TestCertificate};
use tlspeer::crypto::ServerPrivateKey;
use tlspeer::message::HandshakeType;
use tlspeer::{AlertDescription, ClientAuthType, Error, ProtocolVersion, TestPolicy};

use crate::common::*;

fn ecdsa_client() -> TestCertificate {
    generate_self_signed_certificate().expect("client cert")
}

fn client_with(hello: tlspeer::message::ClientHello, cert: &TestCertificate) -> TestClient {
    let mut client = TestClient::new(hello);
    client.credential = Some(ClientCredential::from_test_certificate(cert));
    client
}

#[test]
fn requested_but_not_sent() {
    //! A client without a certificate answers the request with an empty
    //! Certificate message, which is fine when one is only requested.
    init_log();

    let config = build(config_builder().client_auth(ClientAuthType::RequestClientCert));
    let mut client = TestClient::new(client_hello(&[0xc02f]));
    let est = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    client.finish();

    assert!(client.certificate_requested);
    assert!(client
        .server_message_types()
        .contains(&HandshakeType::CertificateRequest));
    assert!(est.peer_certificates.is_empty());
    assert_eq!(client.server_finished_ok, Some(true));
}

#[test]
fn no_request_by_default() {
    let config = build(config_builder());
    let mut client = client_with(client_hello(&[0xc02f]), &ecdsa_client());
    let est = connect(&config, TestPolicy::new(), &mut client).expect("handshake");

    assert!(!client.certificate_requested);
    assert!(est.peer_certificates.is_empty());
}

#[test]
fn required_but_empty() {
    let config = build(config_builder().client_auth(ClientAuthType::RequireAnyClientCert));
    let mut client = TestClient::new(client_hello(&[0xc02f]));
    client.send_empty_certificate = true;

    let err = connect(&config, TestPolicy::new(), &mut client).unwrap_err();
    assert_eq!(err.alert(), Some(AlertDescription::BadCertificate), "{:?}", err);
    assert_eq!(client.alerts, vec![AlertDescription::BadCertificate]);
}

#[test]
fn self_signed_ecdsa_client() {
    init_log();

    let cert = ecdsa_client();
    let config = build(config_builder().client_auth(ClientAuthType::RequireAnyClientCert));
    let mut client = client_with(client_hello(&[0xc02f]), &cert);

    let est = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    client.finish();

    assert_eq!(est.peer_certificates, vec![cert.certificate]);
    // Presented, not verified.
    assert!(est.verified_chains.is_empty());
    assert_eq!(client.server_finished_ok, Some(true));
}

#[test]
fn rsa_client() {
    let config = build(config_builder().client_auth(ClientAuthType::RequireAnyClientCert));
    let mut client = TestClient::new(client_hello(&[0xc02f]));
    client.credential = Some(ClientCredential {
        chain: vec![RSA_CERT.to_vec()],
        key: ServerPrivateKey::from_der(RSA_KEY).expect("rsa key"),
    });

    let est = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    assert_eq!(est.peer_certificates.len(), 1);
}

#[test]
fn bad_certificate_verify() {
    let config = build(config_builder().client_auth(ClientAuthType::RequireAnyClientCert));
    let mut client = client_with(client_hello(&[0xc02f]), &ecdsa_client());
    client.corrupt_certificate_verify = true;

    let err = connect(&config, TestPolicy::new(), &mut client).unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailure { .. }), "{:?}", err);
    assert_eq!(client.alerts, vec![AlertDescription::BadCertificate]);
}

#[test]
fn verified_chain() {
    init_log();

    let ca = CertificateAuthority::generate("tlspeer test CA").expect("ca");
    let cert = ca.issue_client_certificate("client", true).expect("client cert");
    let config = build(
        config_builder()
            .client_auth(ClientAuthType::RequireAndVerifyClientCert)
            .client_ca(ca.certificate().to_vec()),
    );

    let mut client = client_with(client_hello(&[0xc02f]), &cert);
    let est = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    client.finish();

    assert_eq!(
        est.verified_chains,
        vec![vec![cert.certificate.clone(), ca.certificate().to_vec()]]
    );
    assert_eq!(est.peer_certificates, vec![cert.certificate]);
    assert_eq!(client.server_finished_ok, Some(true));
}

#[test]
fn untrusted_chain() {
    let ca = CertificateAuthority::generate("tlspeer test CA").expect("ca");
    let other = CertificateAuthority::generate("someone else").expect("other ca");
    let cert = other.issue_client_certificate("client", true).expect("client cert");
    let config = build(
        config_builder()
            .client_auth(ClientAuthType::VerifyClientCertIfGiven)
            .client_ca(ca.certificate().to_vec()),
    );

    let mut client = client_with(client_hello(&[0xc02f]), &cert);
    let err = connect(&config, TestPolicy::new(), &mut client).unwrap_err();
    assert_eq!(err.alert(), Some(AlertDescription::BadCertificate), "{:?}", err);

    // Without a certificate there is nothing to verify.
    let mut client = TestClient::new(client_hello(&[0xc02f]));
    connect(&config, TestPolicy::new(), &mut client).expect("handshake");
}

#[test]
fn legacy_certificate_verify() {
    //! Before TLS 1.2 there is no signature algorithm: ECDSA signs SHA-1 and
    //! RSA signs MD5 and SHA-1 concatenated.
    let config = build(config_builder().client_auth(ClientAuthType::RequireAnyClientCert));

    let mut client = client_with(legacy_client_hello(0x0301, &[0xc013]), &ecdsa_client());
    let est = connect(&config, TestPolicy::new(), &mut client).expect("ecdsa handshake");
    client.finish();
    assert_eq!(est.version, ProtocolVersion::Tls10);
    assert_eq!(est.peer_certificates.len(), 1);
    assert_eq!(client.server_finished_ok, Some(true));

    let mut client = TestClient::new(legacy_client_hello(0x0302, &[0x002f]));
    client.credential = Some(ClientCredential {
        chain: vec![RSA_CERT.to_vec()],
        key: ServerPrivateKey::from_der(RSA_KEY).expect("rsa key"),
    });
    let est = connect(&config, TestPolicy::new(), &mut client).expect("rsa handshake");
    assert_eq!(est.version, ProtocolVersion::Tls11);
    assert_eq!(est.peer_certificates.len(), 1);
}

#[test]
fn client_certificate_survives_resumption() {
    let cert = ecdsa_client();
    let config = build(config_builder().client_auth(ClientAuthType::RequireAnyClientCert));

    let mut hello = client_hello(&[0xc02f]);
    hello.ticket_supported = true;
    let mut client = client_with(hello, &cert);
    let first = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    client.finish();
    let ticket = client.session_ticket.clone().expect("ticket");

    let mut hello = client_hello(&[0xc02f]);
    hello.ticket_supported = true;
    hello.session_ticket = ticket;
    hello.session_id.extend_from_slice(&[1; 32]);
    let mut client = TestClient::new(hello);
    client.resume_master_secret = Some(first.master_secret.to_vec());

    let est = connect(&config, TestPolicy::new(), &mut client).expect("resumption");
    assert!(est.did_resume);
    assert_eq!(est.peer_certificates, vec![cert.certificate]);
}
