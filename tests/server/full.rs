//! Full handshakes over TLS.

use std::sync::Arc;

use rand::rngs::OsRng;
use tlspeer::message::{ClientHello, HandshakeType};
use tlspeer::{
    AlertDescription, ContentType, Error, ProtocolVersion, ServerConnection, ServerState,
    TestPolicy,
};

use crate::common::*;

#[test]
fn ecdhe_rsa_tls12() {
    init_log();

    let config = build(config_builder());
    let mut client = TestClient::new(client_hello(&[0xc02f]));
    let mut conn = ServerConnection::new(Arc::clone(&config), TestPolicy::new(), false);

    let established = conn.handshake(&mut client).expect("handshake");
    client.finish();

    assert_eq!(conn.state(), ServerState::Established);
    assert_eq!(established.version, ProtocolVersion::Tls12);
    assert_eq!(established.cipher_suite, 0xc02f);
    assert!(!established.did_resume);
    assert_eq!(established.server_name.as_deref(), Some(SERVER_NAME));

    assert_eq!(
        client.server_message_types(),
        vec![
            HandshakeType::ServerHello,
            HandshakeType::Certificate,
            HandshakeType::ServerKeyExchange,
            HandshakeType::ServerHelloDone,
            HandshakeType::Finished,
        ]
    );
    assert_eq!(client.server_certificates, vec![RSA_CERT.to_vec()]);
    verify_server_key_exchange(&client).expect("ServerKeyExchange signature");

    assert_eq!(client.server_finished_ok, Some(true));
    assert_eq!(*established.master_secret, client.master_secret);
    assert_eq!(conn.client_verify(), &client.client_verify[..]);
    assert_eq!(conn.server_verify(), &client.server_verify[..]);

    // Keys go to the record layer once, before our ChangeCipherSpec.
    assert_eq!(client.cipher_specs.len(), 1);
    let spec = &client.cipher_specs[0];
    assert_eq!(spec.suite.id, 0xc02f);
    assert_eq!(spec.keys.client_key.len(), 16);
    assert_eq!(spec.keys.server_iv.len(), 4);
    assert_eq!(client.record_types().iter().filter(|t| **t == ContentType::ChangeCipherSpec).count(), 1);
}

#[test]
fn rsa_key_exchange_tls10_marks_downgrade() {
    init_log();

    let config = build(config_builder());
    let mut client = TestClient::new(legacy_client_hello(0x0301, &[0x002f]));

    let established = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    client.finish();

    assert_eq!(established.version, ProtocolVersion::Tls10);
    assert_eq!(established.cipher_suite, 0x002f);
    assert_eq!(sent_random(&client)[..8], *b"DOWNGRD\x00");
    assert!(!client.server_message_types().contains(&HandshakeType::ServerKeyExchange));
    assert_eq!(client.server_finished_ok, Some(true));
}

/// The server random as the client saw it on the wire, checked against the
/// parsed ServerHello.
fn sent_random(client: &TestClient) -> [u8; 32] {
    let raw = &client.server_messages[0];
    assert_eq!(raw[0], HandshakeType::ServerHello.as_u8());
    // type(1) | length(3) | version(2) | random(32)
    let random: [u8; 32] = raw[6..38].try_into().expect("random");
    assert_eq!(client.server_hello.as_ref().expect("ServerHello").random, random);
    random
}

#[test]
fn tls11_below_tls12_maximum_marks_downgrade() {
    let config = build(config_builder());
    let mut client = TestClient::new(legacy_client_hello(0x0302, &[0xc013]));

    let established = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    client.finish();

    assert_eq!(established.version, ProtocolVersion::Tls11);
    assert_eq!(client.server_hello.as_ref().unwrap().vers, 0x0302);
    let random = sent_random(&client);
    assert_eq!(random[..8], *b"DOWNGRD\x00");
    assert_eq!(established.server_random, random);
    assert_eq!(client.server_finished_ok, Some(true));
}

#[test]
fn tls13_capable_server_marks_tls12() {
    let config = build(config_builder().max_version(ProtocolVersion::Tls13));

    let mut client = TestClient::new(client_hello(&[0xc02f]));
    let established = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    assert_eq!(established.version, ProtocolVersion::Tls12);
    let random = sent_random(&client);
    assert_eq!(random[..8], *b"DOWNGRD\x01");
    assert_eq!(established.server_random, random);

    // With a TLS 1.3 maximum every older version carries the same marker.
    let mut client = TestClient::new(legacy_client_hello(0x0302, &[0xc013]));
    let established = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    assert_eq!(established.version, ProtocolVersion::Tls11);
    assert_eq!(sent_random(&client)[..8], *b"DOWNGRD\x01");

    // A client that asks for TLS 1.3 still gets TLS 1.2 here.
    let hello = ClientHello {
        vers: 0x0304,
        ..client_hello(&[0xc02f])
    };
    let mut client = TestClient::new(hello);
    let established = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    assert_eq!(established.version, ProtocolVersion::Tls12);
    assert_eq!(sent_random(&client)[..8], *b"DOWNGRD\x01");

    // Nothing to mark when TLS 1.2 is our maximum and was negotiated.
    let plain = build(config_builder());
    let mut client = TestClient::new(client_hello(&[0xc02f]));
    connect(&plain, TestPolicy::new(), &mut client).expect("handshake");
    assert_ne!(sent_random(&client)[..7], *b"DOWNGRD");
}

#[test]
fn ecdsa_certificate_selects_ecdsa_suite() {
    init_log();

    let config = build(tlspeer::Config::builder().certificate(ecdsa_certificate()));
    let mut client = TestClient::new(client_hello(&[0xc02f, 0xc02b, 0x002f]));

    let established = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    client.finish();

    assert_eq!(established.cipher_suite, 0xc02b);
    verify_server_key_exchange(&client).expect("ServerKeyExchange signature");
    assert_eq!(client.server_finished_ok, Some(true));
}

#[test]
fn server_preference_order() {
    let hello = || client_hello(&[0x002f, 0xc02f]);

    let config = build(config_builder().cipher_suites(vec![0xc02f, 0x002f]));
    let est = connect(&config, TestPolicy::new(), &mut TestClient::new(hello())).unwrap();
    assert_eq!(est.cipher_suite, 0x002f);

    let config = build(
        config_builder()
            .cipher_suites(vec![0xc02f, 0x002f])
            .prefer_server_cipher_suites(true),
    );
    let est = connect(&config, TestPolicy::new(), &mut TestClient::new(hello())).unwrap();
    assert_eq!(est.cipher_suite, 0xc02f);
}

#[test]
fn ecdhe_needs_a_mutual_curve() {
    let config = build(config_builder());

    let mut hello = client_hello(&[0xc02f, 0x002f]);
    hello.supported_curves = vec![tlspeer::types::NamedCurve::Unknown(0x0019)];
    let est = connect(&config, TestPolicy::new(), &mut TestClient::new(hello)).unwrap();
    assert_eq!(est.cipher_suite, 0x002f);

    let mut hello = client_hello(&[0xc02f, 0x002f]);
    hello.supported_points = vec![1];
    let est = connect(&config, TestPolicy::new(), &mut TestClient::new(hello)).unwrap();
    assert_eq!(est.cipher_suite, 0x002f);
}

#[test]
fn extended_master_secret() {
    let config = build(config_builder());

    let mut hello = client_hello(&[0xc02f]);
    hello.extended_master_secret = true;
    let mut client = TestClient::new(hello);
    let est = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    client.finish();

    assert!(est.extended_master_secret);
    assert!(client.server_hello.as_ref().unwrap().extensions.extended_master_secret);
    assert_eq!(client.server_finished_ok, Some(true));
}

#[test]
fn extended_master_secret_required() {
    let config = build(config_builder());
    let policy = TestPolicy {
        require_extended_master_secret: true,
        ..TestPolicy::new()
    };

    let mut client = TestClient::new(client_hello(&[0xc02f]));
    let err = connect(&config, policy, &mut client).unwrap_err();
    assert!(matches!(err, Error::PolicyAssertion(_)), "{:?}", err);
    assert!(client.alerts.is_empty());
}

#[test]
fn alpn_follows_our_preference() {
    let config = build(config_builder().next_protos(vec!["h2".into(), "http/1.1".into()]));

    let mut hello = client_hello(&[0xc02f]);
    hello.alpn_protocols = vec!["http/1.1".into(), "h2".into()];
    hello.next_proto_neg = true;
    let mut client = TestClient::new(hello);

    let est = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    assert_eq!(est.next_protocol.as_deref(), Some("h2"));
    assert!(est.used_alpn);
    // ALPN wins over NPN.
    assert!(!client.server_hello.as_ref().unwrap().extensions.next_proto_neg);
}

#[test]
fn npn_protocol_comes_from_client() {
    let config = build(config_builder().next_protos(vec!["spdy/3".into(), "http/1.1".into()]));

    let mut hello = client_hello(&[0xc02f]);
    hello.next_proto_neg = true;
    let mut client = TestClient::new(hello);
    client.npn_protocol = Some("http/1.1".to_string());

    let est = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    client.finish();

    assert_eq!(est.next_protocol.as_deref(), Some("http/1.1"));
    assert!(!est.used_alpn);
    assert_eq!(client.server_finished_ok, Some(true));
}

#[test]
fn channel_id() {
    init_log();

    let config = build(config_builder().request_channel_id(true));
    let key = p256::ecdsa::SigningKey::random(&mut OsRng);
    let point = key.verifying_key().to_encoded_point(false);

    let mut hello = client_hello(&[0xc02f]);
    hello.channel_id_supported = true;
    let mut client = TestClient::new(hello);
    client.channel_id_key = Some(key);

    let est = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    let channel_id = est.channel_id.expect("channel ID");
    assert_eq!(&channel_id[..32], &point.x().unwrap()[..]);
    assert_eq!(&channel_id[32..], &point.y().unwrap()[..]);
}

#[test]
fn channel_id_not_requested_without_config() {
    let config = build(config_builder());

    let mut hello = client_hello(&[0xc02f]);
    hello.channel_id_supported = true;
    let mut client = TestClient::new(hello);

    let est = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    assert!(est.channel_id.is_none());
    assert!(!client.server_hello.as_ref().unwrap().extensions.channel_id_requested);
}

#[test]
fn session_ticket_before_finished() {
    let config = build(config_builder());

    let mut hello = client_hello(&[0xc02f]);
    hello.ticket_supported = true;
    let mut client = TestClient::new(hello);

    connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    client.finish();

    let types = client.server_message_types();
    assert_eq!(
        &types[types.len() - 2..],
        &[HandshakeType::NewSessionTicket, HandshakeType::Finished]
    );
    assert!(!client.session_ticket.as_ref().unwrap().is_empty());
    assert_eq!(client.server_finished_ok, Some(true));
}

#[test]
fn no_ticket_when_disabled() {
    let config = build(config_builder().session_tickets_disabled(true));

    let mut hello = client_hello(&[0xc02f]);
    hello.ticket_supported = true;
    let mut client = TestClient::new(hello);

    connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    client.finish();

    assert!(!client.server_hello.as_ref().unwrap().extensions.ticket_supported);
    assert!(client.session_ticket.is_none());
}

#[test]
fn pre_shared_key() {
    init_log();

    let config = build(
        config_builder()
            .cipher_suites(vec![0x008c, 0xc035])
            .pre_shared_key("client", b"sixteen byte key".to_vec()),
    );

    for suite in [0x008c, 0xc035] {
        let mut client = TestClient::new(client_hello(&[suite]));
        client.psk = Some(("client".to_string(), b"sixteen byte key".to_vec()));

        let est = connect(&config, TestPolicy::new(), &mut client).expect("handshake");
        client.finish();

        assert_eq!(est.cipher_suite, suite);
        assert!(!client.server_message_types().contains(&HandshakeType::Certificate));
        assert_eq!(client.server_finished_ok, Some(true));
    }
}

#[test]
fn ocsp_staple_and_sct_list() {
    let certificate = rsa_certificate()
        .with_ocsp_staple(b"ocsp response".to_vec())
        .with_sct_list(b"sct list".to_vec());
    let config = build(tlspeer::Config::builder().certificate(certificate));

    let mut hello = client_hello(&[0xc02f]);
    hello.ocsp_stapling = true;
    hello.sct_list_supported = true;
    let mut client = TestClient::new(hello);

    connect(&config, TestPolicy::new(), &mut client).expect("handshake");

    let extensions = &client.server_hello.as_ref().unwrap().extensions;
    assert!(extensions.ocsp_stapling);
    assert_eq!(extensions.sct_list.as_deref(), Some(&b"sct list"[..]));
    assert_eq!(client.server_message_types()[2], HandshakeType::CertificateStatus);
}

#[test]
fn no_ocsp_for_psk() {
    let certificate = rsa_certificate().with_ocsp_staple(b"ocsp response".to_vec());
    let config = build(
        tlspeer::Config::builder()
            .certificate(certificate)
            .pre_shared_key("client", vec![1; 16]),
    );

    let mut hello = client_hello(&[0x008c]);
    hello.ocsp_stapling = true;
    let mut client = TestClient::new(hello);
    client.psk = Some(("client".to_string(), vec![1; 16]));

    connect(&config, TestPolicy::new(), &mut client).expect("handshake");
    assert!(!client.server_hello.as_ref().unwrap().extensions.ocsp_stapling);
}

#[test]
fn no_mutual_cipher_suite() {
    let config = build(config_builder());
    let mut client = TestClient::new(client_hello(&[0x1301]));
    let mut conn = ServerConnection::new(config, TestPolicy::new(), false);

    let err = conn.handshake(&mut client).unwrap_err();
    assert!(matches!(err, Error::NegotiationFailure(_)), "{:?}", err);
    assert_eq!(client.alerts, vec![AlertDescription::HandshakeFailure]);
    assert_eq!(conn.state(), ServerState::Aborted);

    // An aborted connection stays aborted.
    let mut client = TestClient::new(client_hello(&[0xc02f]));
    assert!(conn.handshake(&mut client).is_err());
    assert!(client.records.is_empty());
}

#[test]
fn version_below_minimum() {
    let config = build(config_builder().min_version(ProtocolVersion::Tls12));
    let mut client = TestClient::new(legacy_client_hello(0x0301, &[0x002f]));

    let err = connect(&config, TestPolicy::new(), &mut client).unwrap_err();
    assert!(matches!(err, Error::UnsupportedVersion(0x0301)), "{:?}", err);
    assert_eq!(client.alerts, vec![AlertDescription::ProtocolVersion]);
}

#[test]
fn compression_must_include_null() {
    let config = build(config_builder());
    let mut hello = client_hello(&[0xc02f]);
    hello.compression_methods = vec![1];
    let mut client = TestClient::new(hello);

    let err = connect(&config, TestPolicy::new(), &mut client).unwrap_err();
    assert!(matches!(err, Error::NegotiationFailure(_)), "{:?}", err);
    assert_eq!(client.alerts, vec![AlertDescription::HandshakeFailure]);
}

#[test]
fn tls12_fields_in_older_hello() {
    let config = build(config_builder());

    // TLS 1.2 only suite offered at TLS 1.0
    let mut client = TestClient::new(legacy_client_hello(0x0301, &[0xc02f, 0x002f]));
    let err = connect(&config, TestPolicy::new(), &mut client).unwrap_err();
    assert!(matches!(err, Error::PolicyAssertion(_)), "{:?}", err);

    // signature_algorithms offered at TLS 1.1
    let mut hello = legacy_client_hello(0x0302, &[0x002f]);
    hello.signature_algorithms = tlspeer::types::SignatureScheme::default_list();
    let err = connect(&config, TestPolicy::new(), &mut TestClient::new(hello)).unwrap_err();
    assert!(matches!(err, Error::PolicyAssertion(_)), "{:?}", err);
}

#[test]
fn renegotiation_binds_previous_finished() {
    init_log();

    let config = build(config_builder());
    let mut conn = ServerConnection::new(config, TestPolicy::new(), false);

    let mut first = TestClient::new(client_hello(&[0xc02f]));
    conn.handshake(&mut first).expect("first handshake");
    first.finish();

    let mut hello = client_hello(&[0xc02f]);
    hello.secure_renegotiation = Some(first.client_verify.clone());
    let mut second = TestClient::new(hello);
    conn.handshake(&mut second).expect("renegotiation");
    second.finish();

    let mut expected = first.client_verify.clone();
    expected.extend_from_slice(&first.server_verify);
    assert_eq!(
        second.server_hello.as_ref().unwrap().extensions.secure_renegotiation,
        Some(expected)
    );
    assert_eq!(second.server_finished_ok, Some(true));
    assert_eq!(conn.client_verify(), &second.client_verify[..]);
}

#[test]
fn renegotiation_without_binding_fails() {
    let config = build(config_builder());
    let mut conn = ServerConnection::new(config, TestPolicy::new(), false);

    let mut first = TestClient::new(client_hello(&[0xc02f]));
    conn.handshake(&mut first).expect("first handshake");

    let mut second = TestClient::new(client_hello(&[0xc02f]));
    let err = conn.handshake(&mut second).unwrap_err();
    assert!(matches!(err, Error::NegotiationFailure(_)), "{:?}", err);
}

#[test]
fn renegotiation_client_version_must_not_change() {
    let config = build(config_builder());
    let policy = TestPolicy {
        require_same_renegotiation_client_version: true,
        ..TestPolicy::new()
    };
    let mut conn = ServerConnection::new(config, policy, false);

    let mut first = TestClient::new(client_hello(&[0xc013]));
    conn.handshake(&mut first).expect("first handshake");

    let mut hello = legacy_client_hello(0x0302, &[0xc013]);
    hello.secure_renegotiation = Some(first.client_verify.clone());
    let err = conn.handshake(&mut TestClient::new(hello)).unwrap_err();
    assert!(matches!(err, Error::PolicyAssertion(_)), "{:?}", err);
}

/// Refuses the 48-byte draws a P-384 private key needs.
#[derive(Debug)]
struct NoP384Scalars;

impl tlspeer::SecureRandom for NoP384Scalars {
    fn fill(&self, buf: &mut [u8]) -> Result<(), String> {
        if buf.len() == 48 {
            return Err("entropy exhausted".to_string());
        }
        tlspeer::SecureRandom::fill(&tlspeer::crypto::OsRandom, buf)
    }
}

static NO_P384_SCALARS: NoP384Scalars = NoP384Scalars;

#[test]
fn ephemeral_key_uses_configured_random_source() {
    init_log();

    let provider = tlspeer::CryptoProvider {
        secure_random: &NO_P384_SCALARS,
        ..tlspeer::crypto::default_provider()
    };
    let config = build(config_builder().with_crypto_provider(provider));

    let mut hello = client_hello(&[0xc02f]);
    hello.supported_curves = vec![tlspeer::types::NamedCurve::Secp384r1];
    let mut client = TestClient::new(hello);
    let err = connect(&config, TestPolicy::new(), &mut client).unwrap_err();
    assert!(matches!(err, Error::ResourceFailure(_)), "{:?}", err);
    assert_eq!(client.alerts, vec![AlertDescription::InternalError]);

    // Other curves draw 32 bytes and are unaffected.
    let mut client = TestClient::new(client_hello(&[0xc02f]));
    connect(&config, TestPolicy::new(), &mut client).expect("handshake");
}
