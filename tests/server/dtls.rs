use tlspeer::message::HandshakeType;
use tlspeer::{AlertDescription, Error, ProtocolVersion, TestPolicy};

use crate::common::*;

#[test]
fn cookie_exchange() {
    //! A DTLS handshake starts with HelloVerifyRequest and the client
    //! echoing the cookie.
    init_log();

    let config = build(config_builder());
    let mut client = TestClient::new(dtls_client_hello(&[0xc02f]));
    let est = connect(&config, TestPolicy::new(), &mut client).expect("dtls handshake");
    client.finish();

    let hvr = client.hello_verify_request.as_ref().expect("hello verify request");
    // Always the DTLS 1.0 version, whatever is negotiated later.
    assert_eq!(hvr.vers, 0xfeff);
    assert_eq!(hvr.cookie.len(), 32);
    assert_eq!(client.hello.cookie, hvr.cookie);

    let types = client.server_message_types();
    assert_eq!(types[0], HandshakeType::HelloVerifyRequest);
    assert_eq!(types[1], HandshakeType::ServerHello);

    assert_eq!(est.version, ProtocolVersion::Tls12);
    assert_eq!(client.server_hello.as_ref().unwrap().vers, 0xfefd);
    assert_eq!(client.server_finished_ok, Some(true));
    // The verify request goes out on its own.
    assert!(client.flushes >= 2);
}

#[test]
fn skip_hello_verify_request() {
    let config = build(config_builder());
    let policy = TestPolicy {
        skip_hello_verify_request: true,
        ..TestPolicy::new()
    };
    let mut client = TestClient::new(dtls_client_hello(&[0xc02f]));
    connect(&config, policy, &mut client).expect("dtls handshake");
    client.finish();

    assert!(client.hello_verify_request.is_none());
    assert_eq!(client.server_message_types()[0], HandshakeType::ServerHello);
    assert_eq!(client.server_finished_ok, Some(true));
}

#[test]
fn wrong_cookie() {
    let config = build(config_builder());
    let mut client = TestClient::new(dtls_client_hello(&[0xc02f]));
    client.corrupt_cookie = true;

    let err = connect(&config, TestPolicy::new(), &mut client).unwrap_err();
    assert!(matches!(err, Error::ProtocolViolation(_)), "{:?}", err);
    assert_eq!(client.alerts, vec![AlertDescription::UnexpectedMessage]);
    assert!(client.server_hello.is_none());
}

#[test]
fn retransmitted_hello_must_match() {
    let config = build(config_builder());
    let mut client = TestClient::new(dtls_client_hello(&[0xc02f, 0xc013]));
    client.alter_retransmitted_hello = true;

    let err = connect(&config, TestPolicy::new(), &mut client).unwrap_err();
    assert!(matches!(err, Error::ProtocolViolation(_)), "{:?}", err);
    assert_eq!(client.alerts, vec![AlertDescription::UnexpectedMessage]);
}

#[test]
fn no_stream_ciphers() {
    let config = build(config_builder());

    let mut client = TestClient::new(dtls_client_hello(&[0x0005, 0x002f]));
    let est = connect(&config, TestPolicy::new(), &mut client).expect("dtls handshake");
    assert_eq!(est.cipher_suite, 0x002f);

    let mut client = TestClient::new(dtls_client_hello(&[0x0005]));
    let err = connect(&config, TestPolicy::new(), &mut client).unwrap_err();
    assert!(matches!(err, Error::NegotiationFailure(_)), "{:?}", err);
    assert_eq!(client.alerts, vec![AlertDescription::HandshakeFailure]);
}

#[test]
fn dtls10() {
    let config = build(config_builder());
    let mut hello = dtls_client_hello(&[0xc013]);
    hello.vers = 0xfeff;
    hello.signature_algorithms.clear();

    let mut client = TestClient::new(hello);
    let est = connect(&config, TestPolicy::new(), &mut client).expect("dtls 1.0 handshake");
    client.finish();

    assert_eq!(est.version, ProtocolVersion::Tls10);
    assert_eq!(client.server_hello.as_ref().unwrap().vers, 0xfeff);
    assert_eq!(client.server_finished_ok, Some(true));
}

#[test]
fn dtls_maximum_below_tls12() {
    //! DTLS has no counterpart to TLS 1.1, so a TLS 1.1 maximum means DTLS 1.0.
    let config = build(config_builder().max_version(ProtocolVersion::Tls11));
    let mut hello = dtls_client_hello(&[0xc013]);
    hello.signature_algorithms.clear();

    let mut client = TestClient::new(hello);
    let est = connect(&config, TestPolicy::new(), &mut client).expect("dtls handshake");
    assert_eq!(est.version, ProtocolVersion::Tls10);
    assert_eq!(client.server_hello.as_ref().unwrap().vers, 0xfeff);
}

#[test]
fn tls_version_number_over_dtls() {
    //! A TLS version number is no DTLS version at all, whatever else the
    //! hello carries.
    let config = build(config_builder());
    let policy = TestPolicy {
        skip_hello_verify_request: true,
        ..TestPolicy::new()
    };
    let mut hello = dtls_client_hello(&[0xc02f]);
    hello.vers = 0x0303;
    assert!(!hello.signature_algorithms.is_empty());

    let mut client = TestClient::new(hello);
    let err = connect(&config, policy, &mut client).unwrap_err();
    assert!(matches!(err, Error::UnsupportedVersion(0x0303)), "{:?}", err);
    assert_eq!(client.alerts, vec![AlertDescription::ProtocolVersion]);
}
