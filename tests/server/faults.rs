//! Deliberate misbehavior and expectations from the test policy.

use tlspeer::message::HandshakeType;
use tlspeer::{AlertDescription, ContentType, Error, TestPolicy};

use crate::common::*;

const SCSV_FALLBACK: u16 = 0x5600;

fn policy(f: impl FnOnce(&mut TestPolicy)) -> TestPolicy {
    let mut policy = TestPolicy::new();
    f(&mut policy);
    policy
}

/// Run a TLS 1.2 ECDHE_RSA handshake under `policy`, then let the client
/// read the server's last flight.
fn run(policy: TestPolicy) -> (Result<tlspeer::Established, Error>, TestClient) {
    init_log();
    let config = build(config_builder());
    let mut client = TestClient::new(client_hello(&[0xc02f]));
    let result = connect(&config, policy, &mut client);
    client.finish();
    (result, client)
}

/// Record types after the server's ChangeCipherSpec, or everything after
/// ServerHelloDone when there is none.
fn final_flight(client: &TestClient) -> Vec<ContentType> {
    // The last flush before the final flight ends with ServerHelloDone.
    let done = client
        .records
        .iter()
        .rposition(|(t, data)| {
            *t == ContentType::Handshake
                && data.first() == Some(&HandshakeType::ServerHelloDone.as_u8())
        })
        .expect("ServerHelloDone");
    client.records[done + 1..].iter().map(|(t, _)| *t).collect()
}

#[test]
fn bad_finished() {
    let (result, client) = run(policy(|p| p.bad_finished = true));

    // We cannot tell, the client can.
    result.expect("handshake");
    assert_eq!(client.server_finished_ok, Some(false));
}

#[test]
fn fragment_across_change_cipher_spec() {
    let (result, client) = run(policy(|p| p.fragment_across_change_cipher_spec = true));
    result.expect("handshake");

    assert_eq!(
        final_flight(&client),
        vec![
            ContentType::Handshake,
            ContentType::ChangeCipherSpec,
            ContentType::Handshake,
        ]
    );
    let n = client.records.len();
    assert_eq!(client.records[n - 3].1.len(), 5);
    // Reassembled on the other side.
    assert_eq!(client.server_finished_ok, Some(true));
}

#[test]
fn skip_change_cipher_spec() {
    let (result, client) = run(policy(|p| p.skip_change_cipher_spec = true));
    result.expect("handshake");

    assert_eq!(final_flight(&client), vec![ContentType::Handshake]);
}

#[test]
fn bad_change_cipher_spec() {
    let (result, client) = run(policy(|p| p.bad_change_cipher_spec = Some(vec![2, 1])));
    result.expect("handshake");

    let ccs = client
        .records
        .iter()
        .find(|(t, _)| *t == ContentType::ChangeCipherSpec)
        .expect("ChangeCipherSpec");
    assert_eq!(ccs.1, vec![2, 1]);
}

#[test]
fn app_data_after_change_cipher_spec() {
    let (result, client) = run(policy(|p| {
        p.app_data_after_change_cipher_spec = Some(b"early".to_vec())
    }));
    result.expect("handshake");

    assert_eq!(
        final_flight(&client),
        vec![
            ContentType::ChangeCipherSpec,
            ContentType::ApplicationData,
            ContentType::Handshake,
        ]
    );
    let n = client.records.len();
    assert_eq!(client.records[n - 2].1, b"early".to_vec());
}

#[test]
fn alert_after_change_cipher_spec() {
    let (result, client) = run(policy(|p| {
        p.alert_after_change_cipher_spec = Some(AlertDescription::DecryptError)
    }));

    let err = result.unwrap_err();
    assert!(
        matches!(err, Error::InjectedAlert(AlertDescription::DecryptError)),
        "{:?}",
        err
    );
    // Sent once, by the injection.
    assert_eq!(client.alerts, vec![AlertDescription::DecryptError]);
    assert_eq!(final_flight(&client), vec![ContentType::ChangeCipherSpec]);
    assert_eq!(client.server_finished_ok, None);
}

#[test]
fn skip_finished() {
    let (result, client) = run(policy(|p| p.skip_finished = true));
    result.expect("handshake");

    assert_eq!(final_flight(&client), vec![ContentType::ChangeCipherSpec]);
    assert_eq!(client.server_finished_ok, None);
}

#[test]
fn wrong_certificate_message_type() {
    let (result, client) = run(policy(|p| p.wrong_certificate_message_type = true));

    // The client chokes on the unknown message and never answers.
    let err = result.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "{:?}", err);
    assert!(client.alerts.is_empty());
    assert_eq!(client.server_messages[1][0], 11 + 42);
}

#[test]
fn empty_certificate_list() {
    let (result, client) = run(policy(|p| p.empty_certificate_list = true));

    // The ECDHE client here does not check.
    result.expect("handshake");
    assert!(client
        .server_message_types()
        .contains(&HandshakeType::Certificate));
    assert!(client.server_certificates.is_empty());
}

#[test]
fn unauthenticated_ecdh() {
    let (result, client) = run(policy(|p| p.unauthenticated_ecdh = true));
    result.expect("handshake");

    assert_eq!(
        &client.server_message_types()[..3],
        &[
            HandshakeType::ServerHello,
            HandshakeType::ServerKeyExchange,
            HandshakeType::ServerHelloDone,
        ]
    );
    let ske = client.server_key_exchange.as_ref().expect("ServerKeyExchange");
    // Curve parameters and nothing else.
    assert_eq!(ske.len(), 4 + ske[3] as usize);
}

#[test]
fn skip_server_key_exchange() {
    let (result, client) = run(policy(|p| p.skip_server_key_exchange = true));

    assert!(result.is_err());
    assert_eq!(
        client.server_message_types(),
        vec![
            HandshakeType::ServerHello,
            HandshakeType::Certificate,
            HandshakeType::ServerHelloDone,
        ]
    );
}

#[test]
fn invalid_server_key_exchange_signature() {
    let (result, client) = run(TestPolicy::new());
    result.expect("handshake");
    verify_server_key_exchange(&client).expect("valid signature");

    let (result, client) = run(policy(|p| p.invalid_server_key_exchange_signature = true));
    result.expect("handshake");
    assert!(verify_server_key_exchange(&client).is_err());
}

#[test]
fn send_cipher_suite() {
    let (result, client) = run(policy(|p| p.send_cipher_suite = Some(0xc013)));

    // Only the advertised value changes, we keep using what we selected.
    let est = result.expect("handshake");
    assert_eq!(client.server_hello.as_ref().unwrap().cipher_suite, 0xc013);
    assert_eq!(est.cipher_suite, 0xc02f);
    assert_eq!(client.cipher_specs[0].suite.id, 0xc02f);
}

#[test]
fn fallback_scsv() {
    init_log();
    let config = build(config_builder());

    let mut client = TestClient::new(client_hello(&[0xc02f, SCSV_FALLBACK]));
    let err = connect(&config, TestPolicy::new(), &mut client).unwrap_err();
    assert!(matches!(err, Error::PolicyAssertion(_)), "{:?}", err);

    let expect = policy(|p| p.expect_fallback_scsv = true);
    let mut client = TestClient::new(client_hello(&[0xc02f]));
    let err = connect(&config, expect.clone(), &mut client).unwrap_err();
    assert!(matches!(err, Error::PolicyAssertion(_)), "{:?}", err);

    let mut client = TestClient::new(client_hello(&[0xc02f, SCSV_FALLBACK]));
    connect(&config, expect, &mut client).expect("fallback handshake");
}

#[test]
fn require_client_hello_size() {
    let config = build(config_builder());
    let hello = client_hello(&[0xc02f]);
    let size = hello.marshal().len();

    let mut client = TestClient::new(hello.clone());
    connect(&config, policy(|p| p.require_client_hello_size = Some(size)), &mut client)
        .expect("handshake");

    let mut client = TestClient::new(hello);
    let err = connect(
        &config,
        policy(|p| p.require_client_hello_size = Some(size + 1)),
        &mut client,
    )
    .unwrap_err();
    assert!(matches!(err, Error::PolicyAssertion(_)), "{:?}", err);
    assert!(client.server_messages.is_empty());
}

#[test]
fn no_renegotiation_info() {
    let (result, client) = run(TestPolicy::new());
    result.expect("handshake");
    let extensions = &client.server_hello.as_ref().unwrap().extensions;
    assert_eq!(extensions.secure_renegotiation, Some(Vec::new()));

    let (result, client) = run(policy(|p| p.no_renegotiation_info = true));
    result.expect("handshake");
    let extensions = &client.server_hello.as_ref().unwrap().extensions;
    assert_eq!(extensions.secure_renegotiation, None);
}

#[test]
fn expect_server_name() {
    let config = build(config_builder());

    let mut client = TestClient::new(client_hello(&[0xc02f]));
    let est = connect(
        &config,
        policy(|p| p.expect_server_name = Some(SERVER_NAME.to_string())),
        &mut client,
    )
    .expect("handshake");
    assert_eq!(est.server_name.as_deref(), Some(SERVER_NAME));

    let mut client = TestClient::new(client_hello(&[0xc02f]));
    let err = connect(
        &config,
        policy(|p| p.expect_server_name = Some("other.test".to_string())),
        &mut client,
    )
    .unwrap_err();
    assert!(matches!(err, Error::PolicyAssertion(_)), "{:?}", err);
    assert!(client.alerts.is_empty());
}

#[test]
fn send_empty_session_ticket() {
    init_log();
    let config = build(config_builder());
    let mut hello = client_hello(&[0xc02f]);
    hello.ticket_supported = true;

    let mut client = TestClient::new(hello);
    connect(&config, policy(|p| p.send_empty_session_ticket = true), &mut client)
        .expect("handshake");
    client.finish();

    assert_eq!(client.session_ticket, Some(Vec::new()));
    assert_eq!(client.server_finished_ok, Some(true));
}

#[test]
fn skip_new_session_ticket() {
    let config = build(config_builder());
    let mut hello = client_hello(&[0xc02f]);
    hello.ticket_supported = true;

    let mut client = TestClient::new(hello);
    connect(&config, policy(|p| p.skip_new_session_ticket = true), &mut client)
        .expect("handshake");
    client.finish();

    assert!(client.server_hello.as_ref().unwrap().extensions.ticket_supported);
    assert!(!client
        .server_message_types()
        .contains(&HandshakeType::NewSessionTicket));
}
