//! Session resumption by ticket and by session ID.

use std::sync::Arc;

use tlspeer::message::HandshakeType;
use tlspeer::{ContentType, Error, Established, MemorySessionCache, SessionCache, TestPolicy};

use crate::common::*;

const SUITE: u16 = 0xc013;

/// A full handshake that leaves the client holding a ticket.
fn ticketed(config: &Arc<tlspeer::Config>) -> (Established, Vec<u8>) {
    let mut hello = client_hello(&[SUITE]);
    hello.ticket_supported = true;
    let mut client = TestClient::new(hello);

    let est = connect(config, TestPolicy::new(), &mut client).expect("full handshake");
    client.finish();
    let ticket = client.session_ticket.expect("ticket");
    (est, ticket)
}

fn resuming_client(est: &Established, ticket: &[u8]) -> TestClient {
    let mut hello = client_hello(&[SUITE]);
    hello.ticket_supported = true;
    hello.session_ticket = ticket.to_vec();
    // A session ID the server echoes when it accepts the ticket.
    hello.session_id.extend_from_slice(&[0x5a; 32]);

    let mut client = TestClient::new(hello);
    client.resume_master_secret = Some(est.master_secret.to_vec());
    client
}

#[test]
fn ticket_resumption() {
    init_log();

    let config = build(config_builder());
    let (first, ticket) = ticketed(&config);

    let mut client = resuming_client(&first, &ticket);
    let est = connect(&config, TestPolicy::new(), &mut client).expect("resumption");

    assert!(est.did_resume);
    assert!(client.resumed);
    assert_eq!(est.cipher_suite, SUITE);
    assert_eq!(est.master_secret, first.master_secret);
    assert_eq!(
        client.server_message_types(),
        vec![HandshakeType::ServerHello, HandshakeType::Finished]
    );
    assert_eq!(
        client.record_types(),
        vec![
            ContentType::Handshake,
            ContentType::ChangeCipherSpec,
            ContentType::Handshake,
        ]
    );
    assert_eq!(client.server_finished_ok, Some(true));
    // New randoms, new keys.
    assert_eq!(client.cipher_specs.len(), 1);
}

#[test]
fn renewed_ticket_on_resumption() {
    let config = build(config_builder());
    let (first, ticket) = ticketed(&config);

    let policy = TestPolicy {
        renew_ticket_on_resume: true,
        ..TestPolicy::new()
    };
    let mut client = resuming_client(&first, &ticket);
    connect(&config, policy, &mut client).expect("resumption");

    assert_eq!(
        client.server_message_types(),
        vec![
            HandshakeType::ServerHello,
            HandshakeType::NewSessionTicket,
            HandshakeType::Finished,
        ]
    );
    let renewed = client.session_ticket.clone().expect("renewed ticket");
    assert_ne!(renewed, ticket);
    assert_eq!(client.server_finished_ok, Some(true));
}

#[test]
fn session_id_resumption() {
    init_log();

    let cache = Arc::new(MemorySessionCache::new());
    let config = build(config_builder().session_cache(cache.clone()));

    let mut client = TestClient::new(client_hello(&[SUITE]));
    let first = connect(&config, TestPolicy::new(), &mut client).expect("full handshake");
    let session_id = client.server_hello.as_ref().unwrap().session_id.to_vec();
    assert_eq!(session_id.len(), 32);
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&session_id).is_some());

    let mut hello = client_hello(&[SUITE]);
    hello.session_id.extend_from_slice(&session_id);
    let mut client = TestClient::new(hello);
    client.resume_master_secret = Some(first.master_secret.to_vec());

    let est = connect(&config, TestPolicy::new(), &mut client).expect("resumption");
    assert!(est.did_resume);
    assert_eq!(client.server_hello.as_ref().unwrap().session_id.to_vec(), session_id);
    assert_eq!(client.server_finished_ok, Some(true));
}

#[test]
fn unknown_ticket_falls_back_to_full_handshake() {
    let config = build(config_builder());
    let (first, _) = ticketed(&config);

    let mut client = resuming_client(&first, b"not a ticket");
    let est = connect(&config, TestPolicy::new(), &mut client).expect("full handshake");
    client.finish();

    assert!(!est.did_resume);
    assert_ne!(est.master_secret, first.master_secret);
    assert!(client.server_message_types().contains(&HandshakeType::Certificate));
    assert_eq!(client.server_finished_ok, Some(true));
}

#[test]
fn version_change_prevents_resumption() {
    let config = build(config_builder());
    let (first, ticket) = ticketed(&config);

    let mut client = resuming_client(&first, &ticket);
    client.hello.vers = 0x0302;
    client.hello.signature_algorithms.clear();
    // The hello was queued when the client was built.
    let mut client = rebuild(client);

    let est = connect(&config, TestPolicy::new(), &mut client).expect("full handshake");
    assert!(!est.did_resume);
    assert_eq!(est.version, tlspeer::ProtocolVersion::Tls11);

    let policy = TestPolicy {
        allow_session_version_mismatch: true,
        ..TestPolicy::new()
    };
    let mut client = resuming_client(&first, &ticket);
    client.hello.vers = 0x0302;
    client.hello.signature_algorithms.clear();
    let mut client = rebuild(client);
    let est = connect(&config, policy, &mut client).expect("resumption");
    assert!(est.did_resume);
}

#[test]
fn session_offered_when_forbidden() {
    let config = build(config_builder());
    let (first, ticket) = ticketed(&config);

    let policy = TestPolicy {
        fail_if_session_offered: true,
        ..TestPolicy::new()
    };
    let mut client = resuming_client(&first, &ticket);
    let err = connect(&config, policy, &mut client).unwrap_err();
    assert!(matches!(err, Error::PolicyAssertion(_)), "{:?}", err);
    assert!(client.alerts.is_empty());
}

#[test]
fn resumption_refused_on_renegotiation() {
    let config = build(config_builder());
    let (first, ticket) = ticketed(&config);

    let policy = TestPolicy {
        fail_if_resume_on_renegotiation: true,
        ..TestPolicy::new()
    };
    let mut conn = tlspeer::ServerConnection::new(Arc::clone(&config), policy, false);
    let mut initial = TestClient::new(client_hello(&[SUITE]));
    conn.handshake(&mut initial).expect("initial handshake");

    let mut client = resuming_client(&first, &ticket);
    client.hello.secure_renegotiation = Some(initial.client_verify.clone());
    let mut client = rebuild(client);
    let err = conn.handshake(&mut client).unwrap_err();
    assert!(matches!(err, Error::PolicyAssertion(_)), "{:?}", err);
}

/// A fresh client sending the (edited) hello of `client`.
fn rebuild(client: TestClient) -> TestClient {
    let mut rebuilt = TestClient::new(client.hello);
    rebuilt.resume_master_secret = client.resume_master_secret;
    rebuilt
}
