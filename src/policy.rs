//! Fault injection for conformance testing.

use crate::types::AlertDescription;

/// Deliberate misbehavior and extra expectations for one connection.
///
/// The default is a well-behaved server. Construct a fresh policy per test
/// scenario and hand it to [`ServerConnection::new`](crate::ServerConnection::new).
///
/// No toggle changes the order in which messages enter the transcript. They
/// only decide which messages are sent and what they carry.
#[derive(Debug, Clone, Default)]
pub struct TestPolicy {
    // ClientHello handling
    /// Answer a DTLS ClientHello without the cookie round trip.
    pub skip_hello_verify_request: bool,
    /// Fail unless the framed ClientHello is exactly this long.
    pub require_client_hello_size: Option<usize>,
    /// On renegotiation, fail if the client version changed.
    pub require_same_renegotiation_client_version: bool,
    /// Fail unless the fallback SCSV is offered. Without this toggle an
    /// offered fallback SCSV fails the handshake.
    pub expect_fallback_scsv: bool,
    /// Replace the peer's signature algorithms with ours.
    pub ignore_peer_signature_algorithm_preferences: bool,
    /// Replace the peer's curves with ours.
    pub ignore_peer_curve_preferences: bool,
    /// Replace the peer's cipher suites with ours.
    pub ignore_peer_cipher_preferences: bool,
    /// Fail if a session is offered while renegotiating.
    pub fail_if_resume_on_renegotiation: bool,
    /// Fail if any session ID or ticket is offered.
    pub fail_if_session_offered: bool,
    /// Skip every cipher suite compatibility filter.
    pub enable_all_ciphers: bool,
    /// Resume sessions negotiated at another version.
    pub allow_session_version_mismatch: bool,

    // ServerHello and extensions
    /// Put this suite in the ServerHello instead of the selected one.
    pub send_cipher_suite: Option<u16>,
    /// Issue a new ticket on resumption.
    pub renew_ticket_on_resume: bool,
    /// SCT list to send in a resumed ServerHello.
    pub send_sct_list_on_resume: Option<Vec<u8>>,
    /// Echo the client's value instead of client and server verify data.
    pub empty_renegotiation_info: bool,
    /// Flip a bit in the renegotiation info.
    pub bad_renegotiation_info: bool,
    /// Never send renegotiation info.
    pub no_renegotiation_info: bool,
    /// Send an extension twice.
    pub duplicate_extension: bool,
    /// Fail unless the client asks for this server name.
    pub expect_server_name: Option<String>,
    /// Answer any ALPN offer with this protocol, even an empty one.
    pub alpn_protocol: Option<String>,
    /// Consider NPN even when ALPN was offered.
    pub negotiate_alpn_and_npn: bool,
    /// Write NPN after the other extensions.
    pub swap_npn_and_alpn: bool,
    /// Select this SRTP profile regardless of the offer.
    pub send_srtp_protection_profile: Option<u16>,
    /// Fail unless the client's custom extension carries exactly this.
    pub expected_custom_extension: Option<Vec<u8>>,
    /// Send the custom extension with this payload.
    pub custom_extension: Option<Vec<u8>>,
    /// Never negotiate extended master secret.
    pub no_extended_master_secret: bool,
    /// Fail if extended master secret was not negotiated.
    pub require_extended_master_secret: bool,

    // Server flight
    /// Send an empty Certificate message.
    pub empty_certificate_list: bool,
    /// Send neither Certificate nor a signature over the ECDHE parameters.
    pub unauthenticated_ecdh: bool,
    /// Corrupt the Certificate message type.
    pub wrong_certificate_message_type: bool,
    /// Do not send CertificateStatus even when stapling was negotiated.
    pub skip_certificate_status: bool,
    /// Do not send ServerKeyExchange.
    pub skip_server_key_exchange: bool,
    /// Flip a bit in the ServerKeyExchange signature.
    pub invalid_server_key_exchange_signature: bool,
    /// Send an empty signature algorithm list in CertificateRequest.
    pub no_signature_algorithms: bool,

    // Final flight
    /// Store the session in the cache instead of sending a ticket.
    pub skip_new_session_ticket: bool,
    /// Send a NewSessionTicket with an empty ticket.
    pub send_empty_session_ticket: bool,
    /// Corrupt our Finished verify data.
    pub bad_finished: bool,
    /// Send the start of Finished before ChangeCipherSpec.
    pub fragment_across_change_cipher_spec: bool,
    pub skip_change_cipher_spec: bool,
    /// Payload of ChangeCipherSpec instead of `[1]`.
    pub bad_change_cipher_spec: Option<Vec<u8>>,
    /// Application data to send right after ChangeCipherSpec.
    pub app_data_after_change_cipher_spec: Option<Vec<u8>>,
    /// Send this alert after ChangeCipherSpec and abort.
    pub alert_after_change_cipher_spec: Option<AlertDescription>,
    pub skip_finished: bool,
}

impl TestPolicy {
    /// A policy that misbehaves in no way.
    pub fn new() -> Self {
        Self::default()
    }
}
