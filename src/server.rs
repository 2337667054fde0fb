// TLS/DTLS Server Handshake Flow:
//
// 1. Client sends ClientHello
// 2. DTLS only: Server sends HelloVerifyRequest with a random cookie
//    - Client resends the same ClientHello carrying the cookie
// 3. Version, extensions, then either a cached/ticketed session or a suite
//
// Full handshake:
// 4. Server sends ServerHello, Certificate, CertificateStatus,
//    ServerKeyExchange, CertificateRequest, ServerHelloDone (as applicable)
// 5. Client sends Certificate (if requested), ClientKeyExchange,
//    CertificateVerify (if it presented a certificate), ChangeCipherSpec,
//    NextProtocol, ChannelID, Finished
// 6. Server sends NewSessionTicket, ChangeCipherSpec, Finished
//
// Resumed handshake:
// 4. Server sends ServerHello, NewSessionTicket (renewal only),
//    ChangeCipherSpec, Finished
// 5. Client sends ChangeCipherSpec, NextProtocol, ChannelID, Finished

use std::fmt;
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::channel::{CipherSpec, HandshakeChannel};
use crate::cipher_suite::{self, CipherSuite, SelectionContext, SCSV_FALLBACK};
use crate::client_auth::{self, ClientIdentity};
use crate::config::{Config, ServerCertificate};
use crate::crypto::{verify_channel_id, PeerPublicKey, TrafficKeys};
use crate::extensions::{self, RenegotiationState};
use crate::key_agreement::{self, KeyAgreementContext};
use crate::message::{
    frame, CertificateMsg, CertificateRequest, CertificateStatus, ClientHello, Finished,
    HandshakeMessage, HandshakeType, HelloVerifyRequest, ParseContext, ServerHello,
    ServerKeyExchange, SessionId,
};
use crate::policy::TestPolicy;
use crate::resumption::{self, Resumption};
use crate::session::SessionState;
use crate::ticket;
use crate::transcript::Transcript;
use crate::types::{wire_to_tls, ClientAuthType, ContentType, HashAlgorithm, KeyType};
use crate::types::{ProtocolVersion, COMPRESSION_NULL, POINT_FORMAT_UNCOMPRESSED};
use crate::Error;

/// Server random prefix when a TLS 1.3 capable server negotiates TLS 1.2 or lower.
const DOWNGRADE_TLS13: [u8; 8] = *b"DOWNGRD\x01";

/// Server random prefix when a TLS 1.2 capable server negotiates TLS 1.1 or lower.
const DOWNGRADE_TLS12: [u8; 8] = *b"DOWNGRD\x00";

const COOKIE_LEN: usize = 32;

/// One connection as seen by the server handshake.
///
/// Several handshakes may run on the same connection one after another
/// (renegotiation). The Finished values of the last one bind the next.
pub struct ServerConnection {
    config: Arc<Config>,

    /// Faults to inject and extra expectations.
    policy: TestPolicy,

    /// Datagram transport.
    is_dtls: bool,

    /// State carried from one handshake to the next.
    binding: Binding,

    /// Current handshake state.
    state: ServerState,
}

/// Current state of the server handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Await the first ClientHello.
    AwaitClientHello,

    /// DTLS: HelloVerifyRequest sent, await the ClientHello echoing the cookie.
    AwaitCookieConfirmedClientHello,

    /// Pick version, extensions, and decide between resumption and a full handshake.
    Negotiating,

    /// Send the server flight and process the client's up to CertificateVerify.
    FullHandshake,

    /// Send ServerHello and our Finished from the stored session.
    ResumedHandshake,

    /// Await ChangeCipherSpec and the client's Finished.
    AwaitClientFinished,

    /// Both Finished messages validated.
    Established,

    /// A handshake failed. The connection is unusable.
    Aborted,
}

/// Whether the handshake resumes a session. Chosen once while negotiating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowKind {
    Full,
    Resumed,
}

/// Connection scoped values a later handshake is checked against.
#[derive(Debug, Default)]
struct Binding {
    client_verify: Vec<u8>,
    server_verify: Vec<u8>,
    /// Wire version of the last ClientHello.
    client_version: Option<u16>,
    /// Suite of the last handshake that sent its Finished.
    cipher_suite: Option<u16>,
}

/// Result of a successful handshake.
pub struct Established {
    pub version: ProtocolVersion,
    pub cipher_suite: u16,
    pub did_resume: bool,
    pub server_name: Option<String>,
    /// Protocol agreed through ALPN or NPN.
    pub next_protocol: Option<String>,
    pub used_alpn: bool,
    pub srtp_protection_profile: Option<u16>,
    pub extended_master_secret: bool,
    /// Uncompressed P-256 point (x || y) of the client's Channel ID key.
    pub channel_id: Option<[u8; 64]>,
    /// Client certificate chain, leaf first. Empty without client auth.
    pub peer_certificates: Vec<Vec<u8>>,
    pub verified_chains: Vec<Vec<Vec<u8>>>,
    pub client_random: [u8; 32],
    pub server_random: [u8; 32],
    pub master_secret: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for Established {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Established")
            .field("version", &self.version)
            .field("cipher_suite", &format_args!("0x{:04x}", self.cipher_suite))
            .field("did_resume", &self.did_resume)
            .field("server_name", &self.server_name)
            .field("next_protocol", &self.next_protocol)
            .field("used_alpn", &self.used_alpn)
            .field("srtp_protection_profile", &self.srtp_protection_profile)
            .field("extended_master_secret", &self.extended_master_secret)
            .field("channel_id", &self.channel_id.is_some())
            .field("peer_certificates", &self.peer_certificates.len())
            .finish()
    }
}

impl ServerConnection {
    /// Create the server side of a TLS (`is_dtls == false`) or DTLS connection.
    pub fn new(config: Arc<Config>, policy: TestPolicy, is_dtls: bool) -> ServerConnection {
        ServerConnection {
            config,
            policy,
            is_dtls,
            binding: Binding::default(),
            state: ServerState::AwaitClientHello,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_dtls(&self) -> bool {
        self.is_dtls
    }

    /// Verify data of the client's last Finished.
    pub fn client_verify(&self) -> &[u8] {
        &self.binding.client_verify
    }

    /// Verify data of our last Finished.
    pub fn server_verify(&self) -> &[u8] {
        &self.binding.server_verify
    }

    /// Run one handshake over `channel`.
    ///
    /// On failure the matching alert (if any) has been sent and the
    /// connection is [`ServerState::Aborted`].
    pub fn handshake(&mut self, channel: &mut dyn HandshakeChannel) -> Result<Established, Error> {
        if self.state == ServerState::Aborted {
            return Err(Error::ProtocolViolation(
                "handshake on an aborted connection".to_string(),
            ));
        }

        let config = Arc::clone(&self.config);
        let mut hs = Handshake::new(&config, &self.policy, self.is_dtls, &mut self.binding, channel);
        self.state = ServerState::AwaitClientHello;

        let result = loop {
            let next = match self.state {
                ServerState::AwaitClientHello => hs.read_client_hello(),
                ServerState::AwaitCookieConfirmedClientHello => hs.read_cookie_confirmed_hello(),
                ServerState::Negotiating => hs.negotiate(),
                ServerState::FullHandshake => hs.do_full_handshake(),
                ServerState::ResumedHandshake => hs.do_resume_handshake(),
                ServerState::AwaitClientFinished => hs.read_finished(),
                ServerState::Established => break hs.established(),
                ServerState::Aborted => {
                    break Err(Error::ProtocolViolation("handshake aborted".to_string()))
                }
            };
            match next {
                Ok(next) => {
                    debug!("{:?} -> {:?}", self.state, next);
                    self.state = next;
                }
                Err(e) => break Err(e),
            }
        };

        result.map_err(|err| {
            warn!("Handshake failed in {:?}: {}", self.state, err);
            if let Some(alert) = err.alert() {
                if let Err(e) = hs.channel.send_alert(alert) {
                    debug!("Failed to send {:?} alert: {}", alert, e);
                }
            }
            self.state = ServerState::Aborted;
            err
        })
    }
}

/// Decisions that hold for the rest of the handshake once negotiation is done.
#[derive(Debug, Clone, Copy)]
struct Agreement<'a> {
    version: ProtocolVersion,
    suite: &'static CipherSuite,
    certificate: &'a ServerCertificate,
    flow: FlowKind,
}

/// Per handshake state. Dropped once the handshake finishes or fails.
struct Handshake<'a, 'c> {
    config: &'a Config,
    policy: &'a TestPolicy,
    is_dtls: bool,
    binding: &'a mut Binding,
    channel: &'c mut dyn HandshakeChannel,

    /// DTLS message sequence numbers, as the channel assigns them.
    send_seq: u16,
    recv_seq: u16,

    cookie: Vec<u8>,
    client_hello: ClientHello,
    hello: ServerHello,
    agreement: Option<Agreement<'a>>,
    transcript: Option<Transcript>,
    resumed_session: Option<SessionState>,
    master_secret: Zeroizing<Vec<u8>>,
    extended_master_secret: bool,

    server_name: Option<String>,
    next_protocol: Option<String>,
    used_alpn: bool,
    srtp_protection_profile: Option<u16>,
    channel_id: Option<[u8; 64]>,
    client_certificates: Vec<Vec<u8>>,
    verified_chains: Vec<Vec<Vec<u8>>>,
}

impl<'a, 'c> Handshake<'a, 'c> {
    fn new(
        config: &'a Config,
        policy: &'a TestPolicy,
        is_dtls: bool,
        binding: &'a mut Binding,
        channel: &'c mut dyn HandshakeChannel,
    ) -> Self {
        Handshake {
            config,
            policy,
            is_dtls,
            binding,
            channel,
            send_seq: 0,
            recv_seq: 0,
            cookie: Vec::new(),
            client_hello: ClientHello::default(),
            hello: ServerHello::default(),
            agreement: None,
            transcript: None,
            resumed_session: None,
            master_secret: Zeroizing::new(Vec::new()),
            extended_master_secret: false,
            server_name: None,
            next_protocol: None,
            used_alpn: false,
            srtp_protection_profile: None,
            channel_id: None,
            client_certificates: Vec::new(),
            verified_chains: Vec::new(),
        }
    }

    fn read_client_hello(&mut self) -> Result<ServerState, Error> {
        let (msg, _) = self.read_message()?;
        let HandshakeMessage::ClientHello(hello) = msg else {
            return Err(unexpected("ClientHello", &msg));
        };

        if let Some(size) = self.policy.require_client_hello_size {
            if hello.raw.len() != size {
                return Err(Error::PolicyAssertion(format!(
                    "ClientHello is {} bytes, expected {}",
                    hello.raw.len(),
                    size
                )));
            }
        }
        trace!(
            "ClientHello version 0x{:04x}, {} suites",
            hello.vers,
            hello.cipher_suites.len()
        );
        self.client_hello = hello;

        if !self.is_dtls || self.policy.skip_hello_verify_request {
            return Ok(ServerState::Negotiating);
        }

        self.cookie = self.random_bytes(COOKIE_LEN)?;
        let request = HelloVerifyRequest {
            vers: ProtocolVersion::Tls10.to_wire(true),
            cookie: self.cookie.clone(),
        };
        self.write_handshake(&request.marshal())?;
        self.channel.flush()?;

        Ok(ServerState::AwaitCookieConfirmedClientHello)
    }

    fn read_cookie_confirmed_hello(&mut self) -> Result<ServerState, Error> {
        let (msg, _) = self.read_message()?;
        let HandshakeMessage::ClientHello(hello) = msg else {
            return Err(unexpected("ClientHello", &msg));
        };

        if hello.cookie != self.cookie {
            return Err(Error::ProtocolViolation("invalid cookie".to_string()));
        }
        if !self.client_hello.eq_ignoring_cookie(&hello) {
            return Err(Error::ProtocolViolation(
                "retransmitted ClientHello does not match".to_string(),
            ));
        }
        self.client_hello = hello;

        Ok(ServerState::Negotiating)
    }

    fn negotiate(&mut self) -> Result<ServerState, Error> {
        let version = self.negotiate_version()?;
        debug!("Negotiated {}{}", version, if self.is_dtls { " (DTLS)" } else { "" });

        let mut random = [0u8; 32];
        random.copy_from_slice(&self.random_bytes(32)?);
        if let Some(sentinel) = downgrade_sentinel(version, self.config.max_version()) {
            random[..8].copy_from_slice(&sentinel);
        }
        self.hello = ServerHello {
            vers: version.to_wire(self.is_dtls),
            random,
            compression_method: COMPRESSION_NULL,
            ..Default::default()
        };

        if !self.client_hello.compression_methods.contains(&COMPRESSION_NULL) {
            return Err(Error::NegotiationFailure(
                "client does not support uncompressed connections".to_string(),
            ));
        }

        let renegotiation = RenegotiationState {
            client_verify: &self.binding.client_verify,
            server_verify: &self.binding.server_verify,
        };
        let negotiated = extensions::negotiate(
            self.config,
            self.policy,
            &self.client_hello,
            version,
            renegotiation,
        )?;
        let certificate = negotiated.certificate;
        self.hello.extensions = negotiated.extensions;
        self.server_name = negotiated.server_name;
        self.next_protocol = negotiated.next_protocol;
        self.used_alpn = negotiated.used_alpn;
        self.srtp_protection_profile = negotiated.srtp_protection_profile;

        let supported_curve = self
            .client_hello
            .supported_curves
            .iter()
            .any(|c| self.config.curve_preferences().contains(c));
        let supported_point_format = self
            .client_hello
            .supported_points
            .contains(&POINT_FORMAT_UNCOMPRESSED);
        let ctx = SelectionContext {
            version,
            is_dtls: self.is_dtls,
            elliptic_ok: supported_curve && supported_point_format,
            ecdsa_ok: certificate.key_type() == KeyType::Ecdsa,
            enable_all_ciphers: self.policy.enable_all_ciphers,
        };

        let offered_session = !self.client_hello.session_id.is_empty();
        if self.binding.cipher_suite.is_some()
            && offered_session
            && self.policy.fail_if_resume_on_renegotiation
        {
            return Err(Error::PolicyAssertion(
                "offered resumption on renegotiation".to_string(),
            ));
        }
        if self.policy.fail_if_session_offered
            && (offered_session || !self.client_hello.session_ticket.is_empty())
        {
            return Err(Error::PolicyAssertion(
                "client offered a session ticket or ID".to_string(),
            ));
        }

        if let Some(Resumption { session, suite }) =
            resumption::check_for_resumption(self.config, self.policy, &self.client_hello, &ctx)
        {
            debug!("Resuming session with {}", suite.name);
            self.resumed_session = Some(session);
            self.agreement = Some(Agreement {
                version,
                suite,
                certificate,
                flow: FlowKind::Resumed,
            });
            return Ok(ServerState::ResumedHandshake);
        }

        let (preference, supported) = if self.config.prefer_server_cipher_suites() {
            (self.config.cipher_suites(), &self.client_hello.cipher_suites[..])
        } else {
            (&self.client_hello.cipher_suites[..], self.config.cipher_suites())
        };
        let suite = cipher_suite::select(preference, supported, &ctx).ok_or_else(|| {
            Error::NegotiationFailure(
                "no cipher suite supported by both client and server".to_string(),
            )
        })?;
        debug!("Selected cipher suite {}", suite.name);

        self.agreement = Some(Agreement {
            version,
            suite,
            certificate,
            flow: FlowKind::Full,
        });
        Ok(ServerState::FullHandshake)
    }

    /// Version checks on the ClientHello, then the policy's rewrites of it.
    fn negotiate_version(&mut self) -> Result<ProtocolVersion, Error> {
        let offered = self.client_hello.vers;

        if self.policy.require_same_renegotiation_client_version {
            if let Some(previous) = self.binding.client_version {
                if previous != offered {
                    return Err(Error::PolicyAssertion(
                        "client offered different version on renegotiation".to_string(),
                    ));
                }
            }
        }
        self.binding.client_version = Some(offered);

        // A version from the wrong protocol family maps to 0 and fails here.
        let client_version = wire_to_tls(offered, self.is_dtls);
        let version = self
            .config
            .mutual_version(client_version, self.is_dtls)
            .ok_or(Error::UnsupportedVersion(offered))?;

        if client_version < ProtocolVersion::Tls12.as_u16() {
            if !self.client_hello.signature_algorithms.is_empty() {
                return Err(Error::PolicyAssertion(
                    "client included signature_algorithms before TLS 1.2".to_string(),
                ));
            }
            if cipher_suite::any_tls12_only(&self.client_hello.cipher_suites) {
                return Err(Error::PolicyAssertion(
                    "client offered TLS 1.2 cipher before TLS 1.2".to_string(),
                ));
            }
        }

        let fallback = self.client_hello.cipher_suites.contains(&SCSV_FALLBACK);
        if !fallback && self.policy.expect_fallback_scsv {
            return Err(Error::PolicyAssertion(
                "no fallback SCSV found when expected".to_string(),
            ));
        } else if fallback && !self.policy.expect_fallback_scsv {
            return Err(Error::PolicyAssertion(
                "fallback SCSV found when not expected".to_string(),
            ));
        }

        if self.policy.ignore_peer_signature_algorithm_preferences {
            self.client_hello.signature_algorithms = self.config.signature_algorithms().to_vec();
        }
        if self.policy.ignore_peer_curve_preferences {
            self.client_hello.supported_curves = self.config.curve_preferences().to_vec();
        }
        if self.policy.ignore_peer_cipher_preferences {
            self.client_hello.cipher_suites = self.config.cipher_suites().to_vec();
        }

        Ok(version)
    }

    fn do_resume_handshake(&mut self) -> Result<ServerState, Error> {
        let agreement = self.agreement()?;
        let session = self
            .resumed_session
            .clone()
            .ok_or_else(|| out_of_order("resumption without a session"))?;

        self.hello.cipher_suite = self.policy.send_cipher_suite.unwrap_or(agreement.suite.id);
        // Echoing the session ID tells the client we resume.
        self.hello.session_id = self.client_hello.session_id.clone();
        self.hello.extensions.ticket_supported = self.policy.renew_ticket_on_resume;
        if let Some(sct_list) = &self.policy.send_sct_list_on_resume {
            self.hello.extensions.sct_list = Some(sct_list.clone());
        }

        let mut transcript = Transcript::new(agreement.version, agreement.suite, self.is_dtls);
        transcript.discard_buffer();
        self.transcript = Some(transcript);
        let raw = self.client_hello.raw.clone();
        self.transcribe_received(&raw);
        self.write_handshake(&self.hello.marshal())?;

        if !session.certificates.is_empty() {
            self.process_client_certificates(&session.certificates)?;
        }

        self.master_secret = session.master_secret.clone();
        self.extended_master_secret = session.extended_master_secret;

        self.establish_keys()?;
        if self.policy.renew_ticket_on_resume {
            self.send_session_ticket()?;
        }
        self.send_finished()?;

        Ok(ServerState::AwaitClientFinished)
    }

    fn do_full_handshake(&mut self) -> Result<ServerState, Error> {
        let agreement = self.agreement()?;
        let Agreement {
            version,
            suite,
            certificate,
            ..
        } = agreement;
        let config = self.config;
        let policy = self.policy;

        let is_psk = suite.is_psk();
        if !is_psk && self.client_hello.ocsp_stapling && !certificate.ocsp_staple().is_empty() {
            self.hello.extensions.ocsp_stapling = true;
        }
        if self.client_hello.sct_list_supported && !certificate.sct_list().is_empty() {
            self.hello.extensions.sct_list = Some(certificate.sct_list().to_vec());
        }
        self.hello.extensions.ticket_supported = self.client_hello.ticket_supported
            && !config.session_tickets_disabled()
            && resumption::tickets_allowed(version);
        self.hello.cipher_suite = policy.send_cipher_suite.unwrap_or(suite.id);
        self.extended_master_secret = self.hello.extensions.extended_master_secret;

        // A session ID is only worth handing out if we can store the session.
        if !self.hello.extensions.ticket_supported && config.session_cache().is_some() {
            let id = self.random_bytes(32)?;
            self.hello.session_id = SessionId::new();
            self.hello.session_id.extend_from_slice(&id);
        }

        self.transcript = Some(Transcript::new(version, suite, self.is_dtls));
        let raw = self.client_hello.raw.clone();
        self.transcribe_received(&raw);
        self.write_handshake(&self.hello.marshal())?;

        if !is_psk {
            let certificates = if policy.empty_certificate_list {
                Vec::new()
            } else {
                certificate.chain().to_vec()
            };
            if !policy.unauthenticated_ecdh {
                let mut msg = CertificateMsg { certificates }.marshal();
                if policy.wrong_certificate_message_type {
                    msg[0] = msg[0].wrapping_add(42);
                }
                self.write_handshake(&msg)?;
            }
        }

        if self.hello.extensions.ocsp_stapling && !policy.skip_certificate_status {
            let status = CertificateStatus {
                response: certificate.ocsp_staple().to_vec(),
            };
            self.write_handshake(&status.marshal())?;
        }

        let mut key_agreement = key_agreement::for_suite(suite.kx);
        let server_key_exchange =
            key_agreement.generate_server_key_exchange(&self.key_agreement_context(agreement))?;
        if let Some(key) = server_key_exchange {
            if !policy.skip_server_key_exchange {
                self.write_handshake(&ServerKeyExchange { key }.marshal())?;
            }
        }

        let client_auth = config.client_auth();
        if client_auth >= ClientAuthType::RequestClientCert {
            let has_signature_algorithms = version >= ProtocolVersion::Tls12;
            let signature_algorithms = if has_signature_algorithms && !policy.no_signature_algorithms {
                config.signature_algorithms().to_vec()
            } else {
                Vec::new()
            };
            // No CAs means any certificate will do.
            let request = CertificateRequest {
                certificate_types: config.client_certificate_types().to_vec(),
                has_signature_algorithms,
                signature_algorithms,
                certificate_authorities: config.client_cert_verifier().root_subjects(),
            };
            self.write_handshake(&request.marshal())?;
        }

        self.write_handshake(&frame(HandshakeType::ServerHelloDone, &[]))?;
        self.channel.flush()?;

        let (mut msg, mut raw) = self.read_message()?;

        let mut peer_key = None;
        if client_auth >= ClientAuthType::RequestClientCert {
            let mut certificates = Vec::new();
            let sent_certificate = match &msg {
                HandshakeMessage::Certificate(cert_msg) => {
                    if version == ProtocolVersion::Ssl30 && cert_msg.certificates.is_empty() {
                        return Err(Error::ProtocolViolation(
                            "empty certificate message in SSL 3.0".to_string(),
                        ));
                    }
                    self.transcribe_received(&raw);
                    certificates = cert_msg.certificates.clone();
                    true
                }
                // An SSL 3.0 client without certificates skips the message.
                _ if version == ProtocolVersion::Ssl30 => false,
                _ => return Err(unexpected("Certificate", &msg)),
            };

            if certificates.is_empty() && client_auth.requires_cert() {
                return Err(Error::bad_certificate("client didn't provide a certificate"));
            }
            peer_key = self.process_client_certificates(&certificates)?;

            if sent_certificate {
                (msg, raw) = self.read_message()?;
            }
        }

        let HandshakeMessage::ClientKeyExchange(client_key_exchange) = msg else {
            return Err(unexpected("ClientKeyExchange", &msg));
        };
        self.transcribe_received(&raw);

        let pre_master_secret = key_agreement.process_client_key_exchange(
            &self.key_agreement_context(agreement),
            &client_key_exchange.ciphertext,
        )?;

        let deriver = config.crypto_provider().key_deriver;
        self.master_secret = if self.extended_master_secret {
            let session_hash = self.transcript()?.sum();
            deriver.extended_master_secret(
                version,
                suite.prf_hash(),
                &pre_master_secret,
                &session_hash,
            )?
        } else {
            if policy.require_extended_master_secret {
                return Err(Error::PolicyAssertion(
                    "extended master secret required but not supported by peer".to_string(),
                ));
            }
            deriver.master_secret(
                version,
                suite.prf_hash(),
                &pre_master_secret,
                &self.client_hello.random,
                &self.hello.random,
            )?
        };

        if let Some(peer_key) = peer_key {
            self.read_certificate_verify(version, &peer_key)?;
        }

        if let Some(transcript) = &mut self.transcript {
            transcript.discard_buffer();
        }

        self.establish_keys()?;

        Ok(ServerState::AwaitClientFinished)
    }

    /// The client proves it holds the key of the certificate it presented.
    fn read_certificate_verify(
        &mut self,
        version: ProtocolVersion,
        peer_key: &PeerPublicKey,
    ) -> Result<(), Error> {
        let (msg, raw) = self.read_message()?;
        let HandshakeMessage::CertificateVerify(certificate_verify) = msg else {
            return Err(unexpected("CertificateVerify", &msg));
        };

        if let Some(alg) = certificate_verify.signature_algorithm {
            if !self.config.signature_algorithms().contains(&alg) {
                return Err(Error::handshake_auth(format!(
                    "unsupported signature algorithm {:?} for client certificate",
                    alg
                )));
            }
        }

        let transcript = self.transcript()?;
        let verified = if version > ProtocolVersion::Ssl30 {
            let buffer = transcript
                .buffer()
                .ok_or_else(|| out_of_order("transcript buffer discarded before CertificateVerify"))?;
            signature_hash(certificate_verify.signature_algorithm, peer_key.key_type())
                .and_then(|hash| peer_key.verify(hash, buffer, &certificate_verify.signature))
        } else if peer_key.key_type() == KeyType::Rsa {
            // SSL 3.0 has its own digest and no signature algorithm.
            let digest = transcript.ssl30_certificate_verify_digest(&self.master_secret)?;
            peer_key.verify_prehashed(HashAlgorithm::Md5Sha1, &digest, &certificate_verify.signature)
        } else {
            Err("unsupported key type for client certificate".to_string())
        };
        verified.map_err(|e| {
            Error::bad_certificate(format!(
                "could not validate signature of connection nonces: {}",
                e
            ))
        })?;

        self.transcribe_received(&raw);
        Ok(())
    }

    fn read_finished(&mut self) -> Result<ServerState, Error> {
        let agreement = self.agreement()?;

        self.channel.read_change_cipher_spec()?;

        if self.hello.extensions.next_proto_neg {
            let (msg, raw) = self.read_message()?;
            let HandshakeMessage::NextProtocol(next_proto) = msg else {
                return Err(unexpected("NextProtocol", &msg));
            };
            self.transcribe_received(&raw);
            debug!("Client selected protocol {:?} over NPN", next_proto.proto);
            self.next_protocol = Some(next_proto.proto);
        }

        if self.hello.extensions.channel_id_requested {
            let (msg, raw) = self.read_message()?;
            let HandshakeMessage::ChannelId(channel_id) = msg else {
                return Err(unexpected("ChannelID", &msg));
            };
            let [x, y, r, s] = channel_id.parts();
            let resume_hash = match agreement.flow {
                FlowKind::Resumed => self.resumed_session.as_ref().map(|s| &s.handshake_hash[..]),
                FlowKind::Full => None,
            };
            let hashed = self.transcript()?.channel_id_hash(resume_hash);
            verify_channel_id(&x, &y, &r, &s, &hashed)
                .map_err(|e| Error::handshake_auth(format!("invalid channel ID: {}", e)))?;

            let mut key = [0u8; 64];
            key[..32].copy_from_slice(&x);
            key[32..].copy_from_slice(&y);
            self.channel_id = Some(key);
            self.transcribe_received(&raw);
        }

        let (msg, raw) = self.read_message()?;
        let HandshakeMessage::Finished(finished) = msg else {
            return Err(unexpected("Finished", &msg));
        };
        self.transcript()?
            .verify_client_finished(&self.master_secret, &finished.verify_data)?;
        self.binding.client_verify = finished.verify_data;
        self.transcribe_received(&raw);

        if agreement.flow == FlowKind::Full {
            self.send_session_ticket()?;
            self.send_finished()?;
        }

        Ok(ServerState::Established)
    }

    fn established(&mut self) -> Result<Established, Error> {
        let agreement = self.agreement()?;
        debug!(
            "Handshake complete: {} {}{}",
            agreement.version,
            agreement.suite.name,
            if agreement.flow == FlowKind::Resumed { " (resumed)" } else { "" }
        );

        Ok(Established {
            version: agreement.version,
            cipher_suite: agreement.suite.id,
            did_resume: agreement.flow == FlowKind::Resumed,
            server_name: self.server_name.take(),
            next_protocol: self.next_protocol.take(),
            used_alpn: self.used_alpn,
            srtp_protection_profile: self.srtp_protection_profile,
            extended_master_secret: self.extended_master_secret,
            channel_id: self.channel_id,
            peer_certificates: std::mem::take(&mut self.client_certificates),
            verified_chains: std::mem::take(&mut self.verified_chains),
            client_random: self.client_hello.random,
            server_random: self.hello.random,
            master_secret: self.master_secret.clone(),
        })
    }

    /// Derive the key block and hand both directions to the record layer.
    fn establish_keys(&mut self) -> Result<(), Error> {
        let Agreement { version, suite, .. } = self.agreement()?;

        let block = self.config.crypto_provider().key_deriver.key_block(
            version,
            suite.prf_hash(),
            &self.master_secret,
            &self.client_hello.random,
            &self.hello.random,
            suite.key_block_len(),
        )?;
        let keys = TrafficKeys::split(&block, suite.mac_len, suite.key_len, suite.iv_len)?;
        trace!("Key block of {} bytes for {}", block.len(), suite.name);

        self.channel.prepare_cipher_spec(CipherSpec {
            version,
            suite,
            keys,
        })
    }

    fn send_session_ticket(&mut self) -> Result<(), Error> {
        let Agreement { version, suite, .. } = self.agreement()?;
        let state = SessionState {
            version,
            cipher_suite: suite.id,
            master_secret: self.master_secret.clone(),
            handshake_hash: self.transcript()?.handshake_digest(),
            certificates: self.client_certificates.clone(),
            extended_master_secret: self.extended_master_secret,
        };

        let issued = ticket::issue(
            self.config,
            self.policy,
            state,
            self.hello.extensions.ticket_supported,
            &self.hello.session_id,
        )?;
        if let Some(new_session_ticket) = issued {
            self.write_handshake(&new_session_ticket.marshal())?;
        }
        Ok(())
    }

    fn send_finished(&mut self) -> Result<(), Error> {
        let suite = self.agreement()?.suite;
        let policy = self.policy;

        let mut verify_data = self.transcript()?.server_sum(&self.master_secret)?;
        if policy.bad_finished {
            if let Some(first) = verify_data.first_mut() {
                *first = first.wrapping_add(1);
            }
        }
        self.binding.server_verify = verify_data.clone();

        let finished = Finished { verify_data }.marshal();
        self.transcribe_sent(&finished);

        let mut post_ccs = &finished[..];
        if policy.fragment_across_change_cipher_spec {
            let (head, tail) = finished.split_at(5.min(finished.len()));
            self.channel.write_record(ContentType::Handshake, head)?;
            post_ccs = tail;
        }
        self.channel.flush()?;

        if !policy.skip_change_cipher_spec {
            let ccs = policy.bad_change_cipher_spec.as_deref().unwrap_or(&[1]);
            self.channel.write_record(ContentType::ChangeCipherSpec, ccs)?;
        }

        if let Some(data) = &policy.app_data_after_change_cipher_spec {
            self.channel.write_record(ContentType::ApplicationData, data)?;
        }
        if let Some(alert) = policy.alert_after_change_cipher_spec {
            self.channel.send_alert(alert)?;
            return Err(Error::InjectedAlert(alert));
        }

        if !policy.skip_finished {
            self.channel.write_record(ContentType::Handshake, post_ccs)?;
            self.channel.flush()?;
        }
        self.send_seq = self.send_seq.wrapping_add(1);

        self.binding.cipher_suite = Some(suite.id);
        Ok(())
    }

    fn process_client_certificates(
        &mut self,
        certificates: &[Vec<u8>],
    ) -> Result<Option<PeerPublicKey>, Error> {
        self.client_certificates = certificates.to_vec();
        let identity = client_auth::process_client_certificates(
            certificates,
            self.config.client_auth(),
            self.config.client_cert_verifier(),
        )?;

        Ok(identity.map(|ClientIdentity { public_key, verified_chains }| {
            self.verified_chains = verified_chains;
            public_key
        }))
    }

    fn key_agreement_context(&self, agreement: Agreement<'a>) -> KeyAgreementContext<'_> {
        KeyAgreementContext {
            config: self.config,
            policy: self.policy,
            certificate: agreement.certificate,
            client_hello: &self.client_hello,
            server_random: &self.hello.random,
            version: agreement.version,
        }
    }

    /// Read and decode the next handshake message, keeping the raw bytes for
    /// the transcript.
    fn read_message(&mut self) -> Result<(HandshakeMessage, Vec<u8>), Error> {
        let raw = self.channel.read_handshake()?;
        self.recv_seq = self.recv_seq.wrapping_add(1);

        let ctx = ParseContext {
            is_dtls: self.is_dtls,
            version: self.agreement.map(|a| a.version),
        };
        let msg = HandshakeMessage::decode(&raw, ctx)?;
        trace!("Received {} ({} bytes)", msg.name(), raw.len());
        Ok((msg, raw))
    }

    /// Hash and queue one of our handshake messages.
    fn write_handshake(&mut self, msg: &[u8]) -> Result<(), Error> {
        self.transcribe_sent(msg);
        self.channel.write_record(ContentType::Handshake, msg)?;
        self.send_seq = self.send_seq.wrapping_add(1);
        Ok(())
    }

    fn transcribe_sent(&mut self, msg: &[u8]) {
        if let Some(transcript) = &mut self.transcript {
            transcript.add(msg, self.send_seq);
        }
    }

    /// Hash the message read last.
    fn transcribe_received(&mut self, msg: &[u8]) {
        let seq = self.recv_seq.wrapping_sub(1);
        if let Some(transcript) = &mut self.transcript {
            transcript.add(msg, seq);
        }
    }

    fn random_bytes(&self, n: usize) -> Result<Vec<u8>, Error> {
        self.config.crypto_provider().random_bytes(n)
    }

    fn agreement(&self) -> Result<Agreement<'a>, Error> {
        self.agreement
            .ok_or_else(|| out_of_order("no cipher suite negotiated"))
    }

    fn transcript(&self) -> Result<&Transcript, Error> {
        self.transcript
            .as_ref()
            .ok_or_else(|| out_of_order("no transcript"))
    }
}

/// The sentinel a server capable of a higher version puts in its random.
fn downgrade_sentinel(version: ProtocolVersion, max_version: ProtocolVersion) -> Option<[u8; 8]> {
    if version <= ProtocolVersion::Tls11 && max_version == ProtocolVersion::Tls12 {
        Some(DOWNGRADE_TLS12)
    } else if version <= ProtocolVersion::Tls12 && max_version >= ProtocolVersion::Tls13 {
        Some(DOWNGRADE_TLS13)
    } else {
        None
    }
}

/// The hash a client's CertificateVerify is computed with.
///
/// Before TLS 1.2 it follows from the key: MD5+SHA-1 for RSA, SHA-1 for ECDSA.
fn signature_hash(
    signature_algorithm: Option<crate::types::SignatureScheme>,
    key_type: KeyType,
) -> Result<HashAlgorithm, String> {
    match signature_algorithm {
        Some(alg) => {
            if alg.key_type() != Some(key_type) {
                return Err(format!("{:?} does not match a {:?} key", alg, key_type));
            }
            alg.hash()
                .ok_or_else(|| format!("unknown signature algorithm {:?}", alg))
        }
        None => Ok(match key_type {
            KeyType::Rsa => HashAlgorithm::Md5Sha1,
            KeyType::Ecdsa => HashAlgorithm::Sha1,
        }),
    }
}

fn unexpected(expected: &str, got: &HandshakeMessage) -> Error {
    Error::ProtocolViolation(format!("expected {}, got {}", expected, got.name()))
}

fn out_of_order(what: &str) -> Error {
    Error::ProtocolViolation(format!("handshake state: {}", what))
}
