//! Decides whether a ClientHello resumes an earlier session.

use crate::cipher_suite::{try_cipher_suite, CipherSuite, SelectionContext};
use crate::config::Config;
use crate::message::ClientHello;
use crate::policy::TestPolicy;
use crate::session::SessionState;
use crate::types::{ClientAuthType, ProtocolVersion};

/// A session the client may resume, with its suite as we support it.
#[derive(Debug)]
pub struct Resumption {
    pub session: SessionState,
    pub suite: &'static CipherSuite,
}

/// Look up the offered ticket or session ID and check the session is still
/// acceptable for this handshake.
///
/// `ctx` describes the current handshake. Any failure means a full
/// handshake, never an error.
pub fn check_for_resumption(
    config: &Config,
    policy: &TestPolicy,
    hello: &ClientHello,
    ctx: &SelectionContext,
) -> Option<Resumption> {
    let session = if !hello.session_ticket.is_empty() {
        if config.session_tickets_disabled() {
            trace!("Ignoring ticket, tickets are disabled");
            return None;
        }
        let Some(session) = config.ticket_sealer().open(&hello.session_ticket) else {
            debug!("Session ticket did not open");
            return None;
        };
        session
    } else {
        let cache = config.session_cache()?;
        let Some(session) = cache.get(&hello.session_id) else {
            trace!("Session ID not in cache");
            return None;
        };
        session
    };

    accept(config, policy, hello, ctx, session)
}

fn accept(
    config: &Config,
    policy: &TestPolicy,
    hello: &ClientHello,
    ctx: &SelectionContext,
    session: SessionState,
) -> Option<Resumption> {
    if !policy.allow_session_version_mismatch && ctx.version != session.version {
        debug!(
            "Not resuming: session is {} but negotiated {}",
            session.version, ctx.version
        );
        return None;
    }

    if !hello.cipher_suites.contains(&session.cipher_suite) {
        debug!("Not resuming: suite 0x{:04x} no longer offered", session.cipher_suite);
        return None;
    }

    let session_ctx = SelectionContext {
        version: session.version,
        ..*ctx
    };
    let suite = try_cipher_suite(session.cipher_suite, config.cipher_suites(), &session_ctx)?;

    let has_client_certs = !session.certificates.is_empty();
    if config.client_auth().requires_cert() && !has_client_certs {
        debug!("Not resuming: client certificate required but session has none");
        return None;
    }
    if has_client_certs && config.client_auth() == ClientAuthType::NoClientCert {
        debug!("Not resuming: session has a client certificate we no longer accept");
        return None;
    }

    Some(Resumption { session, suite })
}

/// Session tickets need TLS 1.0 or later.
pub(crate) fn tickets_allowed(version: ProtocolVersion) -> bool {
    version > ProtocolVersion::Ssl30
}
