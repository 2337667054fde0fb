//! Hands a finished session to the client as a ticket, or to the cache.

use crate::config::Config;
use crate::message::NewSessionTicket;
use crate::policy::TestPolicy;
use crate::session::SessionState;
use crate::Error;

/// Store `state` for later resumption.
///
/// Without negotiated ticket support (or when the policy skips the ticket)
/// the state goes into the session cache under `session_id`, if there is a
/// cache and an ID. Otherwise it is sealed into a NewSessionTicket for the
/// orchestrator to send. A sealing failure aborts the handshake.
pub fn issue(
    config: &Config,
    policy: &TestPolicy,
    state: SessionState,
    ticket_supported: bool,
    session_id: &[u8],
) -> Result<Option<NewSessionTicket>, Error> {
    if !ticket_supported || policy.skip_new_session_ticket {
        if let Some(cache) = config.session_cache() {
            if !session_id.is_empty() {
                debug!("Caching session under {} byte ID", session_id.len());
                cache.put(session_id, state);
            }
        }
        return Ok(None);
    }

    let ticket = if policy.send_empty_session_ticket {
        Vec::new()
    } else {
        config.ticket_sealer().seal(&state)?
    };
    debug!("Issuing {} byte session ticket", ticket.len());

    Ok(Some(NewSessionTicket { ticket }))
}
