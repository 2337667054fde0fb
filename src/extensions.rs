//! ClientHello extension processing and the matching ServerHello extensions.

use crate::config::{Config, ServerCertificate};
use crate::message::{ClientHello, ServerExtensions};
use crate::policy::TestPolicy;
use crate::types::ProtocolVersion;
use crate::Error;

/// Renegotiation binding carried over from the previous handshake on the
/// same connection. Empty on an initial handshake.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenegotiationState<'a> {
    pub client_verify: &'a [u8],
    pub server_verify: &'a [u8],
}

/// Outcome of extension negotiation.
#[derive(Debug)]
pub struct Negotiated<'a> {
    /// ServerHello extensions. The orchestrator fills in the ones that depend
    /// on the handshake flow (tickets, OCSP, SCT).
    pub extensions: ServerExtensions,
    pub certificate: &'a ServerCertificate,
    pub server_name: Option<String>,
    /// ALPN protocol, or the NPN protocol once the client has chosen one.
    pub next_protocol: Option<String>,
    pub used_alpn: bool,
    pub srtp_protection_profile: Option<u16>,
    pub extended_master_secret: bool,
    pub channel_id_requested: bool,
}

/// Our first protocol the client also offered. `None` when nothing overlaps.
fn mutual_protocol<'b>(offered: &[String], ours: &'b [String]) -> Option<&'b String> {
    ours.iter().find(|p| offered.contains(p))
}

/// Process the extensions of `hello` negotiated at `version`.
pub fn negotiate<'a>(
    config: &'a Config,
    policy: &TestPolicy,
    hello: &ClientHello,
    version: ProtocolVersion,
    renegotiation: RenegotiationState<'_>,
) -> Result<Negotiated<'a>, Error> {
    let mut extensions = ServerExtensions::default();

    let offered_binding = hello.secure_renegotiation.as_deref().unwrap_or_default();
    if offered_binding != renegotiation.client_verify {
        return Err(Error::NegotiationFailure("renegotiation mismatch".to_string()));
    }

    extensions.secure_renegotiation =
        if !renegotiation.client_verify.is_empty() && !policy.empty_renegotiation_info {
            let mut info = renegotiation.client_verify.to_vec();
            info.extend_from_slice(renegotiation.server_verify);
            if policy.bad_renegotiation_info {
                info[0] ^= 0x80;
            }
            Some(info)
        } else {
            hello.secure_renegotiation.clone()
        };
    if policy.no_renegotiation_info {
        extensions.secure_renegotiation = None;
    }

    extensions.duplicate_extension = policy.duplicate_extension;

    let server_name = (!hello.server_name.is_empty()).then(|| hello.server_name.clone());
    let certificate = config
        .certificate_for_name(&hello.server_name)
        .ok_or_else(|| Error::ResourceFailure("no certificates configured".to_string()))?;

    if let Some(expected) = &policy.expect_server_name {
        if *expected != hello.server_name {
            return Err(Error::PolicyAssertion(format!(
                "unexpected server name {:?}",
                hello.server_name
            )));
        }
    }

    let mut next_protocol = None;
    let mut used_alpn = false;
    if !hello.alpn_protocols.is_empty() {
        if let Some(forced) = &policy.alpn_protocol {
            extensions.alpn_protocol = Some(forced.clone());
            next_protocol = Some(forced.clone());
            used_alpn = true;
        } else if let Some(proto) = mutual_protocol(&hello.alpn_protocols, config.next_protos()) {
            extensions.alpn_protocol = Some(proto.clone());
            next_protocol = Some(proto.clone());
            used_alpn = true;
        }
    }
    if hello.alpn_protocols.is_empty() || policy.negotiate_alpn_and_npn {
        // Never answer NPN with an empty list.
        if hello.next_proto_neg && !config.next_protos().is_empty() {
            extensions.next_proto_neg = true;
            extensions.next_protos = config.next_protos().to_vec();
            extensions.npn_last = policy.swap_npn_and_alpn;
        }
    }

    extensions.extended_master_secret = version >= ProtocolVersion::Tls10
        && hello.extended_master_secret
        && !policy.no_extended_master_secret;

    extensions.channel_id_requested = hello.channel_id_supported && config.request_channel_id();

    let mut srtp_protection_profile = config
        .srtp_protection_profiles()
        .iter()
        .find(|p| hello.srtp_protection_profiles.contains(p))
        .copied();
    if let Some(forced) = policy.send_srtp_protection_profile {
        srtp_protection_profile = Some(forced);
    }
    extensions.srtp_protection_profile = srtp_protection_profile.unwrap_or(0);

    if let Some(expected) = &policy.expected_custom_extension {
        let received = hello.custom_extension.as_deref().unwrap_or_default();
        if received != &expected[..] {
            return Err(Error::PolicyAssertion(format!(
                "bad custom extension contents {:?}",
                received
            )));
        }
    }
    extensions.custom_extension = policy.custom_extension.clone();

    debug!(
        "Extensions: sni={:?} alpn={:?} npn={} ems={} channel_id={} srtp={:?}",
        server_name,
        extensions.alpn_protocol,
        extensions.next_proto_neg,
        extensions.extended_master_secret,
        extensions.channel_id_requested,
        srtp_protection_profile
    );

    Ok(Negotiated {
        extended_master_secret: extensions.extended_master_secret,
        channel_id_requested: extensions.channel_id_requested,
        extensions,
        certificate,
        server_name,
        next_protocol,
        used_alpn,
        srtp_protection_profile,
    })
}
