use thiserror::Error;

use crate::types::AlertDescription;

/// Errors that terminate a handshake attempt.
///
/// Every handshake failure is terminal. The orchestrator sends the alert
/// returned by [`Error::alert`] before handing the error to the caller.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Unexpected message type or ordering, bad cookie, mismatched ClientHello.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A message could not be parsed.
    #[error("decode error: {0}")]
    Decode(String),

    /// No mutually supported protocol version.
    #[error("unsupported protocol version 0x{0:04x}")]
    UnsupportedVersion(u16),

    /// No mutual cipher suite or compression, or a failed key exchange.
    #[error("negotiation failure: {0}")]
    NegotiationFailure(String),

    /// Bad peer certificate, CertificateVerify, Finished or Channel ID.
    #[error("authentication failure: {reason}")]
    AuthenticationFailure {
        alert: AlertDescription,
        reason: String,
    },

    /// Entropy exhaustion, ticket sealing failure or a missing certificate.
    #[error("resource failure: {0}")]
    ResourceFailure(String),

    /// A test policy expectation did not hold.
    #[error("policy assertion failed: {0}")]
    PolicyAssertion(String),

    /// The handshake channel failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// The test policy asked us to abort with a specific alert.
    #[error("injected alert {0:?}")]
    InjectedAlert(AlertDescription),
}

impl Error {
    /// The alert to send to the peer before aborting, if any.
    pub fn alert(&self) -> Option<AlertDescription> {
        match self {
            Error::ProtocolViolation(_) => Some(AlertDescription::UnexpectedMessage),
            Error::Decode(_) => Some(AlertDescription::DecodeError),
            Error::UnsupportedVersion(_) => Some(AlertDescription::ProtocolVersion),
            Error::NegotiationFailure(_) => Some(AlertDescription::HandshakeFailure),
            Error::AuthenticationFailure { alert, .. } => Some(*alert),
            Error::ResourceFailure(_) => Some(AlertDescription::InternalError),
            Error::PolicyAssertion(_) => None,
            Error::Transport(_) => None,
            Error::Config(_) => None,
            // Already sent.
            Error::InjectedAlert(_) => None,
        }
    }

    pub(crate) fn bad_certificate(reason: impl Into<String>) -> Self {
        Error::AuthenticationFailure {
            alert: AlertDescription::BadCertificate,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported_certificate(reason: impl Into<String>) -> Self {
        Error::AuthenticationFailure {
            alert: AlertDescription::UnsupportedCertificate,
            reason: reason.into(),
        }
    }

    pub(crate) fn handshake_auth(reason: impl Into<String>) -> Self {
        Error::AuthenticationFailure {
            alert: AlertDescription::HandshakeFailure,
            reason: reason.into(),
        }
    }
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(value: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match value {
            nom::Err::Incomplete(_) => Error::Decode("truncated message".to_string()),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                Error::Decode(format!("parse failed: {:?}", e.code))
            }
        }
    }
}
