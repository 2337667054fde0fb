//! The record layer as seen by the handshake.

use crate::cipher_suite::CipherSuite;
use crate::crypto::TrafficKeys;
use crate::types::{AlertDescription, ContentType, ProtocolVersion};
use crate::Error;

/// Keys and parameters for the record layer after ChangeCipherSpec.
///
/// Handed over once both sides' keys are derived. The write side switches
/// when we send ChangeCipherSpec, the read side when the client's arrives.
#[derive(Debug)]
pub struct CipherSpec {
    pub version: ProtocolVersion,
    pub suite: &'static CipherSuite,
    pub keys: TrafficKeys,
}

/// A handshake message channel over some record transport.
///
/// Handshake messages cross this boundary in TLS framing
/// (`type | length[3] | body`), reassembled, for both TLS and DTLS. Writes
/// may be buffered until [`HandshakeChannel::flush`]. A DTLS channel numbers
/// handshake messages itself, starting at zero in both directions.
pub trait HandshakeChannel {
    /// Block until one complete handshake message is available.
    ///
    /// Anything else arriving first (application data, an alert, a
    /// ChangeCipherSpec) is an error.
    fn read_handshake(&mut self) -> Result<Vec<u8>, Error>;

    /// Block until the peer's ChangeCipherSpec and switch the read side.
    fn read_change_cipher_spec(&mut self) -> Result<(), Error>;

    /// Queue one record. A ChangeCipherSpec record switches the write side.
    fn write_record(&mut self, content_type: ContentType, data: &[u8]) -> Result<(), Error>;

    fn flush(&mut self) -> Result<(), Error>;

    /// Send a fatal alert immediately.
    fn send_alert(&mut self, alert: AlertDescription) -> Result<(), Error>;

    /// Install the pending cipher spec for both directions.
    fn prepare_cipher_spec(&mut self, spec: CipherSpec) -> Result<(), Error>;
}
