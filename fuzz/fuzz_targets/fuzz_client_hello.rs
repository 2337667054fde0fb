#![no_main]

//! Fuzz target for the server's first flight.
//!
//! The input is fed as the client's first handshake message, in TLS framing
//! and again in DTLS mode. The server must answer with an error or a flight,
//! never panic.

use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;
use std::sync::Arc;

use tlspeer::certificate;
use tlspeer::{
    AlertDescription, CipherSpec, Config, ContentType, Error, HandshakeChannel,
    ServerCertificate, ServerConnection, TestPolicy,
};

static CONFIG: Lazy<Option<Arc<Config>>> = Lazy::new(|| {
    let cert = certificate::generate_self_signed_certificate().ok()?;
    let cert = ServerCertificate::new(vec![cert.certificate], &cert.private_key).ok()?;
    let config = Config::builder().certificate(cert).build().ok()?;
    Some(Arc::new(config))
});

/// Yields the input once, then runs dry.
struct OneShot<'a> {
    input: Option<&'a [u8]>,
}

impl HandshakeChannel for OneShot<'_> {
    fn read_handshake(&mut self) -> Result<Vec<u8>, Error> {
        self.input
            .take()
            .map(|i| i.to_vec())
            .ok_or_else(|| Error::Transport("end of input".to_string()))
    }

    fn read_change_cipher_spec(&mut self) -> Result<(), Error> {
        Err(Error::Transport("end of input".to_string()))
    }

    fn write_record(&mut self, _: ContentType, _: &[u8]) -> Result<(), Error> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn send_alert(&mut self, _: AlertDescription) -> Result<(), Error> {
        Ok(())
    }

    fn prepare_cipher_spec(&mut self, _: CipherSpec) -> Result<(), Error> {
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    let Some(config) = CONFIG.as_ref() else {
        return;
    };

    for is_dtls in [false, true] {
        let policy = TestPolicy {
            skip_hello_verify_request: true,
            ..TestPolicy::new()
        };
        let mut conn = ServerConnection::new(Arc::clone(config), policy, is_dtls);
        let mut channel = OneShot { input: Some(data) };
        let _ = conn.handshake(&mut channel);
    }

    // Same input with a TLS handshake header in front.
    if data.len() < 0xffffff {
        let mut framed = vec![1];
        framed.extend_from_slice(&(data.len() as u32).to_be_bytes()[1..]);
        framed.extend_from_slice(data);

        let mut conn = ServerConnection::new(Arc::clone(config), TestPolicy::new(), false);
        let mut channel = OneShot {
            input: Some(&framed),
        };
        let _ = conn.handshake(&mut channel);
    }
});
