//! Resumable session state and the collaborators that store it.
//!
//! A [`SessionState`] either lives in a server side [`SessionCache`] keyed by
//! session ID, or travels to the client sealed by a [`TicketSealer`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;
use zeroize::Zeroizing;

use crate::crypto::SecureRandom;
use crate::message::{put_u16, put_u16_vec, put_u24_vec, u16_vec, u24_vec};
use crate::types::ProtocolVersion;
use crate::Error;

/// Everything needed to resume a session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionState {
    pub version: ProtocolVersion,
    pub cipher_suite: u16,
    pub master_secret: Zeroizing<Vec<u8>>,
    /// Handshake hash at the end of the original handshake. Bound into the
    /// Channel ID signature of a resumption.
    pub handshake_hash: Vec<u8>,
    /// Client certificate chain, empty if none was presented.
    pub certificates: Vec<Vec<u8>>,
    pub extended_master_secret: bool,
}

impl SessionState {
    /// Serialize as ticket plaintext.
    ///
    /// Fails when a field does not fit its length prefix.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let too_long = |what: &str| {
            Error::ResourceFailure(format!("{} too long for session state", what))
        };
        if self.master_secret.len() > u16::MAX as usize {
            return Err(too_long("master secret"));
        }
        if self.handshake_hash.len() > u16::MAX as usize {
            return Err(too_long("handshake hash"));
        }
        let count =
            u16::try_from(self.certificates.len()).map_err(|_| too_long("certificate chain"))?;
        if self.certificates.iter().any(|c| c.len() > U24_MAX) {
            return Err(too_long("certificate"));
        }

        let mut out = Vec::new();
        put_u16(&mut out, self.version.as_u16());
        put_u16(&mut out, self.cipher_suite);
        put_u16_vec(&mut out, &self.master_secret);
        put_u16_vec(&mut out, &self.handshake_hash);
        put_u16(&mut out, count);
        for cert in &self.certificates {
            put_u24_vec(&mut out, cert);
        }
        out.push(self.extended_master_secret as u8);
        Ok(out)
    }

    /// Parse ticket plaintext. Trailing bytes are an error.
    pub fn decode(input: &[u8]) -> Result<SessionState, Error> {
        let (rest, state) = Self::parse(input)?;
        if !rest.is_empty() {
            return Err(Error::Decode("trailing bytes in session state".to_string()));
        }
        Ok(state)
    }

    fn parse(input: &[u8]) -> IResult<&[u8], SessionState> {
        let (input, version) = be_u16(input)?;
        let (input, cipher_suite) = be_u16(input)?;
        let (input, master_secret) = u16_vec(input)?;
        let (input, handshake_hash) = u16_vec(input)?;
        let (mut input, count) = be_u16(input)?;

        let mut certificates = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (rest, cert) = u24_vec(input)?;
            certificates.push(cert.to_vec());
            input = rest;
        }

        let (input, ems) = be_u8(input)?;

        let version = ProtocolVersion::from_u16(version).ok_or(nom::Err::Failure(
            nom::error::Error::new(input, nom::error::ErrorKind::Verify),
        ))?;

        Ok((
            input,
            SessionState {
                version,
                cipher_suite,
                master_secret: Zeroizing::new(master_secret.to_vec()),
                handshake_hash: handshake_hash.to_vec(),
                certificates,
                extended_master_secret: ems == 1,
            },
        ))
    }
}

impl Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("version", &self.version)
            .field("cipher_suite", &format_args!("0x{:04x}", self.cipher_suite))
            .field("certificates", &self.certificates.len())
            .field("extended_master_secret", &self.extended_master_secret)
            .finish()
    }
}

/// Server side session storage keyed by session ID.
///
/// Shared between concurrent handshakes. Eviction is up to the
/// implementation.
pub trait SessionCache: Send + Sync + Debug {
    fn get(&self, session_id: &[u8]) -> Option<SessionState>;
    fn put(&self, session_id: &[u8], state: SessionState);
}

/// An unbounded in-memory cache. Last writer wins.
#[derive(Debug, Default)]
pub struct MemorySessionCache {
    sessions: Mutex<HashMap<Vec<u8>, SessionState>>,
}

impl MemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionCache for MemorySessionCache {
    fn get(&self, session_id: &[u8]) -> Option<SessionState> {
        let sessions = self.sessions.lock().ok()?;
        sessions.get(session_id).cloned()
    }

    fn put(&self, session_id: &[u8], state: SessionState) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(session_id.to_vec(), state);
        }
    }
}

/// Turns a session into an opaque ticket and back.
pub trait TicketSealer: Send + Sync + Debug {
    fn seal(&self, state: &SessionState) -> Result<Vec<u8>, Error>;

    /// `None` for anything that does not authenticate.
    fn open(&self, ticket: &[u8]) -> Option<SessionState>;
}

const U24_MAX: usize = 0xff_ffff;
const KEY_NAME_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// AES-256-GCM tickets: `key_name[16] | nonce[12] | ciphertext+tag`.
///
/// The key name is the AAD. Nonces come from the same random source as the
/// key material.
pub struct AesGcmTicketSealer {
    key_name: [u8; KEY_NAME_LEN],
    key: Zeroizing<[u8; 32]>,
    random: &'static dyn SecureRandom,
}

impl AesGcmTicketSealer {
    /// A sealer with a fresh key name and key drawn from `random`.
    pub fn new(random: &'static dyn SecureRandom) -> Result<Self, Error> {
        let mut key_name = [0u8; KEY_NAME_LEN];
        random.fill(&mut key_name).map_err(Error::ResourceFailure)?;
        let mut key = Zeroizing::new([0u8; 32]);
        random.fill(&mut key[..]).map_err(Error::ResourceFailure)?;
        Ok(AesGcmTicketSealer {
            key_name,
            key,
            random,
        })
    }

    /// A sealer with fixed key material.
    pub fn with_key(
        key_name: [u8; KEY_NAME_LEN],
        key: [u8; 32],
        random: &'static dyn SecureRandom,
    ) -> Self {
        AesGcmTicketSealer {
            key_name,
            key: Zeroizing::new(key),
            random,
        }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key[..]))
    }
}

impl Debug for AesGcmTicketSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmTicketSealer").finish()
    }
}

impl TicketSealer for AesGcmTicketSealer {
    fn seal(&self, state: &SessionState) -> Result<Vec<u8>, Error> {
        let mut nonce = [0u8; NONCE_LEN];
        self.random
            .fill(&mut nonce)
            .map_err(|e| Error::ResourceFailure(format!("ticket nonce: {}", e)))?;

        let plaintext = Zeroizing::new(state.encode()?);
        let sealed = self
            .cipher()
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: &self.key_name,
                },
            )
            .map_err(|_| Error::ResourceFailure("ticket encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(KEY_NAME_LEN + NONCE_LEN + sealed.len());
        out.extend_from_slice(&self.key_name);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn open(&self, ticket: &[u8]) -> Option<SessionState> {
        if ticket.len() < KEY_NAME_LEN + NONCE_LEN + TAG_LEN {
            return None;
        }
        let (key_name, rest) = ticket.split_at(KEY_NAME_LEN);
        if key_name != self.key_name {
            trace!("Ticket key name does not match");
            return None;
        }
        let (nonce, sealed) = rest.split_at(NONCE_LEN);

        let plaintext = self
            .cipher()
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: key_name,
                },
            )
            .ok()?;
        let plaintext = Zeroizing::new(plaintext);

        SessionState::decode(&plaintext).ok()
    }
}
