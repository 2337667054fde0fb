//! Cryptographic primitives and helpers used by the handshake.
//!
//! The [`CryptoProvider`] holds static references to trait objects, one per
//! collaborator the handshake consumes: the random source and the key
//! deriver. Everything else (digests, PRF, signatures) is plain RustCrypto
//! glue in the submodules.

use std::fmt::Debug;

use rand::rngs::OsRng;
use rand::RngCore;

mod ffdhe;
mod hash;
mod key_schedule;
mod keys;
mod kx_group;
mod prf;

pub use ffdhe::DhKeyPair;
pub use hash::{digest, RunningHash};
pub use key_schedule::{KeyDeriver, TrafficKeys, MASTER_SECRET_LEN};
pub use keys::{verify_channel_id, PeerPublicKey, ServerPrivateKey};
pub use kx_group::EcdhKeyExchange;
pub use prf::{prf, prf_ssl30, prf_tls10, prf_tls12};

use crate::types::{HashAlgorithm, ProtocolVersion};
use crate::Error;

/// Secure random number generator.
pub trait SecureRandom: Send + Sync + Debug {
    /// Fill buffer with cryptographically secure random bytes.
    fn fill(&self, buf: &mut [u8]) -> Result<(), String>;
}

/// Random numbers from the operating system.
#[derive(Debug)]
pub struct OsRandom;

impl SecureRandom for OsRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), String> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| format!("OS random source failed: {}", e))
    }
}

static OS_RANDOM: OsRandom = OsRandom;

/// Cryptographic collaborators of a handshake.
#[derive(Debug, Clone, Copy)]
pub struct CryptoProvider {
    /// Secure random number generator.
    pub secure_random: &'static dyn SecureRandom,

    /// Master secret and key block derivation.
    pub key_deriver: &'static dyn KeyDeriver,
}

impl Default for CryptoProvider {
    fn default() -> Self {
        default_provider()
    }
}

/// The provider backed by the OS random source and the protocol PRFs.
pub fn default_provider() -> CryptoProvider {
    CryptoProvider {
        secure_random: &OS_RANDOM,
        key_deriver: &key_schedule::PRF_KEY_DERIVER,
    }
}

impl CryptoProvider {
    /// Validates the provider before it is used in a configuration.
    ///
    /// The random source must produce output and the key deriver must be
    /// deterministic.
    pub fn validate(&self) -> Result<(), Error> {
        let mut buf = [0u8; 32];
        self.secure_random
            .fill(&mut buf)
            .map_err(|e| Error::Config(format!("random source unusable: {}", e)))?;

        let a = self.key_deriver.master_secret(
            ProtocolVersion::Tls12,
            HashAlgorithm::Sha256,
            &[1; 48],
            &[2; 32],
            &[3; 32],
        )?;
        let b = self.key_deriver.master_secret(
            ProtocolVersion::Tls12,
            HashAlgorithm::Sha256,
            &[1; 48],
            &[2; 32],
            &[3; 32],
        )?;
        if *a != *b || a.len() != MASTER_SECRET_LEN {
            return Err(Error::Config(
                "key deriver is not deterministic".to_string(),
            ));
        }
        Ok(())
    }

    /// `n` random bytes. Entropy failure is fatal to the handshake.
    pub(crate) fn random_bytes(&self, n: usize) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; n];
        self.secure_random
            .fill(&mut buf)
            .map_err(Error::ResourceFailure)?;
        Ok(buf)
    }
}
