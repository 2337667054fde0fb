//! Ephemeral ECDH over the named curves we offer.
//!
//! Private scalars are drawn from the configured [`SecureRandom`], so a
//! failing random source aborts the handshake instead of falling back to
//! another generator.

use p256::{PublicKey as P256PublicKey, SecretKey as P256SecretKey};
use p384::{PublicKey as P384PublicKey, SecretKey as P384SecretKey};
use x25519_dalek::{x25519, X25519_BASEPOINT_BYTES};
use zeroize::Zeroizing;

use super::SecureRandom;
use crate::types::NamedCurve;
use crate::Error;

/// Redraws allowed when the random bytes fall outside the curve order.
const SCALAR_ATTEMPTS: usize = 4;

/// One side of an ECDHE exchange.
pub enum EcdhKeyExchange {
    X25519 {
        secret: Zeroizing<[u8; 32]>,
        public_key: Vec<u8>,
    },
    P256 {
        secret: P256SecretKey,
        public_key: Vec<u8>,
    },
    P384 {
        secret: P384SecretKey,
        public_key: Vec<u8>,
    },
}

impl std::fmt::Debug for EcdhKeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdhKeyExchange")
            .field("curve", &self.curve())
            .field("public_key_len", &self.public_key().len())
            .finish_non_exhaustive()
    }
}

fn draw<const N: usize>(rng: &dyn SecureRandom) -> Result<Zeroizing<[u8; N]>, Error> {
    let mut buf = Zeroizing::new([0u8; N]);
    rng.fill(&mut buf[..]).map_err(Error::ResourceFailure)?;
    Ok(buf)
}

/// A scalar in `[1, n)`, redrawing the rare out-of-range values.
fn draw_scalar<const N: usize, K, F>(rng: &dyn SecureRandom, from_slice: F) -> Result<K, Error>
where
    F: Fn(&[u8]) -> Option<K>,
{
    for _ in 0..SCALAR_ATTEMPTS {
        let bytes = draw::<N>(rng)?;
        if let Some(key) = from_slice(&bytes[..]) {
            return Ok(key);
        }
    }
    Err(Error::ResourceFailure(
        "random source keeps producing invalid scalars".to_string(),
    ))
}

impl EcdhKeyExchange {
    pub fn new(curve: NamedCurve, rng: &dyn SecureRandom) -> Result<Self, Error> {
        match curve {
            NamedCurve::X25519 => {
                let secret = draw::<32>(rng)?;
                let public_key = x25519(*secret, X25519_BASEPOINT_BYTES).to_vec();
                Ok(EcdhKeyExchange::X25519 { secret, public_key })
            }
            NamedCurve::Secp256r1 => {
                let secret = draw_scalar::<32, _, _>(rng, |b| P256SecretKey::from_slice(b).ok())?;
                let public_key = secret.public_key().to_sec1_bytes().to_vec();
                Ok(EcdhKeyExchange::P256 { secret, public_key })
            }
            NamedCurve::Secp384r1 => {
                let secret = draw_scalar::<48, _, _>(rng, |b| P384SecretKey::from_slice(b).ok())?;
                let public_key = secret.public_key().to_sec1_bytes().to_vec();
                Ok(EcdhKeyExchange::P384 { secret, public_key })
            }
            NamedCurve::Unknown(v) => Err(Error::NegotiationFailure(format!(
                "unsupported curve {}",
                v
            ))),
        }
    }

    pub fn curve(&self) -> NamedCurve {
        match self {
            EcdhKeyExchange::X25519 { .. } => NamedCurve::X25519,
            EcdhKeyExchange::P256 { .. } => NamedCurve::Secp256r1,
            EcdhKeyExchange::P384 { .. } => NamedCurve::Secp384r1,
        }
    }

    /// Our public value as sent on the wire.
    pub fn public_key(&self) -> &[u8] {
        match self {
            EcdhKeyExchange::X25519 { public_key, .. } => public_key,
            EcdhKeyExchange::P256 { public_key, .. } => public_key,
            EcdhKeyExchange::P384 { public_key, .. } => public_key,
        }
    }

    /// Consume the secret and compute the shared secret with the peer's value.
    pub fn complete(self, peer_pub: &[u8]) -> Result<Zeroizing<Vec<u8>>, String> {
        match self {
            EcdhKeyExchange::X25519 { secret, .. } => {
                let peer: [u8; 32] = peer_pub
                    .try_into()
                    .map_err(|_| "Invalid X25519 public key".to_string())?;
                let shared = Zeroizing::new(x25519(*secret, peer));
                if shared.iter().all(|b| *b == 0) {
                    return Err("X25519 shared secret is zero".to_string());
                }
                Ok(Zeroizing::new(shared.to_vec()))
            }
            EcdhKeyExchange::P256 { secret, .. } => {
                let peer_key = P256PublicKey::from_sec1_bytes(peer_pub)
                    .map_err(|_| "Invalid P-256 public key".to_string())?;
                let shared =
                    p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer_key.as_affine());
                Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
            }
            EcdhKeyExchange::P384 { secret, .. } => {
                let peer_key = P384PublicKey::from_sec1_bytes(peer_pub)
                    .map_err(|_| "Invalid P-384 public key".to_string())?;
                let shared =
                    p384::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer_key.as_affine());
                Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
            }
        }
    }
}
