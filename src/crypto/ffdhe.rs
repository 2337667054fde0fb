//! Finite field Diffie-Hellman over the RFC 7919 ffdhe2048 group.

use num_bigint::BigUint;
use once_cell::sync::Lazy;
use zeroize::Zeroizing;

use super::SecureRandom;
use crate::Error;

/// Random bytes drawn for the exponent. The extra 8 bytes keep the bias of
/// the reduction below negligible.
const EXPONENT_DRAW_LEN: usize = 256 + 8;

#[rustfmt::skip]
const FFDHE2048_P: &str = concat!(
    "FFFFFFFFFFFFFFFFADF85458A2BB4A9AAFDC5620273D3CF1",
    "D8B9C583CE2D3695A9E13641146433FBCC939DCE249B3EF9",
    "7D2FE363630C75D8F681B202AEC4617AD3DF1ED5D5FD6561",
    "2433F51F5F066ED0856365553DED1AF3B557135E7F57C935",
    "984F0C70E0E68B77E2A689DAF3EFE8721DF158A136ADE735",
    "30ACCA4F483A797ABC0AB182B324FB61D108A94BB2C8E3FB",
    "B96ADAB760D7F4681D4F42A3DE394DF4AE56EDE76372BB19",
    "0B07A7C8EE0A6D709E02FCE1CDF7E2ECC03404CD28342F61",
    "9172FE9CE98583FF8E4F1232EEF28183C3FE3B1B4C6FAD73",
    "3BB5FCBC2EC22005C58EF1837D1683B2C6F34A26C1B2EFFA",
    "886B423861285C97FFFFFFFFFFFFFFFF",
);

static PRIME: Lazy<BigUint> = Lazy::new(|| {
    // The constant is valid hex.
    BigUint::parse_bytes(FFDHE2048_P.as_bytes(), 16).unwrap_or_default()
});

/// An ephemeral DH key pair in the ffdhe2048 group.
pub struct DhKeyPair {
    private: BigUint,
    public: BigUint,
}

impl DhKeyPair {
    /// A fresh key pair with the exponent in `[2, p - 2]`.
    pub fn generate(rng: &dyn SecureRandom) -> Result<Self, Error> {
        let p = &*PRIME;
        let two = BigUint::from(2u32);

        let mut bytes = Zeroizing::new(vec![0u8; EXPONENT_DRAW_LEN]);
        rng.fill(&mut bytes[..]).map_err(Error::ResourceFailure)?;
        let private = BigUint::from_bytes_be(&bytes) % (p - 3u32) + &two;

        let public = two.modpow(&private, p);
        Ok(DhKeyPair { private, public })
    }

    pub fn prime_bytes() -> Vec<u8> {
        PRIME.to_bytes_be()
    }

    pub fn generator_bytes() -> Vec<u8> {
        vec![2]
    }

    pub fn public_bytes(&self) -> Vec<u8> {
        self.public.to_bytes_be()
    }

    /// Z = Yc^x mod p, with leading zero bytes stripped.
    pub fn agree(&self, peer_public: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
        let p = &*PRIME;
        let y = BigUint::from_bytes_be(peer_public);
        let one = BigUint::from(1u32);
        if y <= one || y >= p - 1u32 {
            return Err(Error::NegotiationFailure(
                "invalid DH public value".to_string(),
            ));
        }
        Ok(Zeroizing::new(y.modpow(&self.private, p).to_bytes_be()))
    }
}
