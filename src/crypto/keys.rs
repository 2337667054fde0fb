//! Server private keys and peer public keys using RustCrypto.

use std::str;

use der::{Decode, Encode};
use pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use spki::ObjectIdentifier;
use x509_cert::Certificate as X509Certificate;

use super::hash::digest;
use crate::types::{HashAlgorithm, KeyType};
use crate::Error;

const OID_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const OID_P256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const OID_P384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

/// The private key of a configured server certificate.
#[derive(Clone)]
pub enum ServerPrivateKey {
    Rsa(Box<RsaPrivateKey>),
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
}

impl std::fmt::Debug for ServerPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerPrivateKey::Rsa(_) => f.debug_tuple("ServerPrivateKey::Rsa").finish(),
            ServerPrivateKey::P256(_) => f.debug_tuple("ServerPrivateKey::P256").finish(),
            ServerPrivateKey::P384(_) => f.debug_tuple("ServerPrivateKey::P384").finish(),
        }
    }
}

impl ServerPrivateKey {
    /// Load a key from PKCS#8, PKCS#1 (RSA) or SEC1 (EC) DER, or any of these in PEM.
    pub fn from_der(key_der: &[u8]) -> Result<Self, Error> {
        // Try PKCS#8 DER format first (most common)
        if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_der(key_der) {
            return Ok(ServerPrivateKey::P256(key));
        }
        if let Ok(key) = p384::ecdsa::SigningKey::from_pkcs8_der(key_der) {
            return Ok(ServerPrivateKey::P384(key));
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs8_der(key_der) {
            return Ok(ServerPrivateKey::Rsa(Box::new(key)));
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs1_der(key_der) {
            return Ok(ServerPrivateKey::Rsa(Box::new(key)));
        }

        // SEC1 DER format (OpenSSL EC private key format)
        if let Ok(ec_key) = sec1::EcPrivateKey::try_from(key_der) {
            let curve_oid = match &ec_key.parameters {
                Some(sec1::EcParameters::NamedCurve(oid)) => Some(*oid),
                None if ec_key.private_key.len() == 32 => Some(OID_P256),
                None if ec_key.private_key.len() == 48 => Some(OID_P384),
                None => None,
            };

            match curve_oid {
                Some(OID_P256) => {
                    if let Ok(key) = p256::ecdsa::SigningKey::from_slice(ec_key.private_key) {
                        return Ok(ServerPrivateKey::P256(key));
                    }
                }
                Some(OID_P384) => {
                    if let Ok(key) = p384::ecdsa::SigningKey::from_slice(ec_key.private_key) {
                        return Ok(ServerPrivateKey::P384(key));
                    }
                }
                _ => {}
            }
        }

        // Check if it's a PEM encoded key
        if let Ok(pem_str) = str::from_utf8(key_der) {
            if pem_str.contains("-----BEGIN") {
                if let Ok((_label, doc)) = pkcs8::Document::from_pem(pem_str) {
                    return Self::from_der(doc.as_bytes());
                }
            }
        }

        Err(Error::Config(
            "failed to parse private key in any supported format".to_string(),
        ))
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            ServerPrivateKey::Rsa(_) => KeyType::Rsa,
            ServerPrivateKey::P256(_) | ServerPrivateKey::P384(_) => KeyType::Ecdsa,
        }
    }

    /// Sign `data` after hashing it with `hash`.
    ///
    /// `HashAlgorithm::Md5Sha1` is the pre TLS 1.2 RSA scheme without a
    /// DigestInfo prefix.
    pub fn sign(&self, hash: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>, Error> {
        let hashed = digest(hash, data);
        match self {
            ServerPrivateKey::Rsa(key) => key
                .sign(rsa_scheme(hash), &hashed)
                .map_err(|e| Error::ResourceFailure(format!("RSA signing failed: {}", e))),
            ServerPrivateKey::P256(key) => {
                let sig: p256::ecdsa::Signature = key
                    .sign_prehash(&hashed)
                    .map_err(|_| Error::ResourceFailure("ECDSA signing failed".to_string()))?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
            ServerPrivateKey::P384(key) => {
                let sig: p384::ecdsa::Signature = key
                    .sign_prehash(&hashed)
                    .map_err(|_| Error::ResourceFailure("ECDSA signing failed".to_string()))?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
        }
    }

    /// PKCS#1 v1.5 decryption for RSA key exchange.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        match self {
            ServerPrivateKey::Rsa(key) => key
                .decrypt(Pkcs1v15Encrypt, ciphertext)
                .map_err(|_| Error::NegotiationFailure("RSA decryption failed".to_string())),
            _ => Err(Error::NegotiationFailure(
                "RSA key exchange with a non-RSA key".to_string(),
            )),
        }
    }
}

fn rsa_scheme(hash: HashAlgorithm) -> Pkcs1v15Sign {
    match hash {
        HashAlgorithm::Md5Sha1 => Pkcs1v15Sign::new_unprefixed(),
        HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    }
}

/// The public key of a peer certificate.
///
/// Only RSA and ECDSA over P-256 or P-384 are supported.
#[derive(Clone)]
pub enum PeerPublicKey {
    Rsa(RsaPublicKey),
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
}

impl std::fmt::Debug for PeerPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerPublicKey::Rsa(_) => f.debug_tuple("PeerPublicKey::Rsa").finish(),
            PeerPublicKey::P256(_) => f.debug_tuple("PeerPublicKey::P256").finish(),
            PeerPublicKey::P384(_) => f.debug_tuple("PeerPublicKey::P384").finish(),
        }
    }
}

impl PeerPublicKey {
    /// Extract the subject public key of a parsed certificate.
    pub fn from_certificate(cert: &X509Certificate) -> Result<Self, Error> {
        let spki = &cert.tbs_certificate.subject_public_key_info;

        if spki.algorithm.oid == OID_RSA_ENCRYPTION {
            let spki_der = spki
                .to_der()
                .map_err(|e| Error::bad_certificate(format!("bad public key info: {}", e)))?;
            let key = RsaPublicKey::from_public_key_der(&spki_der)
                .map_err(|e| Error::bad_certificate(format!("bad RSA public key: {}", e)))?;
            return Ok(PeerPublicKey::Rsa(key));
        }

        if spki.algorithm.oid != OID_EC_PUBLIC_KEY {
            return Err(Error::unsupported_certificate(format!(
                "unsupported public key algorithm: {}",
                spki.algorithm.oid
            )));
        }

        let pubkey_bytes = spki
            .subject_public_key
            .as_bytes()
            .ok_or_else(|| Error::bad_certificate("invalid EC subject_public_key bitstring"))?;

        let curve_oid: ObjectIdentifier = spki
            .algorithm
            .parameters
            .as_ref()
            .ok_or_else(|| Error::bad_certificate("missing EC curve parameter"))?
            .decode_as()
            .map_err(|_| Error::bad_certificate("invalid EC curve parameter"))?;

        match curve_oid {
            OID_P256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(pubkey_bytes)
                .map(PeerPublicKey::P256)
                .map_err(|_| Error::bad_certificate("invalid P-256 public key")),
            OID_P384 => p384::ecdsa::VerifyingKey::from_sec1_bytes(pubkey_bytes)
                .map(PeerPublicKey::P384)
                .map_err(|_| Error::bad_certificate("invalid P-384 public key")),
            _ => Err(Error::unsupported_certificate(format!(
                "unsupported EC curve: {}",
                curve_oid
            ))),
        }
    }

    /// Parse a DER certificate and extract its key.
    pub fn from_certificate_der(cert_der: &[u8]) -> Result<Self, Error> {
        let cert = X509Certificate::from_der(cert_der)
            .map_err(|e| Error::bad_certificate(format!("failed to parse certificate: {}", e)))?;
        Self::from_certificate(&cert)
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            PeerPublicKey::Rsa(_) => KeyType::Rsa,
            PeerPublicKey::P256(_) | PeerPublicKey::P384(_) => KeyType::Ecdsa,
        }
    }

    /// Verify a signature over `data` hashed with `hash`.
    pub fn verify(&self, hash: HashAlgorithm, data: &[u8], sig: &[u8]) -> Result<(), String> {
        let hashed = digest(hash, data);
        self.verify_prehashed(hash, &hashed, sig)
    }

    /// Verify a signature over an already computed digest.
    pub fn verify_prehashed(
        &self,
        hash: HashAlgorithm,
        hashed: &[u8],
        sig: &[u8],
    ) -> Result<(), String> {
        match self {
            PeerPublicKey::Rsa(key) => key
                .verify(rsa_scheme(hash), hashed, sig)
                .map_err(|_| format!("RSA signature verification failed for {:?}", hash)),
            PeerPublicKey::P256(key) => {
                let sig = p256::ecdsa::Signature::from_der(sig)
                    .map_err(|_| "invalid signature format".to_string())?;
                key.verify_prehash(hashed, &sig)
                    .map_err(|_| format!("ECDSA signature verification failed for {:?}", hash))
            }
            PeerPublicKey::P384(key) => {
                let sig = p384::ecdsa::Signature::from_der(sig)
                    .map_err(|_| "invalid signature format".to_string())?;
                key.verify_prehash(hashed, &sig)
                    .map_err(|_| format!("ECDSA signature verification failed for {:?}", hash))
            }
        }
    }
}

/// Verify a Channel ID signature: a raw P-256 point and raw (r, s) over `hashed`.
pub fn verify_channel_id(
    x: &[u8; 32],
    y: &[u8; 32],
    r: &[u8; 32],
    s: &[u8; 32],
    hashed: &[u8],
) -> Result<(), String> {
    let point = p256::EncodedPoint::from_affine_coordinates(
        p256::FieldBytes::from_slice(x),
        p256::FieldBytes::from_slice(y),
        false,
    );
    let key = p256::ecdsa::VerifyingKey::from_encoded_point(&point)
        .map_err(|_| "channel ID key is not on P-256".to_string())?;
    let sig = p256::ecdsa::Signature::from_scalars(
        *p256::FieldBytes::from_slice(r),
        *p256::FieldBytes::from_slice(s),
    )
    .map_err(|_| "invalid channel ID signature scalars".to_string())?;
    key.verify_prehash(hashed, &sig)
        .map_err(|_| "channel ID signature verification failed".to_string())
}
