//! Key exchange per cipher suite family.
//!
//! Each [`KeyAgreement`] produces the optional ServerKeyExchange body and
//! turns the ClientKeyExchange body into a pre-master secret.

use zeroize::Zeroizing;

use crate::cipher_suite::KeyExchangeKind;
use crate::config::{Config, ServerCertificate};
use crate::crypto::{DhKeyPair, EcdhKeyExchange};
use crate::message::{put_u16, put_u16_vec, ClientHello};
use crate::policy::TestPolicy;
use crate::types::{HashAlgorithm, KeyType, NamedCurve, ProtocolVersion, SignatureScheme};
use crate::Error;

/// ECParameters curve_type for a named curve.
const CURVE_TYPE_NAMED: u8 = 3;

const RSA_PRE_MASTER_SECRET_LEN: usize = 48;

/// What a key agreement may consult.
#[derive(Debug, Clone, Copy)]
pub struct KeyAgreementContext<'a> {
    pub config: &'a Config,
    pub policy: &'a TestPolicy,
    pub certificate: &'a ServerCertificate,
    /// The offer as negotiated, after any policy overrides.
    pub client_hello: &'a ClientHello,
    pub server_random: &'a [u8; 32],
    pub version: ProtocolVersion,
}

/// The key exchange algorithm of a cipher suite.
pub trait KeyAgreement: std::fmt::Debug {
    /// Body of our ServerKeyExchange, or `None` when the suite sends none.
    fn generate_server_key_exchange(
        &mut self,
        ctx: &KeyAgreementContext<'_>,
    ) -> Result<Option<Vec<u8>>, Error>;

    /// Consume the ClientKeyExchange body and return the pre-master secret.
    fn process_client_key_exchange(
        &mut self,
        ctx: &KeyAgreementContext<'_>,
        body: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, Error>;
}

/// A fresh key agreement for a suite's key exchange.
pub fn for_suite(kind: KeyExchangeKind) -> Box<dyn KeyAgreement> {
    match kind {
        KeyExchangeKind::Rsa => Box::new(RsaKeyAgreement),
        KeyExchangeKind::DheRsa => Box::new(DheKeyAgreement::default()),
        KeyExchangeKind::EcdheRsa | KeyExchangeKind::EcdheEcdsa => {
            Box::new(EcdheKeyAgreement::new(true))
        }
        KeyExchangeKind::Psk => Box::new(PskKeyAgreement { base: None }),
        KeyExchangeKind::EcdhePsk => Box::new(PskKeyAgreement {
            base: Some(Box::new(EcdheKeyAgreement::new(false))),
        }),
    }
}

fn bad_key_exchange() -> Error {
    Error::NegotiationFailure("malformed ClientKeyExchange".to_string())
}

/// The signature algorithm for our ServerKeyExchange.
///
/// `None` before TLS 1.2, where the algorithm is implied by the key type.
pub(crate) fn select_signature_algorithm(
    version: ProtocolVersion,
    key_type: KeyType,
    ours: &[SignatureScheme],
    peer: &[SignatureScheme],
) -> Result<Option<SignatureScheme>, Error> {
    if version < ProtocolVersion::Tls12 {
        return Ok(None);
    }

    // Without the extension, a TLS 1.2 client accepts SHA-1.
    let default_peer = [SignatureScheme::RsaPkcs1Sha1, SignatureScheme::EcdsaSha1];
    let peer = if peer.is_empty() { &default_peer[..] } else { peer };

    ours.iter()
        .find(|s| peer.contains(s) && s.key_type() == Some(key_type))
        .copied()
        .map(Some)
        .ok_or_else(|| Error::NegotiationFailure("no common signature algorithms".to_string()))
}

/// Sign `params` bound to both randoms and append the signature.
fn sign_parameters(ctx: &KeyAgreementContext<'_>, params: Vec<u8>) -> Result<Vec<u8>, Error> {
    let key = ctx.certificate.private_key();
    let peer = if ctx.policy.ignore_peer_signature_algorithm_preferences {
        ctx.config.signature_algorithms()
    } else {
        &ctx.client_hello.signature_algorithms[..]
    };
    let sig_alg = select_signature_algorithm(
        ctx.version,
        key.key_type(),
        ctx.config.signature_algorithms(),
        peer,
    )?;

    let hash = match (sig_alg, key.key_type()) {
        (Some(alg), _) => alg.hash().ok_or_else(|| {
            Error::NegotiationFailure(format!("unknown signature algorithm {:?}", alg))
        })?,
        (None, KeyType::Rsa) => HashAlgorithm::Md5Sha1,
        (None, KeyType::Ecdsa) => HashAlgorithm::Sha1,
    };

    let mut signed = Vec::with_capacity(64 + params.len());
    signed.extend_from_slice(&ctx.client_hello.random);
    signed.extend_from_slice(ctx.server_random);
    signed.extend_from_slice(&params);

    let mut sig = key.sign(hash, &signed)?;
    if ctx.policy.invalid_server_key_exchange_signature {
        if let Some(first) = sig.first_mut() {
            *first ^= 0x80;
        }
    }
    trace!("ServerKeyExchange signed with {:?} / {:?}", sig_alg, hash);

    let mut out = params;
    if let Some(alg) = sig_alg {
        put_u16(&mut out, alg.as_u16());
    }
    put_u16_vec(&mut out, &sig);
    Ok(out)
}

/// RSA key transport. No ServerKeyExchange.
#[derive(Debug)]
pub struct RsaKeyAgreement;

impl KeyAgreement for RsaKeyAgreement {
    fn generate_server_key_exchange(
        &mut self,
        _ctx: &KeyAgreementContext<'_>,
    ) -> Result<Option<Vec<u8>>, Error> {
        Ok(None)
    }

    fn process_client_key_exchange(
        &mut self,
        ctx: &KeyAgreementContext<'_>,
        body: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        // A random secret stands in when decryption fails, so a bad padding
        // is indistinguishable from a wrong Finished.
        let mut pre_master_secret = Zeroizing::new(
            ctx.config
                .crypto_provider()
                .random_bytes(RSA_PRE_MASTER_SECRET_LEN)?,
        );

        if body.len() < 2 {
            return Err(bad_key_exchange());
        }
        let ciphertext = if ctx.version == ProtocolVersion::Ssl30 {
            body
        } else {
            let len = u16::from_be_bytes([body[0], body[1]]) as usize;
            if len != body.len() - 2 {
                return Err(bad_key_exchange());
            }
            &body[2..]
        };

        match ctx.certificate.private_key().decrypt(ciphertext).map(Zeroizing::new) {
            Ok(decrypted) if decrypted.len() == RSA_PRE_MASTER_SECRET_LEN => {
                pre_master_secret.copy_from_slice(&decrypted);
            }
            _ => trace!("RSA decryption failed, using random pre-master secret"),
        }

        Ok(pre_master_secret)
    }
}

/// Ephemeral ECDH, signed by the certificate key unless unauthenticated.
pub struct EcdheKeyAgreement {
    signed: bool,
    exchange: Option<EcdhKeyExchange>,
}

impl EcdheKeyAgreement {
    pub fn new(signed: bool) -> Self {
        EcdheKeyAgreement {
            signed,
            exchange: None,
        }
    }
}

impl std::fmt::Debug for EcdheKeyAgreement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdheKeyAgreement")
            .field("signed", &self.signed)
            .field("curve", &self.exchange.as_ref().map(|e| e.curve()))
            .finish()
    }
}

/// Our most preferred curve that the client offered.
fn select_curve(ours: &[NamedCurve], theirs: &[NamedCurve]) -> Option<NamedCurve> {
    ours.iter()
        .find(|c| c.is_supported() && theirs.contains(c))
        .copied()
}

impl KeyAgreement for EcdheKeyAgreement {
    fn generate_server_key_exchange(
        &mut self,
        ctx: &KeyAgreementContext<'_>,
    ) -> Result<Option<Vec<u8>>, Error> {
        let curve = select_curve(
            ctx.config.curve_preferences(),
            &ctx.client_hello.supported_curves,
        )
        .ok_or_else(|| {
            Error::NegotiationFailure("no supported elliptic curves offered".to_string())
        })?;

        let exchange = EcdhKeyExchange::new(curve, ctx.config.crypto_provider().secure_random)?;
        debug!("ECDHE over {:?}", curve);

        let mut params = vec![CURVE_TYPE_NAMED];
        put_u16(&mut params, curve.as_u16());
        params.push(exchange.public_key().len() as u8);
        params.extend_from_slice(exchange.public_key());
        self.exchange = Some(exchange);

        if !self.signed || ctx.policy.unauthenticated_ecdh {
            return Ok(Some(params));
        }
        sign_parameters(ctx, params).map(Some)
    }

    fn process_client_key_exchange(
        &mut self,
        _ctx: &KeyAgreementContext<'_>,
        body: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        if body.is_empty() || body[0] as usize != body.len() - 1 {
            return Err(bad_key_exchange());
        }
        let exchange = self.exchange.take().ok_or_else(|| {
            Error::ProtocolViolation("ClientKeyExchange before ServerKeyExchange".to_string())
        })?;
        exchange
            .complete(&body[1..])
            .map_err(Error::NegotiationFailure)
    }
}

/// Ephemeral finite field DH over ffdhe2048, always signed.
#[derive(Default)]
pub struct DheKeyAgreement {
    key_pair: Option<DhKeyPair>,
}

impl std::fmt::Debug for DheKeyAgreement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DheKeyAgreement")
            .field("generated", &self.key_pair.is_some())
            .finish()
    }
}

impl KeyAgreement for DheKeyAgreement {
    fn generate_server_key_exchange(
        &mut self,
        ctx: &KeyAgreementContext<'_>,
    ) -> Result<Option<Vec<u8>>, Error> {
        let key_pair = DhKeyPair::generate(ctx.config.crypto_provider().secure_random)?;

        let mut params = Vec::new();
        put_u16_vec(&mut params, &DhKeyPair::prime_bytes());
        put_u16_vec(&mut params, &DhKeyPair::generator_bytes());
        put_u16_vec(&mut params, &key_pair.public_bytes());
        self.key_pair = Some(key_pair);

        sign_parameters(ctx, params).map(Some)
    }

    fn process_client_key_exchange(
        &mut self,
        _ctx: &KeyAgreementContext<'_>,
        body: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        if body.len() < 2 {
            return Err(bad_key_exchange());
        }
        let len = u16::from_be_bytes([body[0], body[1]]) as usize;
        if len != body.len() - 2 {
            return Err(bad_key_exchange());
        }
        let key_pair = self.key_pair.take().ok_or_else(|| {
            Error::ProtocolViolation("ClientKeyExchange before ServerKeyExchange".to_string())
        })?;
        key_pair.agree(&body[2..])
    }
}

/// Pre-shared key, optionally combined with another key exchange.
#[derive(Debug)]
pub struct PskKeyAgreement {
    base: Option<Box<dyn KeyAgreement>>,
}

impl KeyAgreement for PskKeyAgreement {
    fn generate_server_key_exchange(
        &mut self,
        ctx: &KeyAgreementContext<'_>,
    ) -> Result<Option<Vec<u8>>, Error> {
        let base = match &mut self.base {
            Some(base) => base.generate_server_key_exchange(ctx)?,
            None => None,
        };
        let hint = ctx.config.pre_shared_key_identity().as_bytes();
        if base.is_none() && hint.is_empty() {
            return Ok(None);
        }

        let mut out = Vec::new();
        put_u16_vec(&mut out, hint);
        out.extend_from_slice(base.as_deref().unwrap_or_default());
        Ok(Some(out))
    }

    fn process_client_key_exchange(
        &mut self,
        ctx: &KeyAgreementContext<'_>,
        body: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        if body.len() < 2 {
            return Err(bad_key_exchange());
        }
        let identity_len = u16::from_be_bytes([body[0], body[1]]) as usize;
        if body.len() < 2 + identity_len {
            return Err(bad_key_exchange());
        }
        let (identity, rest) = body[2..].split_at(identity_len);

        if identity != ctx.config.pre_shared_key_identity().as_bytes() {
            return Err(Error::NegotiationFailure("unexpected PSK identity".to_string()));
        }
        let psk = ctx
            .config
            .pre_shared_key()
            .ok_or_else(|| Error::NegotiationFailure("pre-shared key not configured".to_string()))?;

        let other_secret = match &mut self.base {
            Some(base) => base.process_client_key_exchange(ctx, rest)?,
            None => {
                if !rest.is_empty() {
                    return Err(bad_key_exchange());
                }
                Zeroizing::new(vec![0u8; psk.len()])
            }
        };

        let mut pre_master_secret = Zeroizing::new(Vec::with_capacity(4 + other_secret.len() + psk.len()));
        put_u16_vec(&mut pre_master_secret, &other_secret);
        put_u16_vec(&mut pre_master_secret, psk);
        Ok(pre_master_secret)
    }
}
