use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384};

use crate::types::{HashAlgorithm, ProtocolVersion};
use crate::Error;

/// The pseudo random function of the given protocol version.
///
/// SSL 3.0 has no labelled PRF and ignores `label`. TLS 1.0 and 1.1 use the
/// MD5/SHA-1 split construction. TLS 1.2 uses P_hash with the suite's hash.
///
/// `seed` is the seed WITHOUT the label.
pub fn prf(
    version: ProtocolVersion,
    hash: HashAlgorithm,
    secret: &[u8],
    label: &str,
    seed: &[u8],
    out: &mut [u8],
) -> Result<(), Error> {
    match version {
        ProtocolVersion::Ssl30 => {
            prf_ssl30(secret, seed, out);
            Ok(())
        }
        ProtocolVersion::Tls10 | ProtocolVersion::Tls11 => prf_tls10(secret, label, seed, out),
        ProtocolVersion::Tls12 | ProtocolVersion::Tls13 => prf_tls12(hash, secret, label, seed, out),
    }
}

/// PRF for TLS 1.2 as specified in RFC 5246 Section 5.
///
/// PRF(secret, label, seed) = P_<hash>(secret, label + seed)
pub fn prf_tls12(
    hash: HashAlgorithm,
    secret: &[u8],
    label: &str,
    seed: &[u8],
    out: &mut [u8],
) -> Result<(), Error> {
    let full_seed = full_seed(label, seed);
    match hash {
        HashAlgorithm::Sha256 => p_hash::<Hmac<Sha256>>(secret, &full_seed, out),
        HashAlgorithm::Sha384 => p_hash::<Hmac<Sha384>>(secret, &full_seed, out),
        _ => Err(Error::ResourceFailure(format!(
            "unsupported PRF hash for TLS 1.2: {:?}",
            hash
        ))),
    }
}

/// PRF for TLS 1.0 and 1.1 (RFC 2246 Section 5).
///
/// The secret is split in two halves, sharing the middle byte when odd.
pub fn prf_tls10(secret: &[u8], label: &str, seed: &[u8], out: &mut [u8]) -> Result<(), Error> {
    let full_seed = full_seed(label, seed);
    let half = (secret.len() + 1) / 2;
    let s1 = &secret[..half];
    let s2 = &secret[secret.len() - half..];

    p_hash::<Hmac<Md5>>(s1, &full_seed, out)?;

    let mut other = vec![0u8; out.len()];
    p_hash::<Hmac<Sha1>>(s2, &full_seed, &mut other)?;

    for (o, x) in out.iter_mut().zip(other.iter()) {
        *o ^= x;
    }
    Ok(())
}

/// The SSL 3.0 derivation used for both master secret and key block.
///
/// block_i = MD5(secret + SHA1(letters_i + secret + seed)) where letters_i
/// is "A", "BB", "CCC" and so on.
pub fn prf_ssl30(secret: &[u8], seed: &[u8], out: &mut [u8]) {
    let mut pos = 0;
    let mut i = 0usize;
    while pos < out.len() {
        let letter = b'A' + i as u8;
        let label = vec![letter; i + 1];

        let mut sha = Sha1::new();
        sha.update(&label);
        sha.update(secret);
        sha.update(seed);
        let inner = sha.finalize();

        let mut md5 = Md5::new();
        md5.update(secret);
        md5.update(inner);
        let block = md5.finalize();

        let n = (out.len() - pos).min(block.len());
        out[pos..pos + n].copy_from_slice(&block[..n]);
        pos += n;
        i += 1;
    }
}

fn full_seed(label: &str, seed: &[u8]) -> Vec<u8> {
    let mut full = Vec::with_capacity(label.len() + seed.len());
    full.extend_from_slice(label.as_bytes());
    full.extend_from_slice(seed);
    full
}

fn p_hash<M: Mac + KeyInit + Clone>(
    secret: &[u8],
    full_seed: &[u8],
    out: &mut [u8],
) -> Result<(), Error> {
    let key = <M as KeyInit>::new_from_slice(secret)
        .map_err(|_| Error::ResourceFailure("invalid PRF secret length".to_string()))?;

    // A(1) = HMAC_hash(secret, A(0)) where A(0) = seed
    let mut mac = key.clone();
    mac.update(full_seed);
    let mut a = mac.finalize().into_bytes();

    let mut pos = 0;
    while pos < out.len() {
        // HMAC_hash(secret, A(i) + seed)
        let mut mac = key.clone();
        mac.update(&a);
        mac.update(full_seed);
        let block = mac.finalize().into_bytes();

        let n = (out.len() - pos).min(block.len());
        out[pos..pos + n].copy_from_slice(&block[..n]);
        pos += n;

        // A(i+1) = HMAC_hash(secret, A(i))
        let mut mac = key.clone();
        mac.update(&a);
        a = mac.finalize().into_bytes();
    }

    Ok(())
}
