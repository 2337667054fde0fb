//! Cipher suite registry and selection.

use crate::types::{HashAlgorithm, ProtocolVersion};

/// Signals that the client supports secure renegotiation (RFC 5746).
pub const SCSV_RENEGOTIATION: u16 = 0x00ff;

/// Signals a fallback connection (RFC 7507).
pub const SCSV_FALLBACK: u16 = 0x5600;

/// Key exchange family of a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeKind {
    Rsa,
    DheRsa,
    EcdheRsa,
    EcdheEcdsa,
    Psk,
    EcdhePsk,
}

/// Uses ECDHE, so needs a mutually supported curve.
pub const SUITE_ECDHE: u8 = 1;
/// Needs an ECDSA certificate. Without it, an RSA one.
pub const SUITE_ECDSA: u8 = 2;
/// Only defined for TLS 1.2.
pub const SUITE_TLS12: u8 = 4;
/// PRF hash is SHA-384 in TLS 1.2.
pub const SUITE_SHA384: u8 = 8;
/// Stream cipher, never valid over datagrams.
pub const SUITE_NO_DTLS: u8 = 16;
/// Authenticated by a pre-shared key, no certificate.
pub const SUITE_PSK: u8 = 32;

/// A registered cipher suite.
#[derive(Debug, PartialEq, Eq)]
pub struct CipherSuite {
    pub id: u16,
    pub name: &'static str,
    pub key_len: usize,
    /// Zero for AEAD suites.
    pub mac_len: usize,
    /// Fixed IV length. The implicit nonce part for AEAD suites.
    pub iv_len: usize,
    pub flags: u8,
    pub kx: KeyExchangeKind,
}

impl CipherSuite {
    #[inline(always)]
    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn is_aead(&self) -> bool {
        self.mac_len == 0
    }

    pub fn is_psk(&self) -> bool {
        self.has(SUITE_PSK)
    }

    /// PRF and transcript hash for TLS 1.2.
    pub fn prf_hash(&self) -> HashAlgorithm {
        if self.has(SUITE_SHA384) {
            HashAlgorithm::Sha384
        } else {
            HashAlgorithm::Sha256
        }
    }

    /// Length of the key block this suite consumes.
    pub fn key_block_len(&self) -> usize {
        2 * (self.mac_len + self.key_len + self.iv_len)
    }
}

use KeyExchangeKind::*;

#[rustfmt::skip]
static SUITES: &[CipherSuite] = &[
    CipherSuite { id: 0xcca9, name: "ECDHE_ECDSA_WITH_CHACHA20_POLY1305", key_len: 32, mac_len: 0, iv_len: 12, flags: SUITE_ECDHE | SUITE_ECDSA | SUITE_TLS12, kx: EcdheEcdsa },
    CipherSuite { id: 0xcca8, name: "ECDHE_RSA_WITH_CHACHA20_POLY1305", key_len: 32, mac_len: 0, iv_len: 12, flags: SUITE_ECDHE | SUITE_TLS12, kx: EcdheRsa },
    CipherSuite { id: 0xc02f, name: "ECDHE_RSA_WITH_AES_128_GCM_SHA256", key_len: 16, mac_len: 0, iv_len: 4, flags: SUITE_ECDHE | SUITE_TLS12, kx: EcdheRsa },
    CipherSuite { id: 0xc02b, name: "ECDHE_ECDSA_WITH_AES_128_GCM_SHA256", key_len: 16, mac_len: 0, iv_len: 4, flags: SUITE_ECDHE | SUITE_ECDSA | SUITE_TLS12, kx: EcdheEcdsa },
    CipherSuite { id: 0xc030, name: "ECDHE_RSA_WITH_AES_256_GCM_SHA384", key_len: 32, mac_len: 0, iv_len: 4, flags: SUITE_ECDHE | SUITE_TLS12 | SUITE_SHA384, kx: EcdheRsa },
    CipherSuite { id: 0xc02c, name: "ECDHE_ECDSA_WITH_AES_256_GCM_SHA384", key_len: 32, mac_len: 0, iv_len: 4, flags: SUITE_ECDHE | SUITE_ECDSA | SUITE_TLS12 | SUITE_SHA384, kx: EcdheEcdsa },
    CipherSuite { id: 0xc027, name: "ECDHE_RSA_WITH_AES_128_CBC_SHA256", key_len: 16, mac_len: 32, iv_len: 16, flags: SUITE_ECDHE | SUITE_TLS12, kx: EcdheRsa },
    CipherSuite { id: 0xc023, name: "ECDHE_ECDSA_WITH_AES_128_CBC_SHA256", key_len: 16, mac_len: 32, iv_len: 16, flags: SUITE_ECDHE | SUITE_ECDSA | SUITE_TLS12, kx: EcdheEcdsa },
    CipherSuite { id: 0xc028, name: "ECDHE_RSA_WITH_AES_256_CBC_SHA384", key_len: 32, mac_len: 48, iv_len: 16, flags: SUITE_ECDHE | SUITE_TLS12 | SUITE_SHA384, kx: EcdheRsa },
    CipherSuite { id: 0xc024, name: "ECDHE_ECDSA_WITH_AES_256_CBC_SHA384", key_len: 32, mac_len: 48, iv_len: 16, flags: SUITE_ECDHE | SUITE_ECDSA | SUITE_TLS12 | SUITE_SHA384, kx: EcdheEcdsa },
    CipherSuite { id: 0xc013, name: "ECDHE_RSA_WITH_AES_128_CBC_SHA", key_len: 16, mac_len: 20, iv_len: 16, flags: SUITE_ECDHE, kx: EcdheRsa },
    CipherSuite { id: 0xc009, name: "ECDHE_ECDSA_WITH_AES_128_CBC_SHA", key_len: 16, mac_len: 20, iv_len: 16, flags: SUITE_ECDHE | SUITE_ECDSA, kx: EcdheEcdsa },
    CipherSuite { id: 0xc014, name: "ECDHE_RSA_WITH_AES_256_CBC_SHA", key_len: 32, mac_len: 20, iv_len: 16, flags: SUITE_ECDHE, kx: EcdheRsa },
    CipherSuite { id: 0xc00a, name: "ECDHE_ECDSA_WITH_AES_256_CBC_SHA", key_len: 32, mac_len: 20, iv_len: 16, flags: SUITE_ECDHE | SUITE_ECDSA, kx: EcdheEcdsa },
    CipherSuite { id: 0x009e, name: "DHE_RSA_WITH_AES_128_GCM_SHA256", key_len: 16, mac_len: 0, iv_len: 4, flags: SUITE_TLS12, kx: DheRsa },
    CipherSuite { id: 0x009f, name: "DHE_RSA_WITH_AES_256_GCM_SHA384", key_len: 32, mac_len: 0, iv_len: 4, flags: SUITE_TLS12 | SUITE_SHA384, kx: DheRsa },
    CipherSuite { id: 0x0033, name: "DHE_RSA_WITH_AES_128_CBC_SHA", key_len: 16, mac_len: 20, iv_len: 16, flags: 0, kx: DheRsa },
    CipherSuite { id: 0x0039, name: "DHE_RSA_WITH_AES_256_CBC_SHA", key_len: 32, mac_len: 20, iv_len: 16, flags: 0, kx: DheRsa },
    CipherSuite { id: 0x009c, name: "RSA_WITH_AES_128_GCM_SHA256", key_len: 16, mac_len: 0, iv_len: 4, flags: SUITE_TLS12, kx: Rsa },
    CipherSuite { id: 0x009d, name: "RSA_WITH_AES_256_GCM_SHA384", key_len: 32, mac_len: 0, iv_len: 4, flags: SUITE_TLS12 | SUITE_SHA384, kx: Rsa },
    CipherSuite { id: 0x002f, name: "RSA_WITH_AES_128_CBC_SHA", key_len: 16, mac_len: 20, iv_len: 16, flags: 0, kx: Rsa },
    CipherSuite { id: 0x0035, name: "RSA_WITH_AES_256_CBC_SHA", key_len: 32, mac_len: 20, iv_len: 16, flags: 0, kx: Rsa },
    CipherSuite { id: 0x000a, name: "RSA_WITH_3DES_EDE_CBC_SHA", key_len: 24, mac_len: 20, iv_len: 8, flags: 0, kx: Rsa },
    CipherSuite { id: 0x0005, name: "RSA_WITH_RC4_128_SHA", key_len: 16, mac_len: 20, iv_len: 0, flags: SUITE_NO_DTLS, kx: Rsa },
    CipherSuite { id: 0x0004, name: "RSA_WITH_RC4_128_MD5", key_len: 16, mac_len: 16, iv_len: 0, flags: SUITE_NO_DTLS, kx: Rsa },
    CipherSuite { id: 0xc011, name: "ECDHE_RSA_WITH_RC4_128_SHA", key_len: 16, mac_len: 20, iv_len: 0, flags: SUITE_ECDHE | SUITE_NO_DTLS, kx: EcdheRsa },
    CipherSuite { id: 0xc007, name: "ECDHE_ECDSA_WITH_RC4_128_SHA", key_len: 16, mac_len: 20, iv_len: 0, flags: SUITE_ECDHE | SUITE_ECDSA | SUITE_NO_DTLS, kx: EcdheEcdsa },
    CipherSuite { id: 0x008a, name: "PSK_WITH_RC4_128_SHA", key_len: 16, mac_len: 20, iv_len: 0, flags: SUITE_PSK | SUITE_NO_DTLS, kx: Psk },
    CipherSuite { id: 0x008c, name: "PSK_WITH_AES_128_CBC_SHA", key_len: 16, mac_len: 20, iv_len: 16, flags: SUITE_PSK, kx: Psk },
    CipherSuite { id: 0x008d, name: "PSK_WITH_AES_256_CBC_SHA", key_len: 32, mac_len: 20, iv_len: 16, flags: SUITE_PSK, kx: Psk },
    CipherSuite { id: 0xc035, name: "ECDHE_PSK_WITH_AES_128_CBC_SHA", key_len: 16, mac_len: 20, iv_len: 16, flags: SUITE_ECDHE | SUITE_PSK, kx: EcdhePsk },
    CipherSuite { id: 0xc036, name: "ECDHE_PSK_WITH_AES_256_CBC_SHA", key_len: 32, mac_len: 20, iv_len: 16, flags: SUITE_ECDHE | SUITE_PSK, kx: EcdhePsk },
];

/// Every registered suite in default preference order.
pub fn all() -> &'static [CipherSuite] {
    SUITES
}

pub fn lookup(id: u16) -> Option<&'static CipherSuite> {
    SUITES.iter().find(|s| s.id == id)
}

/// Default configured suite list: every registered suite.
pub fn default_ids() -> Vec<u16> {
    SUITES.iter().map(|s| s.id).collect()
}

/// The facts a suite has to be compatible with.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext {
    pub version: ProtocolVersion,
    pub is_dtls: bool,
    /// Peer offered a curve we support and the uncompressed point format.
    pub elliptic_ok: bool,
    /// The selected certificate has an ECDSA key.
    pub ecdsa_ok: bool,
    /// Skip every compatibility filter.
    pub enable_all_ciphers: bool,
}

/// Accept `id` if it is in `supported`, registered, and compatible.
pub fn try_cipher_suite(
    id: u16,
    supported: &[u16],
    ctx: &SelectionContext,
) -> Option<&'static CipherSuite> {
    if !supported.contains(&id) {
        return None;
    }
    let suite = lookup(id)?;

    if !ctx.enable_all_ciphers {
        if suite.has(SUITE_ECDHE) && !ctx.elliptic_ok {
            return None;
        }
        if suite.has(SUITE_ECDSA) != ctx.ecdsa_ok {
            return None;
        }
        if ctx.version < ProtocolVersion::Tls12 && suite.has(SUITE_TLS12) {
            return None;
        }
        if ctx.is_dtls && suite.has(SUITE_NO_DTLS) {
            return None;
        }
    }

    Some(suite)
}

/// First suite in `preference` that is also in `supported` and compatible.
pub fn select(
    preference: &[u16],
    supported: &[u16],
    ctx: &SelectionContext,
) -> Option<&'static CipherSuite> {
    preference
        .iter()
        .find_map(|id| try_cipher_suite(*id, supported, ctx))
}

/// Whether any suite in `ids` is defined for TLS 1.2 only.
pub fn any_tls12_only(ids: &[u16]) -> bool {
    ids.iter()
        .filter_map(|id| lookup(*id))
        .any(|s| s.has(SUITE_TLS12))
}
