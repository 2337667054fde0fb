use std::fmt::Debug;

use zeroize::Zeroizing;

use super::prf::prf;
use crate::types::{HashAlgorithm, ProtocolVersion};
use crate::Error;

/// Length of every master secret.
pub const MASTER_SECRET_LEN: usize = 48;

/// Derives master secrets and key blocks.
///
/// The default [`PrfKeyDeriver`] follows the PRF of each protocol version.
/// A test harness can substitute its own to observe or perturb derivation.
pub trait KeyDeriver: Send + Sync + Debug {
    /// master_secret = PRF(pre_master_secret, "master secret", client_random + server_random)
    fn master_secret(
        &self,
        version: ProtocolVersion,
        hash: HashAlgorithm,
        pre_master_secret: &[u8],
        client_random: &[u8],
        server_random: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, Error>;

    /// master_secret = PRF(pre_master_secret, "extended master secret", session_hash)
    fn extended_master_secret(
        &self,
        version: ProtocolVersion,
        hash: HashAlgorithm,
        pre_master_secret: &[u8],
        session_hash: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, Error>;

    /// key_block = PRF(master_secret, "key expansion", server_random + client_random)
    fn key_block(
        &self,
        version: ProtocolVersion,
        hash: HashAlgorithm,
        master_secret: &[u8],
        client_random: &[u8],
        server_random: &[u8],
        len: usize,
    ) -> Result<Zeroizing<Vec<u8>>, Error>;
}

#[derive(Debug)]
pub(crate) struct PrfKeyDeriver;

impl KeyDeriver for PrfKeyDeriver {
    fn master_secret(
        &self,
        version: ProtocolVersion,
        hash: HashAlgorithm,
        pre_master_secret: &[u8],
        client_random: &[u8],
        server_random: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        let mut seed = Vec::with_capacity(64);
        seed.extend_from_slice(client_random);
        seed.extend_from_slice(server_random);

        let mut out = Zeroizing::new(vec![0u8; MASTER_SECRET_LEN]);
        prf(version, hash, pre_master_secret, "master secret", &seed, &mut out)?;
        Ok(out)
    }

    fn extended_master_secret(
        &self,
        version: ProtocolVersion,
        hash: HashAlgorithm,
        pre_master_secret: &[u8],
        session_hash: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        let mut out = Zeroizing::new(vec![0u8; MASTER_SECRET_LEN]);
        prf(
            version,
            hash,
            pre_master_secret,
            "extended master secret",
            session_hash,
            &mut out,
        )?;
        Ok(out)
    }

    fn key_block(
        &self,
        version: ProtocolVersion,
        hash: HashAlgorithm,
        master_secret: &[u8],
        client_random: &[u8],
        server_random: &[u8],
        len: usize,
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        // For key expansion, the seed is server_random + client_random
        let mut seed = Vec::with_capacity(64);
        seed.extend_from_slice(server_random);
        seed.extend_from_slice(client_random);

        let mut out = Zeroizing::new(vec![0u8; len]);
        prf(version, hash, master_secret, "key expansion", &seed, &mut out)?;
        Ok(out)
    }
}

pub(crate) static PRF_KEY_DERIVER: PrfKeyDeriver = PrfKeyDeriver;

/// Record protection keys for both directions, cut from the key block.
pub struct TrafficKeys {
    pub client_mac: Zeroizing<Vec<u8>>,
    pub server_mac: Zeroizing<Vec<u8>>,
    pub client_key: Zeroizing<Vec<u8>>,
    pub server_key: Zeroizing<Vec<u8>>,
    pub client_iv: Vec<u8>,
    pub server_iv: Vec<u8>,
}

impl TrafficKeys {
    /// Split a key block of at least `2 * (mac_len + key_len + iv_len)` bytes.
    pub fn split(block: &[u8], mac_len: usize, key_len: usize, iv_len: usize) -> Result<Self, Error> {
        let needed = 2 * (mac_len + key_len + iv_len);
        if block.len() < needed {
            return Err(Error::ResourceFailure(format!(
                "key block too short: {} < {}",
                block.len(),
                needed
            )));
        }

        let mut pos = 0;
        let mut take = |n: usize| {
            let part = block[pos..pos + n].to_vec();
            pos += n;
            part
        };

        Ok(TrafficKeys {
            client_mac: Zeroizing::new(take(mac_len)),
            server_mac: Zeroizing::new(take(mac_len)),
            client_key: Zeroizing::new(take(key_len)),
            server_key: Zeroizing::new(take(key_len)),
            client_iv: take(iv_len),
            server_iv: take(iv_len),
        })
    }
}

impl std::fmt::Debug for TrafficKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficKeys")
            .field("mac_len", &self.client_mac.len())
            .field("key_len", &self.client_key.len())
            .field("iv_len", &self.client_iv.len())
            .finish()
    }
}
