use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::types::HashAlgorithm;

/// A running digest that can be snapshotted by cloning.
#[derive(Clone)]
pub enum RunningHash {
    /// MD5 and SHA-1 side by side. Finalizes to `md5 || sha1`.
    Md5Sha1(Md5, Sha1),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl RunningHash {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5Sha1 => RunningHash::Md5Sha1(Md5::new(), Sha1::new()),
            HashAlgorithm::Sha1 => RunningHash::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => RunningHash::Sha256(Sha256::new()),
            HashAlgorithm::Sha384 => RunningHash::Sha384(Sha384::new()),
            HashAlgorithm::Sha512 => RunningHash::Sha512(Sha512::new()),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            RunningHash::Md5Sha1(..) => HashAlgorithm::Md5Sha1,
            RunningHash::Sha1(_) => HashAlgorithm::Sha1,
            RunningHash::Sha256(_) => HashAlgorithm::Sha256,
            RunningHash::Sha384(_) => HashAlgorithm::Sha384,
            RunningHash::Sha512(_) => HashAlgorithm::Sha512,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            RunningHash::Md5Sha1(md5, sha1) => {
                md5.update(data);
                sha1.update(data);
            }
            RunningHash::Sha1(h) => h.update(data),
            RunningHash::Sha256(h) => h.update(data),
            RunningHash::Sha384(h) => h.update(data),
            RunningHash::Sha512(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            RunningHash::Md5Sha1(md5, sha1) => {
                let mut out = md5.finalize().to_vec();
                out.extend_from_slice(&sha1.finalize());
                out
            }
            RunningHash::Sha1(h) => h.finalize().to_vec(),
            RunningHash::Sha256(h) => h.finalize().to_vec(),
            RunningHash::Sha384(h) => h.finalize().to_vec(),
            RunningHash::Sha512(h) => h.finalize().to_vec(),
        }
    }

    /// Digest of everything so far, leaving the running state untouched.
    pub fn snapshot(&self) -> Vec<u8> {
        self.clone().finalize()
    }
}

impl std::fmt::Debug for RunningHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RunningHash({:?})", self.algorithm())
    }
}

/// One-shot digest.
pub fn digest(algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    let mut h = RunningHash::new(algorithm);
    h.update(data);
    h.finalize()
}
