//! Running handshake transcript and the values bound to it.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::cipher_suite::CipherSuite;
use crate::crypto::{prf, RunningHash};
use crate::types::{HashAlgorithm, ProtocolVersion};
use crate::Error;

const CLIENT_FINISHED_LABEL: &str = "client finished";
const SERVER_FINISHED_LABEL: &str = "server finished";

const SSL3_CLIENT_MAGIC: &[u8] = b"CLNT";
const SSL3_SERVER_MAGIC: &[u8] = b"SRVR";
const SSL3_PAD1: [u8; 48] = [0x36; 48];
const SSL3_PAD2: [u8; 48] = [0x5c; 48];

const CHANNEL_ID_LABEL: &[u8] = b"TLS Channel ID signature\x00";
const CHANNEL_ID_RESUMPTION_LABEL: &[u8] = b"Resumption\x00";

/// Verify data length for TLS. SSL 3.0 uses the full 36 byte digest.
const FINISHED_LEN: usize = 12;

/// Transcript of every handshake message since the ClientHello the suite
/// was selected for.
///
/// Before TLS 1.2 the running digest is MD5 and SHA-1 side by side. From
/// TLS 1.2 it is the suite's PRF hash. The raw bytes are also buffered until
/// [`Transcript::discard_buffer`] for signatures that hash the whole
/// transcript with another algorithm.
#[derive(Debug, Clone)]
pub struct Transcript {
    version: ProtocolVersion,
    is_dtls: bool,
    hash: RunningHash,
    buffer: Option<Vec<u8>>,
}

impl Transcript {
    pub fn new(version: ProtocolVersion, suite: &CipherSuite, is_dtls: bool) -> Self {
        let algorithm = if version >= ProtocolVersion::Tls12 {
            suite.prf_hash()
        } else {
            HashAlgorithm::Md5Sha1
        };
        Transcript {
            version,
            is_dtls,
            hash: RunningHash::new(algorithm),
            buffer: Some(Vec::new()),
        }
    }

    /// Append one TLS-framed handshake message.
    ///
    /// Over DTLS the 4 byte header is replaced by the unfragmented 12 byte
    /// DTLS header carrying `seq`.
    pub fn add(&mut self, msg: &[u8], seq: u16) {
        if self.is_dtls && msg.len() >= 4 {
            let seq = seq.to_be_bytes();
            let header = [
                msg[0], msg[1], msg[2], msg[3], seq[0], seq[1], 0, 0, 0, msg[1], msg[2], msg[3],
            ];
            self.write(&header);
            self.write(&msg[4..]);
        } else {
            self.write(msg);
        }
    }

    fn write(&mut self, data: &[u8]) {
        self.hash.update(data);
        if let Some(buffer) = &mut self.buffer {
            buffer.extend_from_slice(data);
        }
    }

    /// Stop buffering raw bytes. The running digest continues.
    pub fn discard_buffer(&mut self) {
        trace!("Discard transcript buffer");
        self.buffer = None;
    }

    /// The raw transcript, unless discarded.
    pub fn buffer(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    /// The handshake hash: `md5 || sha1` before TLS 1.2, the PRF hash after.
    pub fn sum(&self) -> Vec<u8> {
        self.hash.snapshot()
    }

    /// The single digest stored with a session and bound by Channel ID.
    /// SHA-1 before TLS 1.2.
    pub fn handshake_digest(&self) -> Vec<u8> {
        match &self.hash {
            RunningHash::Md5Sha1(_, sha1) => sha1.clone().finalize().to_vec(),
            other => other.snapshot(),
        }
    }

    fn finished_sum(&self, master_secret: &[u8], label: &str, magic: &[u8]) -> Result<Vec<u8>, Error> {
        if self.version == ProtocolVersion::Ssl30 {
            let RunningHash::Md5Sha1(md5, sha1) = &self.hash else {
                return Err(Error::ResourceFailure(
                    "SSL 3.0 transcript without MD5/SHA-1".to_string(),
                ));
            };
            return Ok(ssl30_sum(md5.clone(), sha1.clone(), master_secret, magic));
        }

        let mut out = vec![0u8; FINISHED_LEN];
        prf(
            self.version,
            self.hash.algorithm(),
            master_secret,
            label,
            &self.sum(),
            &mut out,
        )?;
        Ok(out)
    }

    /// Verify data the client is expected to send.
    pub fn client_sum(&self, master_secret: &[u8]) -> Result<Vec<u8>, Error> {
        self.finished_sum(master_secret, CLIENT_FINISHED_LABEL, SSL3_CLIENT_MAGIC)
    }

    /// Verify data of our own Finished.
    pub fn server_sum(&self, master_secret: &[u8]) -> Result<Vec<u8>, Error> {
        self.finished_sum(master_secret, SERVER_FINISHED_LABEL, SSL3_SERVER_MAGIC)
    }

    /// Compare the client's verify data in constant time.
    pub fn verify_client_finished(&self, master_secret: &[u8], received: &[u8]) -> Result<Vec<u8>, Error> {
        let expected = self.client_sum(master_secret)?;
        let matches: bool = expected.len() == received.len() && bool::from(expected.ct_eq(received));
        if !matches {
            return Err(Error::handshake_auth("client's Finished message is incorrect"));
        }
        Ok(expected)
    }

    /// The fixed SSL 3.0 digest a client certificate signs.
    ///
    /// Needs the raw transcript buffer.
    pub fn ssl30_certificate_verify_digest(&self, master_secret: &[u8]) -> Result<Vec<u8>, Error> {
        let buffer = self.buffer.as_deref().ok_or_else(|| {
            Error::ResourceFailure("transcript buffer already discarded".to_string())
        })?;
        let mut md5 = Md5::new();
        md5.update(buffer);
        let mut sha1 = Sha1::new();
        sha1.update(buffer);
        Ok(ssl30_sum(md5, sha1, master_secret, &[]))
    }

    /// SHA-256 digest a Channel ID key signs.
    ///
    /// A resumed handshake also binds the handshake hash of the original
    /// session.
    pub fn channel_id_hash(&self, resume_hash: Option<&[u8]>) -> Vec<u8> {
        let mut h = Sha256::new();
        h.update(CHANNEL_ID_LABEL);
        if let Some(resume_hash) = resume_hash {
            h.update(CHANNEL_ID_RESUMPTION_LABEL);
            h.update(resume_hash);
        }
        h.update(self.handshake_digest());
        h.finalize().to_vec()
    }
}

/// SSL 3.0 MAC-like construction over the running MD5 and SHA-1.
fn ssl30_sum(mut md5: Md5, mut sha1: Sha1, master_secret: &[u8], magic: &[u8]) -> Vec<u8> {
    md5.update(magic);
    md5.update(master_secret);
    md5.update(SSL3_PAD1);
    let inner = md5.finalize();
    let mut md5 = Md5::new();
    md5.update(master_secret);
    md5.update(SSL3_PAD2);
    md5.update(inner);
    let md5_digest = md5.finalize();

    sha1.update(magic);
    sha1.update(master_secret);
    sha1.update(&SSL3_PAD1[..40]);
    let inner = sha1.finalize();
    let mut sha1 = Sha1::new();
    sha1.update(master_secret);
    sha1.update(&SSL3_PAD2[..40]);
    sha1.update(inner);
    let sha1_digest = sha1.finalize();

    let mut out = md5_digest.to_vec();
    out.extend_from_slice(&sha1_digest);
    out
}
