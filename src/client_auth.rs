//! Client certificate processing.
//!
//! Parses the chain a client presents, verifies it against the configured
//! roots when the policy asks for it, and extracts the leaf public key that
//! the CertificateVerify is checked with.

use std::fmt::Debug;

use der::{Decode, Encode};
use spki::ObjectIdentifier;
use x509_cert::ext::pkix::ExtendedKeyUsage;
use x509_cert::Certificate as X509Certificate;

use crate::crypto::PeerPublicKey;
use crate::types::{ClientAuthType, HashAlgorithm};
use crate::Error;

const OID_EXTENDED_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37");
const OID_KP_CLIENT_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.2");
const OID_ANY_EXTENDED_KEY_USAGE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.5.29.37.0");

const OID_SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const OID_SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const OID_SHA384_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const OID_SHA512_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
const OID_ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const OID_ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");

/// Longest chain we try to build, root excluded.
const MAX_CHAIN_DEPTH: usize = 8;

/// Verifies client certificate chains.
pub trait ClientCertVerifier: Send + Sync + Debug {
    /// Check that `leaf` chains to a trusted root through `intermediates`,
    /// and that the chain allows client authentication.
    ///
    /// Returns the verified chains, each leaf first and DER encoded.
    fn verify_client_chain(
        &self,
        leaf: &X509Certificate,
        intermediates: &[X509Certificate],
    ) -> Result<Vec<Vec<Vec<u8>>>, String>;

    /// DER subjects advertised in a CertificateRequest.
    fn root_subjects(&self) -> Vec<Vec<u8>>;
}

/// Path building against a fixed set of trusted roots.
///
/// Checks issuer and subject names, issuer signatures and validity periods.
/// Every certificate on the path that carries an extended key usage must
/// allow client authentication.
#[derive(Debug, Clone, Default)]
pub struct TrustRootVerifier {
    roots: Vec<X509Certificate>,
}

impl TrustRootVerifier {
    /// Parse the trusted roots from DER.
    pub fn new(roots: Vec<Vec<u8>>) -> Result<Self, Error> {
        let roots = roots
            .iter()
            .map(|der| {
                X509Certificate::from_der(der)
                    .map_err(|e| Error::Config(format!("bad client CA certificate: {}", e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TrustRootVerifier { roots })
    }
}

impl ClientCertVerifier for TrustRootVerifier {
    fn verify_client_chain(
        &self,
        leaf: &X509Certificate,
        intermediates: &[X509Certificate],
    ) -> Result<Vec<Vec<Vec<u8>>>, String> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();

        let mut path = Vec::new();
        let mut current = leaf;
        for _ in 0..=MAX_CHAIN_DEPTH {
            check_validity(current, now)?;
            if !allows_client_auth(current, true) {
                return Err("certificate does not allow client authentication".to_string());
            }
            path.push(current);

            let issuer = &current.tbs_certificate.issuer;
            if let Some(root) = self
                .roots
                .iter()
                .find(|r| &r.tbs_certificate.subject == issuer && check_signature(r, current).is_ok())
            {
                check_validity(root, now)?;
                trace!("Client chain verified up to {}", root.tbs_certificate.subject);
                path.push(root);
                let chain = path
                    .iter()
                    .map(|c| c.to_der())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| format!("failed to encode certificate: {}", e))?;
                return Ok(vec![chain]);
            }

            current = intermediates
                .iter()
                .find(|c| &c.tbs_certificate.subject == issuer && check_signature(c, current).is_ok())
                .ok_or_else(|| format!("no trusted issuer found for {}", issuer))?;
        }

        Err("certificate chain too long".to_string())
    }

    fn root_subjects(&self) -> Vec<Vec<u8>> {
        self.roots
            .iter()
            .filter_map(|r| r.tbs_certificate.subject.to_der().ok())
            .collect()
    }
}

fn check_validity(cert: &X509Certificate, now: i64) -> Result<(), String> {
    let validity = &cert.tbs_certificate.validity;
    let not_before = validity.not_before.to_unix_duration().as_secs() as i64;
    let not_after = validity.not_after.to_unix_duration().as_secs() as i64;
    if now < not_before || now > not_after {
        return Err(format!(
            "certificate {} is outside its validity period",
            cert.tbs_certificate.subject
        ));
    }
    Ok(())
}

/// Whether `issuer`'s key produced the signature on `subject`.
fn check_signature(issuer: &X509Certificate, subject: &X509Certificate) -> Result<(), String> {
    let hash = match subject.signature_algorithm.oid {
        OID_SHA1_WITH_RSA => HashAlgorithm::Sha1,
        OID_SHA256_WITH_RSA | OID_ECDSA_WITH_SHA256 => HashAlgorithm::Sha256,
        OID_SHA384_WITH_RSA | OID_ECDSA_WITH_SHA384 => HashAlgorithm::Sha384,
        OID_SHA512_WITH_RSA => HashAlgorithm::Sha512,
        other => return Err(format!("unsupported signature algorithm {}", other)),
    };
    let key = PeerPublicKey::from_certificate(issuer).map_err(|e| e.to_string())?;
    let tbs = subject
        .tbs_certificate
        .to_der()
        .map_err(|e| format!("failed to encode certificate: {}", e))?;
    key.verify(hash, &tbs, subject.signature.raw_bytes())
}

/// Extended key usage of a certificate. `None` when the extension is absent.
fn extended_key_usage(cert: &X509Certificate) -> Option<Vec<ObjectIdentifier>> {
    let ext = cert
        .tbs_certificate
        .extensions
        .iter()
        .flatten()
        .find(|e| e.extn_id == OID_EXTENDED_KEY_USAGE)?;
    // An unparseable extension allows nothing.
    Some(
        ExtendedKeyUsage::from_der(ext.extn_value.as_bytes())
            .map(|eku| eku.0)
            .unwrap_or_default(),
    )
}

/// With `absent_allows`, a certificate without the extension is unrestricted.
fn allows_client_auth(cert: &X509Certificate, absent_allows: bool) -> bool {
    match extended_key_usage(cert) {
        None => absent_allows,
        Some(usages) => usages
            .iter()
            .any(|u| *u == OID_KP_CLIENT_AUTH || (absent_allows && *u == OID_ANY_EXTENDED_KEY_USAGE)),
    }
}

/// A client certificate chain that passed processing.
#[derive(Debug, Clone)]
pub(crate) struct ClientIdentity {
    pub public_key: PeerPublicKey,
    /// Empty unless the chain was verified.
    pub verified_chains: Vec<Vec<Vec<u8>>>,
}

/// Parse and check the chain a client presented.
///
/// Returns `None` for an empty chain.
pub(crate) fn process_client_certificates(
    certificates: &[Vec<u8>],
    client_auth: ClientAuthType,
    verifier: &dyn ClientCertVerifier,
) -> Result<Option<ClientIdentity>, Error> {
    let certs = certificates
        .iter()
        .map(|der| {
            X509Certificate::from_der(der).map_err(|e| {
                Error::bad_certificate(format!("failed to parse client certificate: {}", e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let Some((leaf, intermediates)) = certs.split_first() else {
        return Ok(None);
    };

    let mut verified_chains = Vec::new();
    if client_auth.verifies_chain() {
        verified_chains = verifier.verify_client_chain(leaf, intermediates).map_err(|e| {
            Error::bad_certificate(format!("failed to verify client's certificate: {}", e))
        })?;

        if !allows_client_auth(leaf, false) {
            return Err(Error::handshake_auth(
                "client's certificate's extended key usage doesn't permit client authentication",
            ));
        }
    }

    let public_key = PeerPublicKey::from_certificate(leaf).map_err(|e| {
        Error::unsupported_certificate(format!("unsupported client public key: {}", e))
    })?;

    debug!(
        "Client certificate {} with {:?} key",
        leaf.tbs_certificate.subject,
        public_key.key_type()
    );
    Ok(Some(ClientIdentity {
        public_key,
        verified_chains,
    }))
}
