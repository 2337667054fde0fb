//! Certificate generation helpers for test peers.
//!
//! Generates self-signed server certificates, a throwaway CA and client
//! certificates it issues.

use rcgen::{
    BasicConstraints, Certificate as RcgenCertificate, CertificateParams, DistinguishedName,
    DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair, PKCS_ECDSA_P256_SHA256,
};
use std::fmt;

/// The DNS name of [`generate_self_signed_certificate`].
pub const DEFAULT_SERVER_NAME: &str = "tlspeer.test";

/// Certificate utility error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateError {
    /// Certificate generation failed
    GenerationFailed,
    /// Signing with the issuer failed
    SigningFailed,
}

impl fmt::Display for CertificateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateError::GenerationFailed => write!(f, "Certificate generation failed"),
            CertificateError::SigningFailed => write!(f, "Certificate signing failed"),
        }
    }
}

impl std::error::Error for CertificateError {}

/// Certificate and private key pair
#[derive(Clone)]
pub struct TestCertificate {
    /// Certificate in DER format
    pub certificate: Vec<u8>,
    /// Private key in PKCS#8 DER format
    pub private_key: Vec<u8>,
}

/// A CA that can issue client certificates.
pub struct CertificateAuthority {
    cert: RcgenCertificate,
    der: Vec<u8>,
}

fn params(common_name: &str, names: Vec<String>) -> Result<CertificateParams, CertificateError> {
    let key_pair = KeyPair::generate(&PKCS_ECDSA_P256_SHA256)
        .map_err(|_| CertificateError::GenerationFailed)?;

    let mut params = CertificateParams::new(names);

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::OrganizationName, "tlspeer".to_string());
    distinguished_name.push(DnType::CommonName, common_name.to_string());
    params.distinguished_name = distinguished_name;
    params.is_ca = IsCa::NoCa;
    params.key_pair = Some(key_pair);

    // Valid from yesterday for a year
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now - time::Duration::days(1);
    params.not_after = now + time::Duration::days(365);

    Ok(params)
}

fn build(params: CertificateParams) -> Result<RcgenCertificate, CertificateError> {
    RcgenCertificate::from_params(params).map_err(|_| CertificateError::GenerationFailed)
}

/// Generate a self-signed ECDSA P-256 server certificate for
/// [`DEFAULT_SERVER_NAME`].
pub fn generate_self_signed_certificate() -> Result<TestCertificate, CertificateError> {
    generate_server_certificate(&[DEFAULT_SERVER_NAME])
}

/// Generate a self-signed ECDSA P-256 server certificate for the given names.
pub fn generate_server_certificate(names: &[&str]) -> Result<TestCertificate, CertificateError> {
    let common_name = names.first().copied().unwrap_or("tlspeer");
    let names = names.iter().map(|n| n.to_string()).collect();
    let cert = build(params(common_name, names)?)?;

    let cert_der = cert
        .serialize_der()
        .map_err(|_| CertificateError::GenerationFailed)?;

    Ok(TestCertificate {
        certificate: cert_der,
        private_key: cert.serialize_private_key_der(),
    })
}

impl CertificateAuthority {
    /// Generate a self-signed CA.
    pub fn generate(common_name: &str) -> Result<Self, CertificateError> {
        let mut params = params(common_name, Vec::new())?;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = build(params)?;
        let der = cert
            .serialize_der()
            .map_err(|_| CertificateError::GenerationFailed)?;
        Ok(CertificateAuthority { cert, der })
    }

    /// The CA certificate in DER format.
    pub fn certificate(&self) -> &[u8] {
        &self.der
    }

    /// Issue a client certificate. Without `client_auth_eku` the leaf has
    /// no extended key usage extension at all.
    pub fn issue_client_certificate(
        &self,
        common_name: &str,
        client_auth_eku: bool,
    ) -> Result<TestCertificate, CertificateError> {
        let mut params = params(common_name, Vec::new())?;
        if client_auth_eku {
            params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        }
        let cert = build(params)?;

        let cert_der = cert
            .serialize_der_with_signer(&self.cert)
            .map_err(|_| CertificateError::SigningFailed)?;

        Ok(TestCertificate {
            certificate: cert_der,
            private_key: cert.serialize_private_key_der(),
        })
    }
}

impl fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("certificate", &self.der.len())
            .finish()
    }
}

impl fmt::Debug for TestCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCertificate")
            .field("certificate", &self.certificate.len())
            .field("private_key", &self.private_key.len())
            .finish()
    }
}
