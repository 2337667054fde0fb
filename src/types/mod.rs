use nom::number::complete::be_u8;
use nom::IResult;

mod alert;
mod version;

pub use alert::AlertDescription;
pub use version::{wire_to_tls, ProtocolVersion};

/// Record content types seen by the handshake channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Unknown(u8),
}

impl ContentType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ContentType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }
}

/// The only compression method we accept.
pub const COMPRESSION_NULL: u8 = 0;

/// The only EC point format we accept.
pub const POINT_FORMAT_UNCOMPRESSED: u8 = 0;

/// Elliptic curves for ECDHE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedCurve {
    Secp256r1,
    Secp384r1,
    X25519,
    Unknown(u16),
}

impl NamedCurve {
    pub fn from_u16(value: u16) -> Self {
        match value {
            23 => NamedCurve::Secp256r1,
            24 => NamedCurve::Secp384r1,
            29 => NamedCurve::X25519,
            _ => NamedCurve::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            NamedCurve::Secp256r1 => 23,
            NamedCurve::Secp384r1 => 24,
            NamedCurve::X25519 => 29,
            NamedCurve::Unknown(value) => *value,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, NamedCurve::Unknown(_))
    }
}

/// Digest used by a signature or PRF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// MD5 and SHA-1 concatenated, the pre TLS 1.2 RSA digest.
    Md5Sha1,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5Sha1 => 36,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }
}

/// Key family of a certificate or signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Rsa,
    Ecdsa,
}

/// TLS 1.2 SignatureAndHashAlgorithm, as a single u16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureScheme {
    RsaPkcs1Sha1,
    EcdsaSha1,
    RsaPkcs1Sha256,
    EcdsaSecp256r1Sha256,
    RsaPkcs1Sha384,
    EcdsaSecp384r1Sha384,
    RsaPkcs1Sha512,
    EcdsaSecp521r1Sha512,
    Unknown(u16),
}

impl SignatureScheme {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0201 => SignatureScheme::RsaPkcs1Sha1,
            0x0203 => SignatureScheme::EcdsaSha1,
            0x0401 => SignatureScheme::RsaPkcs1Sha256,
            0x0403 => SignatureScheme::EcdsaSecp256r1Sha256,
            0x0501 => SignatureScheme::RsaPkcs1Sha384,
            0x0503 => SignatureScheme::EcdsaSecp384r1Sha384,
            0x0601 => SignatureScheme::RsaPkcs1Sha512,
            0x0603 => SignatureScheme::EcdsaSecp521r1Sha512,
            _ => SignatureScheme::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            SignatureScheme::RsaPkcs1Sha1 => 0x0201,
            SignatureScheme::EcdsaSha1 => 0x0203,
            SignatureScheme::RsaPkcs1Sha256 => 0x0401,
            SignatureScheme::EcdsaSecp256r1Sha256 => 0x0403,
            SignatureScheme::RsaPkcs1Sha384 => 0x0501,
            SignatureScheme::EcdsaSecp384r1Sha384 => 0x0503,
            SignatureScheme::RsaPkcs1Sha512 => 0x0601,
            SignatureScheme::EcdsaSecp521r1Sha512 => 0x0603,
            SignatureScheme::Unknown(value) => *value,
        }
    }

    pub fn hash(&self) -> Option<HashAlgorithm> {
        match self {
            SignatureScheme::RsaPkcs1Sha1 | SignatureScheme::EcdsaSha1 => Some(HashAlgorithm::Sha1),
            SignatureScheme::RsaPkcs1Sha256 | SignatureScheme::EcdsaSecp256r1Sha256 => {
                Some(HashAlgorithm::Sha256)
            }
            SignatureScheme::RsaPkcs1Sha384 | SignatureScheme::EcdsaSecp384r1Sha384 => {
                Some(HashAlgorithm::Sha384)
            }
            SignatureScheme::RsaPkcs1Sha512 | SignatureScheme::EcdsaSecp521r1Sha512 => {
                Some(HashAlgorithm::Sha512)
            }
            SignatureScheme::Unknown(_) => None,
        }
    }

    pub fn key_type(&self) -> Option<KeyType> {
        match self {
            SignatureScheme::RsaPkcs1Sha1
            | SignatureScheme::RsaPkcs1Sha256
            | SignatureScheme::RsaPkcs1Sha384
            | SignatureScheme::RsaPkcs1Sha512 => Some(KeyType::Rsa),
            SignatureScheme::EcdsaSha1
            | SignatureScheme::EcdsaSecp256r1Sha256
            | SignatureScheme::EcdsaSecp384r1Sha384
            | SignatureScheme::EcdsaSecp521r1Sha512 => Some(KeyType::Ecdsa),
            SignatureScheme::Unknown(_) => None,
        }
    }

    /// Default preference list when the configuration gives none.
    pub fn default_list() -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::EcdsaSecp256r1Sha256,
            SignatureScheme::RsaPkcs1Sha256,
            SignatureScheme::EcdsaSecp384r1Sha384,
            SignatureScheme::RsaPkcs1Sha384,
            SignatureScheme::RsaPkcs1Sha512,
            SignatureScheme::EcdsaSha1,
            SignatureScheme::RsaPkcs1Sha1,
        ]
    }
}

/// How the server treats client certificates.
///
/// Variants are ordered by strictness, so `>= ClientAuthType::Request` means
/// a CertificateRequest is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ClientAuthType {
    #[default]
    NoClientCert,
    RequestClientCert,
    RequireAnyClientCert,
    VerifyClientCertIfGiven,
    RequireAndVerifyClientCert,
}

impl ClientAuthType {
    /// A certificate must be presented.
    pub fn requires_cert(&self) -> bool {
        matches!(
            self,
            ClientAuthType::RequireAnyClientCert | ClientAuthType::RequireAndVerifyClientCert
        )
    }

    /// A presented certificate chain must be verified.
    pub fn verifies_chain(&self) -> bool {
        *self >= ClientAuthType::VerifyClientCertIfGiven
    }
}

/// ClientCertificateType values in a CertificateRequest.
pub const CERT_TYPE_RSA_SIGN: u8 = 1;
pub const CERT_TYPE_ECDSA_SIGN: u8 = 64;
