use nom::number::complete::be_u16;
use nom::IResult;

use super::{frame, put_u16, put_u16_vec, u16_vec, HandshakeType};
use crate::types::SignatureScheme;

/// ServerKeyExchange. The body layout belongs to the key agreement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerKeyExchange {
    pub key: Vec<u8>,
}

impl ServerKeyExchange {
    pub fn marshal(&self) -> Vec<u8> {
        frame(HandshakeType::ServerKeyExchange, &self.key)
    }
}

/// ClientKeyExchange. The body layout belongs to the key agreement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientKeyExchange {
    pub ciphertext: Vec<u8>,
}

impl ClientKeyExchange {
    pub fn from_body(body: &[u8]) -> Self {
        ClientKeyExchange {
            ciphertext: body.to_vec(),
        }
    }

    pub fn marshal(&self) -> Vec<u8> {
        frame(HandshakeType::ClientKeyExchange, &self.ciphertext)
    }
}

/// CertificateVerify. Carries a signature algorithm from TLS 1.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerify {
    pub signature_algorithm: Option<SignatureScheme>,
    pub signature: Vec<u8>,
}

impl CertificateVerify {
    pub fn parse(input: &[u8], has_sig_alg: bool) -> IResult<&[u8], CertificateVerify> {
        let (input, signature_algorithm) = if has_sig_alg {
            let (input, v) = be_u16(input)?;
            (input, Some(SignatureScheme::from_u16(v)))
        } else {
            (input, None)
        };
        let (input, signature) = u16_vec(input)?;
        Ok((
            input,
            CertificateVerify {
                signature_algorithm,
                signature: signature.to_vec(),
            },
        ))
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(alg) = self.signature_algorithm {
            put_u16(&mut body, alg.as_u16());
        }
        put_u16_vec(&mut body, &self.signature);
        frame(HandshakeType::CertificateVerify, &body)
    }
}
