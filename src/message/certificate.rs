use nom::number::complete::be_u8;
use nom::IResult;

use super::{frame, put_u16, put_u16_vec, put_u24_vec, put_u8_vec};
use super::{u16_list, u16_vec, u24_vec, u8_vec, HandshakeType};
use crate::types::SignatureScheme;

/// Certificate message: a chain of DER certificates, leaf first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateMsg {
    pub certificates: Vec<Vec<u8>>,
}

impl CertificateMsg {
    pub fn parse(input: &[u8]) -> IResult<&[u8], CertificateMsg> {
        let (input, mut list) = u24_vec(input)?;
        let mut certificates = Vec::new();
        while !list.is_empty() {
            let (rest, cert) = u24_vec(list)?;
            certificates.push(cert.to_vec());
            list = rest;
        }
        Ok((input, CertificateMsg { certificates }))
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut list = Vec::new();
        for cert in &self.certificates {
            put_u24_vec(&mut list, cert);
        }
        let mut body = Vec::new();
        put_u24_vec(&mut body, &list);
        frame(HandshakeType::Certificate, &body)
    }
}

/// CertificateStatus carrying an OCSP response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateStatus {
    pub response: Vec<u8>,
}

const STATUS_TYPE_OCSP: u8 = 1;

impl CertificateStatus {
    pub fn parse(input: &[u8]) -> IResult<&[u8], CertificateStatus> {
        let (input, _status_type) = be_u8(input)?;
        let (input, response) = u24_vec(input)?;
        Ok((
            input,
            CertificateStatus {
                response: response.to_vec(),
            },
        ))
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut body = vec![STATUS_TYPE_OCSP];
        put_u24_vec(&mut body, &self.response);
        frame(HandshakeType::CertificateStatus, &body)
    }
}

/// CertificateRequest.
///
/// The signature algorithm list only exists on the wire from TLS 1.2.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateRequest {
    pub certificate_types: Vec<u8>,
    pub has_signature_algorithms: bool,
    pub signature_algorithms: Vec<SignatureScheme>,
    /// DER encoded distinguished names.
    pub certificate_authorities: Vec<Vec<u8>>,
}

impl CertificateRequest {
    pub fn parse(input: &[u8], has_signature_algorithms: bool) -> IResult<&[u8], CertificateRequest> {
        let (input, types) = u8_vec(input)?;

        let (input, signature_algorithms) = if has_signature_algorithms {
            let (input, list) = u16_vec(input)?;
            let (_, schemes) = u16_list(list)?;
            (
                input,
                schemes.into_iter().map(SignatureScheme::from_u16).collect(),
            )
        } else {
            (input, Vec::new())
        };

        let (input, mut cas) = u16_vec(input)?;
        let mut certificate_authorities = Vec::new();
        while !cas.is_empty() {
            let (rest, dn) = u16_vec(cas)?;
            certificate_authorities.push(dn.to_vec());
            cas = rest;
        }

        Ok((
            input,
            CertificateRequest {
                certificate_types: types.to_vec(),
                has_signature_algorithms,
                signature_algorithms,
                certificate_authorities,
            },
        ))
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut body = Vec::new();
        put_u8_vec(&mut body, &self.certificate_types);

        if self.has_signature_algorithms {
            let mut list = Vec::new();
            for s in &self.signature_algorithms {
                put_u16(&mut list, s.as_u16());
            }
            put_u16_vec(&mut body, &list);
        }

        let mut cas = Vec::new();
        for dn in &self.certificate_authorities {
            put_u16_vec(&mut cas, dn);
        }
        put_u16_vec(&mut body, &cas);

        frame(HandshakeType::CertificateRequest, &body)
    }
}
