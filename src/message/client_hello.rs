use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};

use super::{ext, frame, parse_extension_block, put_extension, put_u16, put_u16_vec};
use super::{put_u8_vec, random, session_id, u16_list, u16_vec, u8_vec};
use super::{HandshakeType, SessionId};
use crate::cipher_suite::SCSV_RENEGOTIATION;
use crate::types::{NamedCurve, SignatureScheme};

/// A parsed ClientHello.
///
/// Never mutated after parsing. Equality ignoring the cookie is what the
/// DTLS cookie exchange checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientHello {
    /// The full TLS-framed message as received.
    pub raw: Vec<u8>,
    pub is_dtls: bool,
    /// Wire version.
    pub vers: u16,
    pub random: [u8; 32],
    pub session_id: SessionId,
    pub cookie: Vec<u8>,
    pub cipher_suites: Vec<u16>,
    pub compression_methods: Vec<u8>,
    pub next_proto_neg: bool,
    pub server_name: String,
    pub ocsp_stapling: bool,
    pub supported_curves: Vec<NamedCurve>,
    pub supported_points: Vec<u8>,
    pub ticket_supported: bool,
    pub session_ticket: Vec<u8>,
    pub signature_algorithms: Vec<SignatureScheme>,
    /// `Some` when the extension or the renegotiation SCSV was present.
    pub secure_renegotiation: Option<Vec<u8>>,
    pub alpn_protocols: Vec<String>,
    pub channel_id_supported: bool,
    pub extended_master_secret: bool,
    pub srtp_protection_profiles: Vec<u16>,
    pub srtp_master_key_identifier: Vec<u8>,
    pub sct_list_supported: bool,
    pub custom_extension: Option<Vec<u8>>,
    /// Encoding only: write the NPN extension last.
    pub npn_last: bool,
}

impl ClientHello {
    pub fn parse(input: &[u8], is_dtls: bool) -> IResult<&[u8], ClientHello> {
        let (input, vers) = be_u16(input)?;
        let (input, random) = random(input)?;
        let (input, session_id) = session_id(input)?;

        let (input, cookie) = if is_dtls {
            let (input, cookie) = u8_vec(input)?;
            (input, cookie.to_vec())
        } else {
            (input, Vec::new())
        };

        let (input, suites) = u16_vec(input)?;
        let (_, cipher_suites) = u16_list(suites)?;
        let (input, compression_methods) = u8_vec(input)?;

        let mut hello = ClientHello {
            raw: Vec::new(),
            is_dtls,
            vers,
            random,
            session_id,
            cookie,
            cipher_suites,
            compression_methods: compression_methods.to_vec(),
            ..Default::default()
        };

        if hello.cipher_suites.contains(&SCSV_RENEGOTIATION) {
            hello.secure_renegotiation = Some(Vec::new());
        }

        // ClientHello is optionally followed by extension data
        if input.is_empty() {
            return Ok((input, hello));
        }

        let (input, block) = u16_vec(input)?;
        let (_, extensions) = parse_extension_block(block)?;
        for (ext_type, data) in extensions {
            hello.parse_extension(ext_type, data)?;
        }

        Ok((input, hello))
    }

    fn parse_extension<'a>(&mut self, ext_type: u16, data: &'a [u8]) -> IResult<&'a [u8], ()> {
        match ext_type {
            ext::SERVER_NAME => {
                let (_, mut names) = u16_vec(data)?;
                while !names.is_empty() {
                    let (rest, name_type) = be_u8(names)?;
                    let (rest, name) = u16_vec(rest)?;
                    if name_type == 0 {
                        self.server_name = String::from_utf8_lossy(name).into_owned();
                    }
                    names = rest;
                }
            }
            ext::NEXT_PROTO_NEG => {
                if !data.is_empty() {
                    return Err(Err::Failure(Error::new(data, ErrorKind::LengthValue)));
                }
                self.next_proto_neg = true;
            }
            ext::STATUS_REQUEST => {
                // status_type 1 is OCSP
                self.ocsp_stapling = data.first() == Some(&1);
            }
            ext::SUPPORTED_CURVES => {
                let (_, list) = u16_vec(data)?;
                let (_, curves) = u16_list(list)?;
                self.supported_curves = curves.into_iter().map(NamedCurve::from_u16).collect();
            }
            ext::EC_POINT_FORMATS => {
                let (_, points) = u8_vec(data)?;
                self.supported_points = points.to_vec();
            }
            ext::SESSION_TICKET => {
                self.ticket_supported = true;
                self.session_ticket = data.to_vec();
            }
            ext::SIGNATURE_ALGORITHMS => {
                let (_, list) = u16_vec(data)?;
                let (_, schemes) = u16_list(list)?;
                self.signature_algorithms =
                    schemes.into_iter().map(SignatureScheme::from_u16).collect();
            }
            ext::RENEGOTIATION_INFO => {
                let (_, info) = u8_vec(data)?;
                self.secure_renegotiation = Some(info.to_vec());
            }
            ext::ALPN => {
                let (_, mut list) = u16_vec(data)?;
                self.alpn_protocols.clear();
                while !list.is_empty() {
                    let (rest, proto) = u8_vec(list)?;
                    if proto.is_empty() {
                        return Err(Err::Failure(Error::new(list, ErrorKind::LengthValue)));
                    }
                    self.alpn_protocols
                        .push(String::from_utf8_lossy(proto).into_owned());
                    list = rest;
                }
            }
            ext::CHANNEL_ID => {
                if !data.is_empty() {
                    return Err(Err::Failure(Error::new(data, ErrorKind::LengthValue)));
                }
                self.channel_id_supported = true;
            }
            ext::EXTENDED_MASTER_SECRET => {
                if !data.is_empty() {
                    return Err(Err::Failure(Error::new(data, ErrorKind::LengthValue)));
                }
                self.extended_master_secret = true;
            }
            ext::USE_SRTP => {
                let (rest, list) = u16_vec(data)?;
                let (_, profiles) = u16_list(list)?;
                let (_, mki) = u8_vec(rest)?;
                self.srtp_protection_profiles = profiles;
                self.srtp_master_key_identifier = mki.to_vec();
            }
            ext::SCT => {
                if !data.is_empty() {
                    return Err(Err::Failure(Error::new(data, ErrorKind::LengthValue)));
                }
                self.sct_list_supported = true;
            }
            ext::CUSTOM => {
                self.custom_extension = Some(data.to_vec());
            }
            _ => {
                trace!("Ignoring ClientHello extension {}", ext_type);
            }
        }
        Ok((&data[data.len()..], ()))
    }

    /// Equal apart from the cookie and the raw bytes.
    pub fn eq_ignoring_cookie(&self, other: &ClientHello) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        a.cookie.clear();
        a.raw.clear();
        b.cookie.clear();
        b.raw.clear();
        a == b
    }

    /// Encode as a TLS-framed message.
    pub fn marshal(&self) -> Vec<u8> {
        let mut body = Vec::new();
        put_u16(&mut body, self.vers);
        body.extend_from_slice(&self.random);
        put_u8_vec(&mut body, &self.session_id);
        if self.is_dtls {
            put_u8_vec(&mut body, &self.cookie);
        }

        let mut suites = Vec::new();
        for s in &self.cipher_suites {
            put_u16(&mut suites, *s);
        }
        put_u16_vec(&mut body, &suites);
        put_u8_vec(&mut body, &self.compression_methods);

        let mut exts = Vec::new();
        if self.next_proto_neg && !self.npn_last {
            put_extension(&mut exts, ext::NEXT_PROTO_NEG, &[]);
        }
        if !self.server_name.is_empty() {
            let mut entry = vec![0u8];
            put_u16_vec(&mut entry, self.server_name.as_bytes());
            let mut list = Vec::new();
            put_u16_vec(&mut list, &entry);
            put_extension(&mut exts, ext::SERVER_NAME, &list);
        }
        if self.ocsp_stapling {
            // status_type ocsp, empty responder list, empty request extensions
            put_extension(&mut exts, ext::STATUS_REQUEST, &[1, 0, 0, 0, 0]);
        }
        if !self.supported_curves.is_empty() {
            let mut list = Vec::new();
            for c in &self.supported_curves {
                put_u16(&mut list, c.as_u16());
            }
            let mut data = Vec::new();
            put_u16_vec(&mut data, &list);
            put_extension(&mut exts, ext::SUPPORTED_CURVES, &data);
        }
        if !self.supported_points.is_empty() {
            let mut data = Vec::new();
            put_u8_vec(&mut data, &self.supported_points);
            put_extension(&mut exts, ext::EC_POINT_FORMATS, &data);
        }
        if self.ticket_supported {
            put_extension(&mut exts, ext::SESSION_TICKET, &self.session_ticket);
        }
        if !self.signature_algorithms.is_empty() {
            let mut list = Vec::new();
            for s in &self.signature_algorithms {
                put_u16(&mut list, s.as_u16());
            }
            let mut data = Vec::new();
            put_u16_vec(&mut data, &list);
            put_extension(&mut exts, ext::SIGNATURE_ALGORITHMS, &data);
        }
        if let Some(info) = &self.secure_renegotiation {
            let mut data = Vec::new();
            put_u8_vec(&mut data, info);
            put_extension(&mut exts, ext::RENEGOTIATION_INFO, &data);
        }
        if !self.alpn_protocols.is_empty() {
            let mut list = Vec::new();
            for p in &self.alpn_protocols {
                put_u8_vec(&mut list, p.as_bytes());
            }
            let mut data = Vec::new();
            put_u16_vec(&mut data, &list);
            put_extension(&mut exts, ext::ALPN, &data);
        }
        if self.channel_id_supported {
            put_extension(&mut exts, ext::CHANNEL_ID, &[]);
        }
        if self.extended_master_secret {
            put_extension(&mut exts, ext::EXTENDED_MASTER_SECRET, &[]);
        }
        if !self.srtp_protection_profiles.is_empty() {
            let mut list = Vec::new();
            for p in &self.srtp_protection_profiles {
                put_u16(&mut list, *p);
            }
            let mut data = Vec::new();
            put_u16_vec(&mut data, &list);
            put_u8_vec(&mut data, &self.srtp_master_key_identifier);
            put_extension(&mut exts, ext::USE_SRTP, &data);
        }
        if self.sct_list_supported {
            put_extension(&mut exts, ext::SCT, &[]);
        }
        if let Some(custom) = &self.custom_extension {
            put_extension(&mut exts, ext::CUSTOM, custom);
        }
        if self.next_proto_neg && self.npn_last {
            put_extension(&mut exts, ext::NEXT_PROTO_NEG, &[]);
        }

        if !exts.is_empty() {
            put_u16_vec(&mut body, &exts);
        }

        frame(HandshakeType::ClientHello, &body)
    }
}
