use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use super::{ext, frame, parse_extension_block, put_extension, put_u16, put_u16_vec};
use super::{put_u8_vec, random, session_id, u16_vec, u8_vec};
use super::{HandshakeType, SessionId};

/// ServerHello as sent by us.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerHello {
    /// Wire version.
    pub vers: u16,
    pub random: [u8; 32],
    pub session_id: SessionId,
    pub cipher_suite: u16,
    pub compression_method: u8,
    pub extensions: ServerExtensions,
}

/// Extensions of a ServerHello.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerExtensions {
    pub next_proto_neg: bool,
    pub next_protos: Vec<String>,
    /// Write NPN after every other extension.
    pub npn_last: bool,
    pub ocsp_stapling: bool,
    pub ticket_supported: bool,
    pub secure_renegotiation: Option<Vec<u8>>,
    pub alpn_protocol: Option<String>,
    pub duplicate_extension: bool,
    pub channel_id_requested: bool,
    pub extended_master_secret: bool,
    /// Zero when not negotiated.
    pub srtp_protection_profile: u16,
    pub srtp_master_key_identifier: Vec<u8>,
    pub sct_list: Option<Vec<u8>>,
    pub custom_extension: Option<Vec<u8>>,
}

impl ServerExtensions {
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::new();

        if self.duplicate_extension {
            put_extension(&mut out, ext::DUPLICATE, &[]);
        }
        if self.next_proto_neg && !self.npn_last {
            self.put_npn(&mut out);
        }
        if self.ocsp_stapling {
            put_extension(&mut out, ext::STATUS_REQUEST, &[]);
        }
        if self.ticket_supported {
            put_extension(&mut out, ext::SESSION_TICKET, &[]);
        }
        if let Some(info) = &self.secure_renegotiation {
            let mut data = Vec::new();
            put_u8_vec(&mut data, info);
            put_extension(&mut out, ext::RENEGOTIATION_INFO, &data);
        }
        if let Some(proto) = &self.alpn_protocol {
            let mut list = Vec::new();
            put_u8_vec(&mut list, proto.as_bytes());
            let mut data = Vec::new();
            put_u16_vec(&mut data, &list);
            put_extension(&mut out, ext::ALPN, &data);
        }
        if self.channel_id_requested {
            put_extension(&mut out, ext::CHANNEL_ID, &[]);
        }
        if self.duplicate_extension {
            put_extension(&mut out, ext::DUPLICATE, &[]);
        }
        if self.extended_master_secret {
            put_extension(&mut out, ext::EXTENDED_MASTER_SECRET, &[]);
        }
        if self.srtp_protection_profile != 0 {
            let mut data = Vec::new();
            put_u16(&mut data, 2);
            put_u16(&mut data, self.srtp_protection_profile);
            put_u8_vec(&mut data, &self.srtp_master_key_identifier);
            put_extension(&mut out, ext::USE_SRTP, &data);
        }
        if let Some(sct) = &self.sct_list {
            put_extension(&mut out, ext::SCT, sct);
        }
        if let Some(custom) = &self.custom_extension {
            put_extension(&mut out, ext::CUSTOM, custom);
        }
        if self.next_proto_neg && self.npn_last {
            self.put_npn(&mut out);
        }

        out
    }

    fn put_npn(&self, out: &mut Vec<u8>) {
        let mut data = Vec::new();
        for p in &self.next_protos {
            put_u8_vec(&mut data, p.as_bytes());
        }
        put_extension(out, ext::NEXT_PROTO_NEG, &data);
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerExtensions> {
        let (rest, block) = parse_extension_block(input)?;
        let mut exts = ServerExtensions::default();
        for (ext_type, data) in block {
            match ext_type {
                ext::NEXT_PROTO_NEG => {
                    exts.next_proto_neg = true;
                    exts.npn_last = exts.has_any();
                    let mut list = data;
                    while !list.is_empty() {
                        let (r, p) = u8_vec(list)?;
                        exts.next_protos.push(String::from_utf8_lossy(p).into_owned());
                        list = r;
                    }
                }
                ext::STATUS_REQUEST => exts.ocsp_stapling = true,
                ext::SESSION_TICKET => exts.ticket_supported = true,
                ext::RENEGOTIATION_INFO => {
                    let (_, info) = u8_vec(data)?;
                    exts.secure_renegotiation = Some(info.to_vec());
                }
                ext::ALPN => {
                    let (_, list) = u16_vec(data)?;
                    let (_, proto) = u8_vec(list)?;
                    exts.alpn_protocol = Some(String::from_utf8_lossy(proto).into_owned());
                }
                ext::CHANNEL_ID => exts.channel_id_requested = true,
                ext::DUPLICATE => exts.duplicate_extension = true,
                ext::EXTENDED_MASTER_SECRET => exts.extended_master_secret = true,
                ext::USE_SRTP => {
                    let (r, _len) = be_u16(data)?;
                    let (r, profile) = be_u16(r)?;
                    let (_, mki) = u8_vec(r)?;
                    exts.srtp_protection_profile = profile;
                    exts.srtp_master_key_identifier = mki.to_vec();
                }
                ext::SCT => exts.sct_list = Some(data.to_vec()),
                ext::CUSTOM => exts.custom_extension = Some(data.to_vec()),
                _ => {}
            }
        }
        Ok((rest, exts))
    }

    fn has_any(&self) -> bool {
        self.ocsp_stapling
            || self.ticket_supported
            || self.secure_renegotiation.is_some()
            || self.alpn_protocol.is_some()
            || self.channel_id_requested
            || self.extended_master_secret
            || self.srtp_protection_profile != 0
            || self.sct_list.is_some()
            || self.custom_extension.is_some()
    }
}

impl ServerHello {
    /// Encode as a TLS-framed message.
    ///
    /// The extensions block is omitted entirely when there are none.
    pub fn marshal(&self) -> Vec<u8> {
        let mut body = Vec::new();
        put_u16(&mut body, self.vers);
        body.extend_from_slice(&self.random);
        put_u8_vec(&mut body, &self.session_id);
        put_u16(&mut body, self.cipher_suite);
        body.push(self.compression_method);

        let exts = self.extensions.marshal();
        if !exts.is_empty() {
            put_u16_vec(&mut body, &exts);
        }

        frame(HandshakeType::ServerHello, &body)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerHello> {
        let (input, vers) = be_u16(input)?;
        let (input, random) = random(input)?;
        let (input, session_id) = session_id(input)?;
        let (input, cipher_suite) = be_u16(input)?;
        let (input, compression_method) = be_u8(input)?;

        let (input, extensions) = if input.is_empty() {
            (input, ServerExtensions::default())
        } else {
            let (input, block) = u16_vec(input)?;
            let (_, extensions) = ServerExtensions::parse(block)?;
            (input, extensions)
        };

        Ok((
            input,
            ServerHello {
                vers,
                random,
                session_id,
                cipher_suite,
                compression_method,
                extensions,
            },
        ))
    }
}
