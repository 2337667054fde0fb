use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u32};
use nom::{Err, IResult};

use super::{ext, frame, put_u16, put_u16_vec, put_u8_vec, u16_vec, u8_vec, HandshakeType};

/// Finished carries the raw verify data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

impl Finished {
    pub fn from_body(body: &[u8]) -> Self {
        Finished {
            verify_data: body.to_vec(),
        }
    }

    pub fn marshal(&self) -> Vec<u8> {
        frame(HandshakeType::Finished, &self.verify_data)
    }
}

/// NewSessionTicket. We always send a zero lifetime hint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSessionTicket {
    pub ticket: Vec<u8>,
}

impl NewSessionTicket {
    pub fn parse(input: &[u8]) -> IResult<&[u8], NewSessionTicket> {
        let (input, _lifetime_hint) = be_u32(input)?;
        let (input, ticket) = u16_vec(input)?;
        Ok((
            input,
            NewSessionTicket {
                ticket: ticket.to_vec(),
            },
        ))
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut body = vec![0, 0, 0, 0];
        put_u16_vec(&mut body, &self.ticket);
        frame(HandshakeType::NewSessionTicket, &body)
    }
}

/// The legacy NPN message, sent by the client after ChangeCipherSpec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NextProtocol {
    pub proto: String,
}

impl NextProtocol {
    pub fn parse(input: &[u8]) -> IResult<&[u8], NextProtocol> {
        let (input, proto) = u8_vec(input)?;
        let (input, _padding) = u8_vec(input)?;
        Ok((
            input,
            NextProtocol {
                proto: String::from_utf8_lossy(proto).into_owned(),
            },
        ))
    }

    /// The message is padded so its length does not reveal the protocol.
    pub fn marshal(&self) -> Vec<u8> {
        let mut body = Vec::new();
        put_u8_vec(&mut body, self.proto.as_bytes());
        let padding = 32 - (self.proto.len() + 2) % 32;
        put_u8_vec(&mut body, &vec![0u8; padding]);
        frame(HandshakeType::NextProtocol, &body)
    }
}

/// Channel ID as sent in the encrypted extensions message.
///
/// Holds the raw P-256 point (x, y) followed by the signature (r, s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelIdMsg {
    pub channel_id: [u8; 128],
}

impl ChannelIdMsg {
    pub fn parse(input: &[u8]) -> IResult<&[u8], ChannelIdMsg> {
        let (input, ext_type) = be_u16(input)?;
        if ext_type != ext::CHANNEL_ID {
            return Err(Err::Failure(Error::new(input, ErrorKind::Tag)));
        }
        let (input, len) = be_u16(input)?;
        if len != 128 {
            return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
        }
        let (input, data) = take(128usize)(input)?;
        let mut channel_id = [0u8; 128];
        channel_id.copy_from_slice(data);
        Ok((input, ChannelIdMsg { channel_id }))
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut body = Vec::new();
        put_u16(&mut body, ext::CHANNEL_ID);
        put_u16_vec(&mut body, &self.channel_id);
        frame(HandshakeType::ChannelId, &body)
    }

    /// Split into x, y, r and s.
    pub fn parts(&self) -> [[u8; 32]; 4] {
        let mut out = [[0u8; 32]; 4];
        for (i, part) in out.iter_mut().enumerate() {
            part.copy_from_slice(&self.channel_id[i * 32..(i + 1) * 32]);
        }
        out
    }
}

/// HelloVerifyRequest, the DTLS cookie challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelloVerifyRequest {
    /// Wire version.
    pub vers: u16,
    pub cookie: Vec<u8>,
}

impl HelloVerifyRequest {
    pub fn parse(input: &[u8]) -> IResult<&[u8], HelloVerifyRequest> {
        let (input, vers) = be_u16(input)?;
        let (input, cookie) = u8_vec(input)?;
        Ok((
            input,
            HelloVerifyRequest {
                vers,
                cookie: cookie.to_vec(),
            },
        ))
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut body = Vec::new();
        put_u16(&mut body, self.vers);
        put_u8_vec(&mut body, &self.cookie);
        frame(HandshakeType::HelloVerifyRequest, &body)
    }
}
