//! Handshake message codec.
//!
//! Messages are exchanged with the channel in TLS framing
//! (`type | length[3] | body`) for both TLS and DTLS. The DTLS header only
//! matters to the transcript, which rebuilds it.

use nom::bytes::complete::take;
use nom::error::{Error as NomError, ErrorKind};
use nom::multi::length_data;
use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::{Err, IResult};
use tinyvec::ArrayVec;

mod certificate;
mod client_hello;
mod finished;
mod key_exchange;
mod server_hello;

pub use certificate::{CertificateMsg, CertificateRequest, CertificateStatus};
pub use client_hello::ClientHello;
pub use finished::{ChannelIdMsg, Finished, HelloVerifyRequest, NewSessionTicket, NextProtocol};
pub use key_exchange::{CertificateVerify, ClientKeyExchange, ServerKeyExchange};
pub use server_hello::{ServerExtensions, ServerHello};

use crate::types::ProtocolVersion;
use crate::Error;

/// Session IDs are at most 32 bytes.
pub type SessionId = ArrayVec<[u8; 32]>;

/// Extension numbers understood by the server.
pub mod ext {
    pub const SERVER_NAME: u16 = 0;
    pub const STATUS_REQUEST: u16 = 5;
    pub const SUPPORTED_CURVES: u16 = 10;
    pub const EC_POINT_FORMATS: u16 = 11;
    pub const SIGNATURE_ALGORITHMS: u16 = 13;
    pub const USE_SRTP: u16 = 14;
    pub const ALPN: u16 = 16;
    pub const SCT: u16 = 18;
    pub const EXTENDED_MASTER_SECRET: u16 = 23;
    pub const SESSION_TICKET: u16 = 35;
    pub const CUSTOM: u16 = 1234;
    pub const NEXT_PROTO_NEG: u16 = 13172;
    pub const CHANNEL_ID: u16 = 30032;
    pub const RENEGOTIATION_INFO: u16 = 0xff01;
    pub const DUPLICATE: u16 = 0xffff;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeType {
    HelloRequest,
    ClientHello,
    ServerHello,
    HelloVerifyRequest,
    NewSessionTicket,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone,
    CertificateVerify,
    ClientKeyExchange,
    Finished,
    CertificateStatus,
    NextProtocol,
    ChannelId,
    Unknown(u8),
}

impl HandshakeType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => HandshakeType::HelloRequest,
            1 => HandshakeType::ClientHello,
            2 => HandshakeType::ServerHello,
            3 => HandshakeType::HelloVerifyRequest,
            4 => HandshakeType::NewSessionTicket,
            11 => HandshakeType::Certificate,
            12 => HandshakeType::ServerKeyExchange,
            13 => HandshakeType::CertificateRequest,
            14 => HandshakeType::ServerHelloDone,
            15 => HandshakeType::CertificateVerify,
            16 => HandshakeType::ClientKeyExchange,
            20 => HandshakeType::Finished,
            22 => HandshakeType::CertificateStatus,
            67 => HandshakeType::NextProtocol,
            203 => HandshakeType::ChannelId,
            _ => HandshakeType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            HandshakeType::HelloRequest => 0,
            HandshakeType::ClientHello => 1,
            HandshakeType::ServerHello => 2,
            HandshakeType::HelloVerifyRequest => 3,
            HandshakeType::NewSessionTicket => 4,
            HandshakeType::Certificate => 11,
            HandshakeType::ServerKeyExchange => 12,
            HandshakeType::CertificateRequest => 13,
            HandshakeType::ServerHelloDone => 14,
            HandshakeType::CertificateVerify => 15,
            HandshakeType::ClientKeyExchange => 16,
            HandshakeType::Finished => 20,
            HandshakeType::CertificateStatus => 22,
            HandshakeType::NextProtocol => 67,
            HandshakeType::ChannelId => 203,
            HandshakeType::Unknown(value) => *value,
        }
    }
}

/// Decoding context that changes the wire layout of some messages.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext {
    pub is_dtls: bool,
    /// Negotiated version, once known. Decides if CertificateVerify carries
    /// a signature algorithm.
    pub version: Option<ProtocolVersion>,
}

/// A decoded message from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    ClientHello(ClientHello),
    Certificate(CertificateMsg),
    ClientKeyExchange(ClientKeyExchange),
    CertificateVerify(CertificateVerify),
    NextProtocol(NextProtocol),
    ChannelId(ChannelIdMsg),
    Finished(Finished),
    /// A message type the server never receives.
    Other(HandshakeType),
}

impl HandshakeMessage {
    /// Decode one TLS-framed handshake message.
    pub fn decode(raw: &[u8], ctx: ParseContext) -> Result<HandshakeMessage, Error> {
        let (msg_type, body) = split_frame(raw)?;
        let msg = match msg_type {
            HandshakeType::ClientHello => {
                let mut hello = complete(ClientHello::parse(body, ctx.is_dtls))?;
                hello.raw = raw.to_vec();
                HandshakeMessage::ClientHello(hello)
            }
            HandshakeType::Certificate => {
                HandshakeMessage::Certificate(complete(CertificateMsg::parse(body))?)
            }
            HandshakeType::ClientKeyExchange => {
                HandshakeMessage::ClientKeyExchange(ClientKeyExchange::from_body(body))
            }
            HandshakeType::CertificateVerify => {
                let has_sig_alg = ctx.version.map_or(false, |v| v >= ProtocolVersion::Tls12);
                HandshakeMessage::CertificateVerify(complete(CertificateVerify::parse(
                    body,
                    has_sig_alg,
                ))?)
            }
            HandshakeType::NextProtocol => {
                HandshakeMessage::NextProtocol(complete(NextProtocol::parse(body))?)
            }
            HandshakeType::ChannelId => {
                HandshakeMessage::ChannelId(complete(ChannelIdMsg::parse(body))?)
            }
            HandshakeType::Finished => HandshakeMessage::Finished(Finished::from_body(body)),
            other => HandshakeMessage::Other(other),
        };
        Ok(msg)
    }

    pub fn name(&self) -> &'static str {
        match self {
            HandshakeMessage::ClientHello(_) => "ClientHello",
            HandshakeMessage::Certificate(_) => "Certificate",
            HandshakeMessage::ClientKeyExchange(_) => "ClientKeyExchange",
            HandshakeMessage::CertificateVerify(_) => "CertificateVerify",
            HandshakeMessage::NextProtocol(_) => "NextProtocol",
            HandshakeMessage::ChannelId(_) => "ChannelID",
            HandshakeMessage::Finished(_) => "Finished",
            HandshakeMessage::Other(_) => "unexpected",
        }
    }
}

/// Split a TLS-framed message into its type and body.
pub fn split_frame(raw: &[u8]) -> Result<(HandshakeType, &[u8]), Error> {
    let (rest, (msg_type, body)) = parse_frame(raw)?;
    if !rest.is_empty() {
        return Err(Error::Decode(format!(
            "{} trailing bytes after handshake message",
            rest.len()
        )));
    }
    Ok((msg_type, body))
}

fn parse_frame(input: &[u8]) -> IResult<&[u8], (HandshakeType, &[u8])> {
    let (input, msg_type) = be_u8(input)?;
    let (input, body) = u24_vec(input)?;
    Ok((input, (HandshakeType::from_u8(msg_type), body)))
}

/// Prefix a body with the TLS handshake header.
pub fn frame(msg_type: HandshakeType, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.push(msg_type.as_u8());
    put_u24(&mut out, body.len());
    out.extend_from_slice(body);
    out
}

/// Require that a parser consumed its whole input.
pub(crate) fn complete<T>(result: IResult<&[u8], T>) -> Result<T, Error> {
    let (rest, value) = result?;
    if !rest.is_empty() {
        return Err(Error::Decode(format!(
            "{} trailing bytes in message body",
            rest.len()
        )));
    }
    Ok(value)
}

pub(crate) fn u8_vec(input: &[u8]) -> IResult<&[u8], &[u8]> {
    length_data(be_u8)(input)
}

pub(crate) fn u16_vec(input: &[u8]) -> IResult<&[u8], &[u8]> {
    length_data(be_u16)(input)
}

pub(crate) fn u24_vec(input: &[u8]) -> IResult<&[u8], &[u8]> {
    length_data(be_u24)(input)
}

/// Parse a list of u16 values, failing on an odd length.
pub(crate) fn u16_list(input: &[u8]) -> IResult<&[u8], Vec<u16>> {
    if input.len() % 2 != 0 {
        return Err(Err::Failure(NomError::new(input, ErrorKind::LengthValue)));
    }
    let mut out = Vec::with_capacity(input.len() / 2);
    let mut rest = input;
    while !rest.is_empty() {
        let (r, v) = be_u16(rest)?;
        out.push(v);
        rest = r;
    }
    Ok((rest, out))
}

pub(crate) fn session_id(input: &[u8]) -> IResult<&[u8], SessionId> {
    let (input, len) = be_u8(input)?;
    if len > 32 {
        return Err(Err::Failure(NomError::new(input, ErrorKind::LengthValue)));
    }
    let (input, bytes) = take(len)(input)?;
    let mut id = SessionId::new();
    id.extend_from_slice(bytes);
    Ok((input, id))
}

pub(crate) fn random(input: &[u8]) -> IResult<&[u8], [u8; 32]> {
    let (input, bytes) = take(32usize)(input)?;
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    Ok((input, out))
}

pub(crate) fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_u24(out: &mut Vec<u8>, v: usize) {
    out.extend_from_slice(&(v as u32).to_be_bytes()[1..]);
}

pub(crate) fn put_u8_vec(out: &mut Vec<u8>, data: &[u8]) {
    out.push(data.len() as u8);
    out.extend_from_slice(data);
}

pub(crate) fn put_u16_vec(out: &mut Vec<u8>, data: &[u8]) {
    put_u16(out, data.len() as u16);
    out.extend_from_slice(data);
}

pub(crate) fn put_u24_vec(out: &mut Vec<u8>, data: &[u8]) {
    put_u24(out, data.len());
    out.extend_from_slice(data);
}

/// Append one extension: `type | u16 length | data`.
pub(crate) fn put_extension(out: &mut Vec<u8>, ext_type: u16, data: &[u8]) {
    put_u16(out, ext_type);
    put_u16_vec(out, data);
}

/// Iterate `type | u16-len data` extension blocks.
pub(crate) fn parse_extension_block(input: &[u8]) -> IResult<&[u8], Vec<(u16, &[u8])>> {
    let mut out = Vec::new();
    let mut rest = input;
    while !rest.is_empty() {
        let (r, ext_type) = be_u16(rest)?;
        let (r, data) = u16_vec(r)?;
        out.push((ext_type, data));
        rest = r;
    }
    Ok((rest, out))
}
