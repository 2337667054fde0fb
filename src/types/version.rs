use std::fmt;

/// Protocol versions in TLS numbering.
///
/// DTLS reuses the TLS semantics of the version it is based on. DTLS 1.0 is
/// negotiated as [`ProtocolVersion::Tls10`] and DTLS 1.2 as
/// [`ProtocolVersion::Tls12`]; only the wire encoding differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolVersion {
    Ssl30,
    Tls10,
    Tls11,
    Tls12,
    /// Only ever used as a configured maximum to trigger the downgrade sentinel.
    Tls13,
}

const DTLS10_WIRE: u16 = 0xfeff;
const DTLS12_WIRE: u16 = 0xfefd;

impl ProtocolVersion {
    /// All versions, oldest first.
    pub const ALL: &'static [ProtocolVersion] = &[
        ProtocolVersion::Ssl30,
        ProtocolVersion::Tls10,
        ProtocolVersion::Tls11,
        ProtocolVersion::Tls12,
        ProtocolVersion::Tls13,
    ];

    pub fn as_u16(&self) -> u16 {
        match self {
            ProtocolVersion::Ssl30 => 0x0300,
            ProtocolVersion::Tls10 => 0x0301,
            ProtocolVersion::Tls11 => 0x0302,
            ProtocolVersion::Tls12 => 0x0303,
            ProtocolVersion::Tls13 => 0x0304,
        }
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0300 => Some(ProtocolVersion::Ssl30),
            0x0301 => Some(ProtocolVersion::Tls10),
            0x0302 => Some(ProtocolVersion::Tls11),
            0x0303 => Some(ProtocolVersion::Tls12),
            0x0304 => Some(ProtocolVersion::Tls13),
            _ => None,
        }
    }

    /// The version as it appears in a ServerHello or HelloVerifyRequest.
    pub fn to_wire(&self, is_dtls: bool) -> u16 {
        if !is_dtls {
            return self.as_u16();
        }
        match self {
            ProtocolVersion::Ssl30 | ProtocolVersion::Tls10 | ProtocolVersion::Tls11 => DTLS10_WIRE,
            ProtocolVersion::Tls12 | ProtocolVersion::Tls13 => DTLS12_WIRE,
        }
    }

    /// Whether the version has a datagram counterpart.
    pub fn is_valid_for(&self, is_dtls: bool) -> bool {
        !is_dtls || matches!(self, ProtocolVersion::Tls10 | ProtocolVersion::Tls12)
    }
}

/// Maps a ClientHello wire version onto TLS numbering so versions compare.
///
/// DTLS versions count down on the wire. Anything newer than DTLS 1.2 is
/// mapped above TLS 1.2, anything that is not a DTLS version maps to 0.
pub fn wire_to_tls(wire: u16, is_dtls: bool) -> u16 {
    if !is_dtls {
        return wire;
    }
    match wire {
        DTLS10_WIRE | 0xfefe => 0x0301,
        DTLS12_WIRE => 0x0303,
        0xfe00..=0xfefc => 0x0304,
        _ => 0,
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtocolVersion::Ssl30 => "SSL 3.0",
            ProtocolVersion::Tls10 => "TLS 1.0",
            ProtocolVersion::Tls11 => "TLS 1.1",
            ProtocolVersion::Tls12 => "TLS 1.2",
            ProtocolVersion::Tls13 => "TLS 1.3",
        };
        write!(f, "{}", s)
    }
}
