use crate::{DecodingError, EncodingError};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Length of the little-endian size prefix that precedes every packet.
pub const SIZE_FIELD_LEN: usize = 4;

/// Smallest legal size value: id + type + body NUL + terminator NUL.
pub const MIN_PACKET_SIZE: u32 = 10;

/// Conventional ceiling for the size field of packets we send.
pub const MAX_PACKET_SIZE: u32 = 4096;

/// Largest body that fits under [`MAX_PACKET_SIZE`].
pub const MAX_BODY_LEN: usize = (MAX_PACKET_SIZE - MIN_PACKET_SIZE) as usize;

/// Where a session is in its conversation with the server.
///
/// The wire value `2` means `AUTH_RESPONSE` while authenticating and
/// `EXEC_COMMAND` afterwards, so a type code can only be interpreted
/// together with the phase it was received in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Authenticating,
    Executing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Auth,
    AuthResponse,
    ExecCommand,
    ResponseValue,
}

impl PacketType {
    pub const fn code(self) -> i32 {
        match self {
            PacketType::Auth => 3,
            PacketType::AuthResponse => 2,
            PacketType::ExecCommand => 2,
            PacketType::ResponseValue => 0,
        }
    }

    /// Interprets a wire type code in the context of a protocol phase.
    pub fn classify(code: i32, phase: Phase) -> Option<PacketType> {
        match (code, phase) {
            (3, _) => Some(PacketType::Auth),
            (2, Phase::Authenticating) => Some(PacketType::AuthResponse),
            (2, Phase::Executing) => Some(PacketType::ExecCommand),
            (0, _) => Some(PacketType::ResponseValue),
            _ => None,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketType::Auth => "AUTH",
            PacketType::AuthResponse => "AUTH_RESPONSE",
            PacketType::ExecCommand => "EXEC_COMMAND",
            PacketType::ResponseValue => "RESPONSE_VALUE",
        };
        f.write_str(name)
    }
}

/// One framed unit of the RCON wire protocol.
///
/// Layout: `size:u32le | id:i32le | type:i32le | body | 0x00 | 0x00`, where
/// `size` counts every byte after itself.
///
/// Outbound packets can only be built through [`Packet::new`] or
/// [`Packet::empty`], so anything handed to the encoder is wire-safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    id: i32,
    kind: i32,
    body: Bytes,
}

impl Packet {
    /// Builds an outbound packet, rejecting bodies the wire cannot carry.
    pub fn new(id: i32, kind: PacketType, body: impl Into<Bytes>) -> Result<Self, EncodingError> {
        let body = body.into();

        if let Some(offset) = body.iter().position(|b| *b == 0) {
            return Err(EncodingError::EmbeddedNul(offset));
        }

        if body.len() > MAX_BODY_LEN {
            return Err(EncodingError::BodyTooLarge {
                len: body.len(),
                max: MAX_BODY_LEN,
            });
        }

        Ok(Self {
            id,
            kind: kind.code(),
            body,
        })
    }

    pub fn empty(id: i32, kind: PacketType) -> Self {
        Self {
            id,
            kind: kind.code(),
            body: Bytes::new(),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// Raw type code; see [`Packet::packet_type`].
    pub fn kind(&self) -> i32 {
        self.kind
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Value of the size field for this packet.
    pub fn size(&self) -> u32 {
        (self.body.len() + MIN_PACKET_SIZE as usize) as u32
    }

    pub fn packet_type(&self, phase: Phase) -> Option<PacketType> {
        PacketType::classify(self.kind, phase)
    }

    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(SIZE_FIELD_LEN + self.size() as usize);
        dst.put_u32_le(self.size());
        dst.put_i32_le(self.id);
        dst.put_i32_le(self.kind);
        dst.put_slice(&self.body);
        dst.put_u8(0);
        dst.put_u8(0);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Parses exactly one complete packet, size prefix included.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodingError> {
        if buf.len() < SIZE_FIELD_LEN {
            return Err(DecodingError::Truncated(buf.len()));
        }

        let declared = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if declared < MIN_PACKET_SIZE {
            return Err(DecodingError::SizeTooSmall(declared));
        }

        let payload = &buf[SIZE_FIELD_LEN..];
        if payload.len() != declared as usize {
            return Err(DecodingError::SizeMismatch {
                declared,
                available: buf.len(),
            });
        }

        Self::decode_payload(payload)
    }

    /// Parses the bytes that follow the size prefix.
    ///
    /// The caller has already read exactly `size` bytes; `payload.len()` is
    /// taken as the declared size.
    pub fn decode_payload(payload: &[u8]) -> Result<Self, DecodingError> {
        if payload.len() < MIN_PACKET_SIZE as usize {
            return Err(DecodingError::SizeTooSmall(payload.len() as u32));
        }

        let (header, rest) = payload.split_at(8);
        let (body, terminator) = rest.split_at(rest.len() - 2);
        if terminator != [0, 0] {
            return Err(DecodingError::MissingTerminator);
        }

        Ok(Self {
            id: i32::from_le_bytes([header[0], header[1], header[2], header[3]]),
            kind: i32::from_le_bytes([header[4], header[5], header[6], header[7]]),
            body: Bytes::copy_from_slice(body),
        })
    }
}
