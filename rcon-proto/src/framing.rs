use crate::{DecodingError, Packet, ProtocolError, Result, MAX_PACKET_SIZE, MIN_PACKET_SIZE, SIZE_FIELD_LEN};
use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

/// Default ceiling for the size field of packets we accept: a full
/// 4096-byte body plus framing.
pub const DEFAULT_MAX_PACKET_SIZE: u32 = MAX_PACKET_SIZE + MIN_PACKET_SIZE;

/// Checks a declared size against the accepted range.
pub fn validate_size(declared: u32, max_packet_size: u32) -> std::result::Result<(), DecodingError> {
    if declared < MIN_PACKET_SIZE {
        return Err(DecodingError::SizeTooSmall(declared));
    }

    if declared > max_packet_size {
        warn!("Received oversized packet: {} bytes (max: {})", declared, max_packet_size);
        return Err(DecodingError::SizeTooLarge(declared, max_packet_size));
    }

    Ok(())
}

/// Codec for use with tokio_util::codec::Framed
#[derive(Debug, Clone)]
pub struct RconCodec {
    max_packet_size: u32,
}

impl RconCodec {
    pub fn new(max_packet_size: u32) -> Self {
        Self { max_packet_size }
    }
}

impl Default for RconCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PACKET_SIZE)
    }
}

impl tokio_util::codec::Decoder for RconCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < SIZE_FIELD_LEN {
            return Ok(None);
        }

        // Peek at size without consuming
        let size = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        validate_size(size, self.max_packet_size)?;

        let frame_len = SIZE_FIELD_LEN + size as usize;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(SIZE_FIELD_LEN);
        let payload = src.split_to(size as usize);
        let packet = Packet::decode_payload(&payload)?;

        debug!("Decoded packet id={} type={} ({} body bytes)", packet.id(), packet.kind(), packet.body().len());

        Ok(Some(packet))
    }
}

impl tokio_util::codec::Encoder<Packet> for RconCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        debug!("Encoding packet id={} type={} ({} body bytes)", item.id(), item.kind(), item.body().len());
        item.encode_into(dst);
        Ok(())
    }
}
