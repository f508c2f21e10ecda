use bytes::{Buf, BytesMut};

use crate::error::RespotError;
use crate::header::{HEADER_SIZE, PacketHeader};
use crate::packet::Packet;

/// Framing for the plaintext access-point transport:
/// `cmd u8 || len u16 BE || payload[len]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCodec;

impl tokio_util::codec::Decoder for PacketCodec {
    type Item = Packet;
    type Error = RespotError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = PacketHeader::from_bytes(&src[..HEADER_SIZE])?;
        let frame_len = HEADER_SIZE + header.payload_length();
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len);
        frame.advance(HEADER_SIZE);
        Packet::from_raw(header.cmd(), frame.freeze()).map(Some)
    }
}

impl tokio_util::codec::Encoder<Packet> for PacketCodec {
    type Error = RespotError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write_to(dst);
        Ok(())
    }
}
