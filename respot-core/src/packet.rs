use std::fmt::Debug;

use bytes::{Bytes, BytesMut};

use crate::error::RespotError;
use crate::header::{HEADER_SIZE, PacketHeader};
use crate::message::PacketType;

/// Largest payload the 16-bit length prefix can describe.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Largest encoded frame (header + payload).
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// One access-point packet: a command byte and its payload.
///
/// The command byte is kept raw so that packets for services this crate
/// does not know about still decode and can be passed on.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    cmd: u8,
    payload: Bytes,
}

impl Packet {
    pub fn new(packet_type: PacketType, payload: impl Into<Bytes>) -> Result<Self, RespotError> {
        Self::from_raw(packet_type as u8, payload)
    }

    pub fn from_raw(cmd: u8, payload: impl Into<Bytes>) -> Result<Self, RespotError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(RespotError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self { cmd, payload })
    }

    pub fn cmd(&self) -> u8 {
        self.cmd
    }

    pub fn packet_type(&self) -> Result<PacketType, RespotError> {
        PacketType::try_from(self.cmd)
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_parts(self) -> (u8, Bytes) {
        (self.cmd, self.payload)
    }

    pub fn header(&self) -> PacketHeader {
        // from_raw bounds the payload to u16::MAX
        PacketHeader::new(self.cmd, self.payload.len() as u16)
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Append the wire form of this packet to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.extend_from_slice(&self.header().to_bytes());
        dst.extend_from_slice(&self.payload);
    }
}

impl Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Packet");
        match self.packet_type() {
            Ok(t) => s.field("type", &t),
            Err(_) => s.field("cmd", &format_args!("{:#04x}", self.cmd)),
        };
        s.field("payload_len", &self.payload.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_payload_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let err = Packet::new(PacketType::StreamChunkRes, payload).unwrap_err();
        assert!(matches!(err, RespotError::PayloadTooLarge { .. }));
    }

    #[test]
    fn unknown_command_is_kept_raw() {
        let packet = Packet::from_raw(0xee, Bytes::from_static(b"x")).unwrap();
        assert_eq!(packet.cmd(), 0xee);
        assert!(packet.packet_type().is_err());
    }

    #[test]
    fn write_to_prefixes_header() {
        let packet = Packet::new(PacketType::AesKey, Bytes::from_static(b"abc")).unwrap();
        let mut dst = BytesMut::new();
        packet.write_to(&mut dst);
        assert_eq!(&dst[..], &[0x0d, 0x00, 0x03, b'a', b'b', b'c']);
        assert_eq!(packet.encoded_len(), 6);
    }
}
