use crate::error::RespotError;

/// Size of the packet header on the wire: `cmd u8 || len u16 BE`.
pub const HEADER_SIZE: usize = 3;

pub type PacketHeaderBytes = [u8; HEADER_SIZE];

/// Fixed prefix of every access-point packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    cmd: u8,
    payload_length: u16,
}

impl PacketHeader {
    pub fn new(cmd: u8, payload_length: u16) -> Self {
        Self {
            cmd,
            payload_length,
        }
    }

    pub fn to_bytes(&self) -> PacketHeaderBytes {
        let mut header: PacketHeaderBytes = [0; HEADER_SIZE];
        header[0] = self.cmd;
        header[1..3].copy_from_slice(&self.payload_length.to_be_bytes());
        header
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RespotError> {
        if bytes.len() < HEADER_SIZE {
            return Err(RespotError::Truncated {
                what: "packet header",
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            cmd: bytes[0],
            payload_length: u16::from_be_bytes([bytes[1], bytes[2]]),
        })
    }

    pub fn cmd(&self) -> u8 {
        self.cmd
    }

    pub fn payload_length(&self) -> usize {
        self.payload_length as usize
    }
}
