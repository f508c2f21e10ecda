//! Audio key exchange frames.
//!
//! # Wire Protocol
//!
//! ```text
//! Client ──[RequestKey]──────────────────────► AP
//!   Payload: sequence u32 BE || track_id[16] || file_id[20] || 0x0000
//!
//! AP     ──[AesKey]──────────────────────────► Client
//!   Payload: sequence u32 BE || key[16]
//!
//! AP     ──[AesKeyError]─────────────────────► Client
//!   Payload: sequence u32 BE || code u16 BE (code may be absent)
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::RespotError;
use crate::protocol::ids::{AudioKey, FileId, TrackId};

fn read_sequence(data: &[u8], what: &'static str, expected: usize) -> Result<u32, RespotError> {
    if data.len() < expected {
        return Err(RespotError::Truncated {
            what,
            expected,
            actual: data.len(),
        });
    }
    Ok(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
}

// ── KeyRequest ────────────────────────────────────────────────────

/// Outbound request for the key of one file of one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRequest {
    pub sequence: u32,
    pub track_id: TrackId,
    pub file_id: FileId,
}

impl KeyRequest {
    /// Encoded size on the wire.
    pub const SIZE: usize = 4 + TrackId::SIZE + FileId::SIZE + 2;

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u32(self.sequence);
        buf.put_slice(self.track_id.as_bytes());
        buf.put_slice(self.file_id.as_bytes());
        buf.put_u16(0x0000);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, RespotError> {
        let sequence = read_sequence(data, "key request", Self::SIZE)?;
        Ok(Self {
            sequence,
            track_id: TrackId::from_slice(&data[4..20])?,
            file_id: FileId::from_slice(&data[20..40])?,
        })
    }
}

// ── KeyResponse ───────────────────────────────────────────────────

/// A key delivered for an outstanding sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyResponse {
    pub sequence: u32,
    pub key: AudioKey,
}

impl KeyResponse {
    /// Encoded size on the wire. Trailing bytes are ignored on decode.
    pub const SIZE: usize = 4 + AudioKey::SIZE;

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u32(self.sequence);
        buf.put_slice(self.key.as_bytes());
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, RespotError> {
        let sequence = read_sequence(data, "key response", Self::SIZE)?;
        Ok(Self {
            sequence,
            key: AudioKey::from_slice(&data[4..Self::SIZE])?,
        })
    }
}

// ── KeyErrorFrame ─────────────────────────────────────────────────

/// The access point refused a key request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyErrorFrame {
    pub sequence: u32,
    pub code: Option<u16>,
}

impl KeyErrorFrame {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(6);
        buf.put_u32(self.sequence);
        if let Some(code) = self.code {
            buf.put_u16(code);
        }
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, RespotError> {
        let sequence = read_sequence(data, "key error", 4)?;
        let code = data
            .get(4..6)
            .map(|code| u16::from_be_bytes([code[0], code[1]]));
        Ok(Self { sequence, code })
    }
}
