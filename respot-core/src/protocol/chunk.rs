//! Stream-chunk channel frames.
//!
//! # Wire Protocol
//!
//! ```text
//! Client ──[StreamChunk]─────────────────────► AP
//!   Payload: channel u16 BE || 00 01 0000 00000000 00009c40 00020000
//!            || file_id[20] || start u32 BE || end u32 BE
//!
//! AP     ──[StreamChunkRes]──────────────────► Client   (header phase)
//!   Payload: channel u16 BE || { len u16 BE || id u8 || data[len-1] }* || 0000
//!
//! AP     ──[StreamChunkRes]──────────────────► Client   (repeated)
//!   Payload: channel u16 BE || data
//!
//! AP     ──[StreamChunkRes]──────────────────► Client   (terminator)
//!   Payload: channel u16 BE
//!
//! AP     ──[ChannelError]────────────────────► Client   (instead of data)
//!   Payload: channel u16 BE || code u16 BE
//! ```
//!
//! `start` and `end` are counted in 4-byte words.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::RespotError;
use crate::protocol::ids::FileId;

/// Words per chunk request.
pub const CHUNK_SIZE_WORDS: u32 = 0x8000;

/// Bytes per chunk request (128 KiB).
pub const CHUNK_SIZE_BYTES: usize = CHUNK_SIZE_WORDS as usize * 4;

/// Header id carrying the total file size, in words.
pub const HEADER_FILE_SIZE: u8 = 0x03;

fn read_channel_id(data: &[u8], what: &'static str, expected: usize) -> Result<u16, RespotError> {
    if data.len() < expected {
        return Err(RespotError::Truncated {
            what,
            expected,
            actual: data.len(),
        });
    }
    Ok(u16::from_be_bytes([data[0], data[1]]))
}

/// Word range `[start, end)` of chunk `index`, if it is addressable.
pub fn chunk_word_range(index: u32) -> Option<(u32, u32)> {
    let start = index.checked_mul(CHUNK_SIZE_WORDS)?;
    let end = index.checked_add(1)?.checked_mul(CHUNK_SIZE_WORDS)?;
    Some((start, end))
}

// ── ChunkRequest ──────────────────────────────────────────────────

/// Request for a word range of a file on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRequest {
    pub channel_id: u16,
    pub file_id: FileId,
    pub start_word: u32,
    pub end_word: u32,
}

impl ChunkRequest {
    /// Encoded size on the wire.
    pub const SIZE: usize = 2 + 1 + 1 + 2 + 4 + 4 + 4 + FileId::SIZE + 4 + 4;

    /// Request covering chunk `index` of the file.
    ///
    /// Fails if the chunk's word range does not fit the 32-bit fields.
    pub fn for_chunk(channel_id: u16, file_id: FileId, index: u32) -> Result<Self, RespotError> {
        let (start_word, end_word) = chunk_word_range(index)
            .ok_or(RespotError::ProtocolViolation("chunk index beyond addressable range"))?;
        Ok(Self {
            channel_id,
            file_id,
            start_word,
            end_word,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u16(self.channel_id);
        buf.put_u8(0x00);
        buf.put_u8(0x01);
        buf.put_u16(0x0000);
        buf.put_u32(0x0000_0000);
        buf.put_u32(0x0000_9c40);
        buf.put_u32(0x0002_0000);
        buf.put_slice(self.file_id.as_bytes());
        buf.put_u32(self.start_word);
        buf.put_u32(self.end_word);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, RespotError> {
        let channel_id = read_channel_id(data, "chunk request", Self::SIZE)?;
        let mut rest = &data[18..];
        let file_id = FileId::from_slice(&rest[..FileId::SIZE])?;
        rest.advance(FileId::SIZE);
        Ok(Self {
            channel_id,
            file_id,
            start_word: rest.get_u32(),
            end_word: rest.get_u32(),
        })
    }

    /// Byte range `[start, end)` covered by this request.
    pub fn byte_range(&self) -> (u64, u64) {
        (self.start_word as u64 * 4, self.end_word as u64 * 4)
    }
}

// ── ChunkResponse ─────────────────────────────────────────────────

/// One inbound fragment on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResponse {
    pub channel_id: u16,
    pub payload: Bytes,
}

impl ChunkResponse {
    pub fn encode(channel_id: u16, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + payload.len());
        buf.put_u16(channel_id);
        buf.put_slice(payload);
        buf.freeze()
    }

    pub fn decode(mut data: Bytes) -> Result<Self, RespotError> {
        let channel_id = read_channel_id(&data, "chunk response", 2)?;
        data.advance(2);
        Ok(Self {
            channel_id,
            payload: data,
        })
    }

    /// A zero-length payload ends the channel.
    pub fn is_terminator(&self) -> bool {
        self.payload.is_empty()
    }
}

// ── ChannelErrorFrame ─────────────────────────────────────────────

/// Server-side failure of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelErrorFrame {
    pub channel_id: u16,
    pub code: u16,
}

impl ChannelErrorFrame {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_u16(self.channel_id);
        buf.put_u16(self.code);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, RespotError> {
        let channel_id = read_channel_id(data, "channel error", 4)?;
        Ok(Self {
            channel_id,
            code: u16::from_be_bytes([data[2], data[3]]),
        })
    }
}

// ── Header records ────────────────────────────────────────────────

/// A `len || id || data` record from the header phase of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    pub id: u8,
    pub data: Bytes,
}

impl HeaderRecord {
    pub fn new(id: u8, data: impl Into<Bytes>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }

    /// File size header, value in bytes.
    pub fn file_size(size_bytes: u64) -> Self {
        let words = size_bytes.div_ceil(4) as u32;
        Self::new(HEADER_FILE_SIZE, Bytes::copy_from_slice(&words.to_be_bytes()))
    }

    /// Interpret a [`HEADER_FILE_SIZE`] record, returning the size in bytes.
    pub fn as_file_size(&self) -> Option<u64> {
        if self.id != HEADER_FILE_SIZE || self.data.len() < 4 {
            return None;
        }
        let words = u32::from_be_bytes([self.data[0], self.data[1], self.data[2], self.data[3]]);
        Some(words as u64 * 4)
    }

    /// Encode a complete header block, including the zero-length end marker.
    pub fn encode_block(records: &[HeaderRecord]) -> Bytes {
        let mut buf = BytesMut::new();
        for record in records {
            buf.put_u16(record.data.len() as u16 + 1);
            buf.put_u8(record.id);
            buf.put_slice(&record.data);
        }
        buf.put_u16(0);
        buf.freeze()
    }
}

/// Result of parsing one header-phase fragment.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    pub records: Vec<HeaderRecord>,
    /// The zero-length end marker was seen.
    pub ended: bool,
    /// Bytes following the end marker in the same fragment.
    pub trailing: Bytes,
}

/// Parse header records out of one fragment.
///
/// Records never span fragments. A fragment may end the header phase and
/// carry data after the marker, which is returned in `trailing`.
pub fn parse_header_block(mut data: Bytes) -> Result<HeaderBlock, RespotError> {
    let mut block = HeaderBlock::default();
    while data.has_remaining() {
        if data.len() < 2 {
            return Err(RespotError::ProtocolViolation("dangling header length"));
        }
        let length = data.get_u16() as usize;
        if length == 0 {
            block.ended = true;
            block.trailing = data;
            return Ok(block);
        }
        if data.len() < length {
            return Err(RespotError::ProtocolViolation("header record overruns fragment"));
        }
        let id = data.get_u8();
        let record = data.split_to(length - 1);
        block.records.push(HeaderRecord::new(id, record));
    }
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_request_layout() {
        let req = ChunkRequest::for_chunk(0x0102, FileId::new([0xab; 20]), 2).unwrap();
        let bytes = req.encode();
        assert_eq!(bytes.len(), ChunkRequest::SIZE);
        assert_eq!(&bytes[0..2], &[0x01, 0x02]);
        assert_eq!(&bytes[2..18], &[
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x9c, 0x40, 0x00, 0x02,
            0x00, 0x00
        ]);
        assert_eq!(&bytes[18..38], &[0xab; 20]);
        assert_eq!(&bytes[38..42], &0x10000u32.to_be_bytes());
        assert_eq!(&bytes[42..46], &0x18000u32.to_be_bytes());

        let decoded = ChunkRequest::decode(&bytes).unwrap();
        assert_eq!(decoded, req);
        assert_eq!(decoded.byte_range(), (0x40000, 0x60000));
    }

    #[test]
    fn last_addressable_chunk() {
        // A file of u32::MAX words has 131072 chunks; the last one ends one
        // word past what a u32 end field can hold.
        let last = (u32::MAX as u64).div_ceil(CHUNK_SIZE_WORDS as u64) as u32 - 1;
        assert_eq!(last, 131_071);
        assert!(chunk_word_range(last).is_none());
        assert!(matches!(
            ChunkRequest::for_chunk(0, FileId::new([0; 20]), last),
            Err(RespotError::ProtocolViolation(_))
        ));
        assert_eq!(
            chunk_word_range(last - 1),
            Some((last * CHUNK_SIZE_WORDS - CHUNK_SIZE_WORDS, last * CHUNK_SIZE_WORDS))
        );
    }

    #[test]
    fn chunk_response_splits_channel_id() {
        let resp = ChunkResponse::decode(Bytes::from_static(&[0x00, 0x07, b'A', b'B'])).unwrap();
        assert_eq!(resp.channel_id, 7);
        assert_eq!(&resp.payload[..], b"AB");
        assert!(!resp.is_terminator());

        let end = ChunkResponse::decode(Bytes::from_static(&[0x00, 0x07])).unwrap();
        assert!(end.is_terminator());

        assert!(ChunkResponse::decode(Bytes::from_static(&[0x00])).is_err());
    }

    #[test]
    fn header_block_parses_until_marker() {
        let block = HeaderRecord::encode_block(&[
            HeaderRecord::file_size(1000),
            HeaderRecord::new(0x07, Bytes::from_static(b"xy")),
        ]);
        let parsed = parse_header_block(block).unwrap();
        assert!(parsed.ended);
        assert!(parsed.trailing.is_empty());
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].as_file_size(), Some(1000));
        assert_eq!(parsed.records[1].id, 0x07);
        assert_eq!(&parsed.records[1].data[..], b"xy");
    }

    #[test]
    fn header_block_without_marker_stays_open() {
        let mut buf = BytesMut::new();
        buf.put_u16(2);
        buf.put_u8(0x01);
        buf.put_u8(0xff);
        let parsed = parse_header_block(buf.freeze()).unwrap();
        assert!(!parsed.ended);
        assert_eq!(parsed.records.len(), 1);
    }

    #[test]
    fn overrunning_record_rejected() {
        let data = Bytes::from_static(&[0x00, 0x09, 0x03, 0x00]);
        assert!(parse_header_block(data).is_err());
    }

    #[test]
    fn channel_error_needs_code() {
        let frame = ChannelErrorFrame::decode(&[0x00, 0x03, 0x00, 0x01]).unwrap();
        assert_eq!(frame, ChannelErrorFrame { channel_id: 3, code: 1 });
        assert!(ChannelErrorFrame::decode(&[0x00, 0x03]).is_err());
    }
}
