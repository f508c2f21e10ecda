use bytes::{Bytes, BytesMut};

use crate::error::RespotError;
use crate::protocol::CHUNK_SIZE_BYTES;

/// Reassembled ciphertext of one file, held as fixed-size chunks.
///
/// The advertised size is a multiple of four; the final chunk may fall up
/// to three bytes short of it, in which case the size shrinks to match.
#[derive(Debug)]
pub struct ChunkStore {
    size: u64,
    chunks: Vec<Option<Bytes>>,
}

impl ChunkStore {
    pub fn new(size: u64) -> Self {
        let count = size.div_ceil(CHUNK_SIZE_BYTES as u64) as usize;
        Self {
            size,
            chunks: vec![None; count],
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn expected_len(&self, index: usize) -> usize {
        let start = index as u64 * CHUNK_SIZE_BYTES as u64;
        (self.size - start).min(CHUNK_SIZE_BYTES as u64) as usize
    }

    /// Store chunk `index`. A chunk that is already present is kept.
    pub fn insert(&mut self, index: usize, data: Bytes) -> Result<(), RespotError> {
        if index >= self.chunks.len() {
            return Err(RespotError::ProtocolViolation("chunk index beyond file size"));
        }
        let expected = self.expected_len(index);
        let last = index + 1 == self.chunks.len();
        let fits = if last {
            data.len() <= expected && data.len() + 3 >= expected
        } else {
            data.len() == expected
        };
        if !fits {
            return Err(RespotError::Truncated {
                what: "audio chunk",
                expected,
                actual: data.len(),
            });
        }

        if self.chunks[index].is_some() {
            return Ok(());
        }
        if last {
            self.size -= (expected - data.len()) as u64;
        }
        self.chunks[index] = Some(data);
        Ok(())
    }

    pub fn has_chunk(&self, index: usize) -> bool {
        self.chunks.get(index).is_some_and(Option::is_some)
    }

    /// Indices still waiting for data.
    pub fn missing(&self) -> impl Iterator<Item = usize> + '_ {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_none())
            .map(|(i, _)| i)
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(Option::is_some)
    }

    /// Copy `len` bytes starting at `offset`. Every chunk touched by the
    /// range must be present.
    pub fn read(&self, offset: u64, len: usize) -> Result<Bytes, RespotError> {
        let unavailable = || RespotError::RangeUnavailable { offset, len };
        let end = offset.checked_add(len as u64).ok_or_else(unavailable)?;
        if end > self.size {
            return Err(unavailable());
        }

        let chunk = CHUNK_SIZE_BYTES as u64;
        let mut out = BytesMut::with_capacity(len);
        let mut pos = offset;
        while pos < end {
            let index = (pos / chunk) as usize;
            let data = self.chunks[index].as_ref().ok_or_else(unavailable)?;
            let from = (pos % chunk) as usize;
            let to = ((end - index as u64 * chunk).min(chunk) as usize).min(data.len());
            out.extend_from_slice(&data[from..to]);
            pos = index as u64 * chunk + to as u64;
        }
        Ok(out.freeze())
    }
}
