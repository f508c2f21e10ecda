//! Sub-protocol payload definitions for the download engine.
//!
//! Each sub-module defines the binary request/response payloads for one
//! correlation namespace: audio keys (by sequence number) and stream
//! chunks (by channel id). Payloads are carried inside [`Packet`] bodies.
//!
//! [`Packet`]: crate::packet::Packet

pub mod chunk;
pub mod ids;
pub mod key;

pub use chunk::{
    CHUNK_SIZE_BYTES, CHUNK_SIZE_WORDS, ChannelErrorFrame, ChunkRequest, ChunkResponse,
    HEADER_FILE_SIZE, HeaderBlock, HeaderRecord, chunk_word_range, parse_header_block,
};
pub use ids::{AudioFormat, AudioKey, FileId, TrackId};
pub use key::{KeyErrorFrame, KeyRequest, KeyResponse};
