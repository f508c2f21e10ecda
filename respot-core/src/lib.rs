//! # respot-core
//!
//! Channel-multiplexed download engine for encrypted audio files.
//!
//! This crate contains:
//! - **Protocol types**: `PacketHeader`, `Packet`, `PacketType`, and the key
//!   and chunk payloads in [`protocol`]
//! - **Codec**: `PacketCodec` for framed TCP I/O via `tokio_util`
//! - **Network**: `Connection` and the `Transport` seam the player sends on
//! - **Player**: the dispatcher correlating key requests by sequence number
//!   and chunk streams by channel id
//! - **Channel**: per-download fragment reassembly state machine
//! - **Audio**: `AudioFile`, chunk store and AES-CTR payload decryption
//! - **Error**: `RespotError` and `KeyError`, typed `thiserror` hierarchies

pub mod audio;
pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod header;
pub mod message;
pub mod network;
pub mod packet;
pub mod player;
pub mod protocol;
pub mod sequence;

#[cfg(test)]
pub(crate) mod test_support;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use audio::{AudioFile, KeyState};
pub use channel::{Channel, ChannelFailure, ChannelMode, ChannelPhase, ChannelProgress};
pub use codec::PacketCodec;
pub use config::PlayerConfig;
pub use error::{KeyError, RespotError};
pub use header::{HEADER_SIZE, PacketHeader};
pub use message::PacketType;
pub use network::{Connection, ConnectionInfo, ConnectionSender, Transport};
pub use packet::{MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, Packet};
pub use player::Player;
pub use protocol::{AudioFormat, AudioKey, FileId, TrackId};
pub use sequence::{SequenceCounter, SequenceSource};
