//! Access-point packet types.
//!
//! Uses a proper enum with `TryFrom` — no panics on unknown values.

use crate::error::RespotError;
use std::fmt;

// ── PacketType ───────────────────────────────────────────────────

/// Command bytes carried in the first byte of every access-point packet.
///
/// Only the stream-chunk, channel-error and audio-key families are
/// handled by the [`Player`](crate::player::Player); the rest belong to
/// sibling protocol handlers and are listed so that routing over them is
/// exhaustive.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    // ── Session ──────────────────────────────────────────────────
    SecretBlock = 0x02,
    Ping = 0x04,
    Pong = 0x49,
    PongAck = 0x4a,
    Pause = 0x4b,
    CountryCode = 0x1b,
    ProductInfo = 0x50,
    LegacyWelcome = 0x69,
    LicenseVersion = 0x76,
    Login = 0xab,
    ApWelcome = 0xac,
    AuthFailure = 0xad,

    // ── Channels (0x08..0x0b) ────────────────────────────────────
    /// Chunk request, tagged with a channel id.
    StreamChunk = 0x08,
    /// Chunk response fragment, tagged with a channel id.
    StreamChunkRes = 0x09,
    /// Server-side failure of a channel.
    ChannelError = 0x0a,
    /// Server-side abort of a channel.
    ChannelAbort = 0x0b,

    // ── Audio keys (0x0c..0x0e) ──────────────────────────────────
    /// Key request, tagged with a sequence number.
    RequestKey = 0x0c,
    /// Key response.
    AesKey = 0x0d,
    /// Key denied.
    AesKeyError = 0x0e,

    // ── Other services ───────────────────────────────────────────
    Image = 0x19,
    MercuryReq = 0xb2,
    MercurySub = 0xb3,
    MercuryUnsub = 0xb4,
    MercuryEvent = 0xb5,
}

impl TryFrom<u8> for PacketType {
    type Error = RespotError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x02 => Ok(PacketType::SecretBlock),
            0x04 => Ok(PacketType::Ping),
            0x49 => Ok(PacketType::Pong),
            0x4a => Ok(PacketType::PongAck),
            0x4b => Ok(PacketType::Pause),
            0x1b => Ok(PacketType::CountryCode),
            0x50 => Ok(PacketType::ProductInfo),
            0x69 => Ok(PacketType::LegacyWelcome),
            0x76 => Ok(PacketType::LicenseVersion),
            0xab => Ok(PacketType::Login),
            0xac => Ok(PacketType::ApWelcome),
            0xad => Ok(PacketType::AuthFailure),

            0x08 => Ok(PacketType::StreamChunk),
            0x09 => Ok(PacketType::StreamChunkRes),
            0x0a => Ok(PacketType::ChannelError),
            0x0b => Ok(PacketType::ChannelAbort),

            0x0c => Ok(PacketType::RequestKey),
            0x0d => Ok(PacketType::AesKey),
            0x0e => Ok(PacketType::AesKeyError),

            0x19 => Ok(PacketType::Image),
            0xb2 => Ok(PacketType::MercuryReq),
            0xb3 => Ok(PacketType::MercurySub),
            0xb4 => Ok(PacketType::MercuryUnsub),
            0xb5 => Ok(PacketType::MercuryEvent),

            _ => Err(RespotError::UnknownVariant {
                type_name: "PacketType",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:#04x})", self, *self as u8)
    }
}

impl PacketType {
    /// Returns `true` for the response types routed by the player.
    pub fn is_player_bound(&self) -> bool {
        matches!(
            self,
            PacketType::StreamChunkRes
                | PacketType::ChannelError
                | PacketType::AesKey
                | PacketType::AesKeyError
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_type_roundtrip() {
        let types = [
            PacketType::SecretBlock,
            PacketType::Ping,
            PacketType::Pong,
            PacketType::PongAck,
            PacketType::Pause,
            PacketType::CountryCode,
            PacketType::ProductInfo,
            PacketType::LegacyWelcome,
            PacketType::LicenseVersion,
            PacketType::Login,
            PacketType::ApWelcome,
            PacketType::AuthFailure,
            PacketType::StreamChunk,
            PacketType::StreamChunkRes,
            PacketType::ChannelError,
            PacketType::ChannelAbort,
            PacketType::RequestKey,
            PacketType::AesKey,
            PacketType::AesKeyError,
            PacketType::Image,
            PacketType::MercuryReq,
            PacketType::MercurySub,
            PacketType::MercuryUnsub,
            PacketType::MercuryEvent,
        ];
        for t in types {
            assert_eq!(PacketType::try_from(t as u8).unwrap(), t);
        }
    }

    #[test]
    fn packet_type_invalid() {
        assert!(PacketType::try_from(0xff).is_err());
    }

    #[test]
    fn player_bound_types() {
        assert!(PacketType::AesKey.is_player_bound());
        assert!(PacketType::StreamChunkRes.is_player_bound());
        assert!(!PacketType::RequestKey.is_player_bound());
        assert!(!PacketType::Ping.is_player_bound());
    }

    #[test]
    fn display_includes_byte() {
        assert_eq!(PacketType::AesKey.to_string(), "AesKey(0x0d)");
    }
}
