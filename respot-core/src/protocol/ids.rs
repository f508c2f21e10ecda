//! Fixed-width identifiers exchanged with the access point.

use std::fmt;
use std::str::FromStr;

use crate::error::RespotError;

macro_rules! byte_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Length of the identifier on the wire.
            pub const SIZE: usize = $len;

            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, RespotError> {
                let array: [u8; $len] =
                    bytes.try_into().map_err(|_| RespotError::Truncated {
                        what: stringify!($name),
                        expected: $len,
                        actual: bytes.len(),
                    })?;
                Ok(Self(array))
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = RespotError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_slice(&hex::decode(s.trim())?)
            }
        }
    };
}

byte_id!(
    /// 16-byte track gid.
    TrackId,
    16
);

byte_id!(
    /// 20-byte audio file id.
    FileId,
    20
);

byte_id!(
    /// 16-byte AES key for one audio file.
    AudioKey,
    16
);

// ── AudioFormat ──────────────────────────────────────────────────

/// Encoding of an audio file as advertised by the catalog.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AudioFormat {
    OggVorbis96 = 0,
    #[default]
    OggVorbis160 = 1,
    OggVorbis320 = 2,
    Mp3_256 = 3,
    Mp3_320 = 4,
    Mp3_160 = 5,
    Mp3_96 = 6,
    Mp3_160Enc = 7,
    Aac24 = 8,
    Aac48 = 9,
}

impl AudioFormat {
    const NAMES: [(AudioFormat, &'static str); 10] = [
        (AudioFormat::OggVorbis96, "ogg-vorbis-96"),
        (AudioFormat::OggVorbis160, "ogg-vorbis-160"),
        (AudioFormat::OggVorbis320, "ogg-vorbis-320"),
        (AudioFormat::Mp3_256, "mp3-256"),
        (AudioFormat::Mp3_320, "mp3-320"),
        (AudioFormat::Mp3_160, "mp3-160"),
        (AudioFormat::Mp3_96, "mp3-96"),
        (AudioFormat::Mp3_160Enc, "mp3-160-enc"),
        (AudioFormat::Aac24, "aac-24"),
        (AudioFormat::Aac48, "aac-48"),
    ];

    pub fn name(&self) -> &'static str {
        Self::NAMES[*self as usize].1
    }
}

impl TryFrom<u8> for AudioFormat {
    type Error = RespotError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::NAMES
            .get(value as usize)
            .map(|(format, _)| *format)
            .ok_or(RespotError::UnknownVariant {
                type_name: "AudioFormat",
                value: value as u64,
            })
    }
}

impl FromStr for AudioFormat {
    type Err = RespotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(s))
            .map(|(format, _)| *format)
            .ok_or_else(|| RespotError::Other(format!("unknown audio format: {s}")))
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
