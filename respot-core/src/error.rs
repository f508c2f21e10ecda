//! Domain-specific error types for the respot download engine.
//!
//! All fallible operations return `Result<T, RespotError>`.
//! Malformed wire input is reported as a typed error, never a panic.

use std::time::Duration;
use thiserror::Error;

use crate::channel::ChannelFailure;

/// The canonical error type for the download engine.
#[derive(Debug, Error)]
pub enum RespotError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// A frame was too short to contain its fixed-size prefix.
    #[error("truncated {what}: need {expected} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An identifier was not valid hexadecimal.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// A packet violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Packet Errors ────────────────────────────────────────────
    /// The payload exceeds what the 16-bit length prefix can carry.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The outbound packet queue was closed (writer task gone).
    #[error("channel closed")]
    ChannelClosed,

    /// The session was torn down; no further requests are accepted.
    #[error("session closed")]
    SessionClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Channel Errors ───────────────────────────────────────────
    /// Every 16-bit channel id is currently held by an open channel.
    #[error("all {0} channel ids are in use")]
    ChannelsExhausted(usize),

    /// A logical channel ended in the `Failed` state.
    #[error("channel {id} failed: {reason}")]
    ChannelFailed { id: u16, reason: ChannelFailure },

    // ── Key / File Errors ────────────────────────────────────────
    /// The key exchange for a file did not produce a key.
    #[error("key exchange failed: {0}")]
    Key(#[from] KeyError),

    /// A decrypting read was attempted before a key was obtained.
    #[error("decryption key unavailable for file {0}")]
    KeyUnavailable(String),

    /// The requested byte range has not been downloaded (or is past EOF).
    #[error("range {offset}+{len} not available")]
    RangeUnavailable { offset: u64, len: usize },

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── KeyError ──────────────────────────────────────────────────────

/// Outcome of a failed key request.
///
/// Kept separate from [`RespotError`] so that an [`AudioFile`] can store
/// the reason its key is missing and report it later.
///
/// [`AudioFile`]: crate::audio::AudioFile
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The server answered with a key-error frame.
    #[error("key denied by server (code {code:?})")]
    Denied { code: Option<u16> },

    /// No response arrived before the caller's deadline.
    #[error("key request timed out after {0:?}")]
    Timeout(Duration),

    /// The waiter was dropped before a response was delivered.
    #[error("key request was cancelled")]
    Cancelled,

    /// The session closed while the request was outstanding.
    #[error("session closed")]
    SessionClosed,

    /// The request could not be handed to the transport.
    #[error("failed to send key request: {0}")]
    Send(String),

    /// The sequence source only produced numbers that are still pending.
    #[error("sequence {0} is still pending")]
    SequenceInUse(u32),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for RespotError {
    fn from(s: String) -> Self {
        RespotError::Other(s)
    }
}

impl From<&str> for RespotError {
    fn from(s: &str) -> Self {
        RespotError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for RespotError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        RespotError::ChannelClosed
    }
}
