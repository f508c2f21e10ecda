//! Channel lifecycle state machine.
//!
//! ```text
//!  Open ──► Receiving ──► Complete
//!    │          │
//!    │          ▼
//!    └──────► Failed
//! ```
//!
//! `Open` may also go straight to `Complete` when the first fragment is
//! the terminator. Transitions are validated and return `Result` instead
//! of panicking.

use thiserror::Error;

use crate::error::RespotError;

// ── ChannelFailure ───────────────────────────────────────────────

/// Why a channel ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelFailure {
    /// The holder abandoned the download.
    #[error("aborted by owner")]
    Aborted,

    /// The access point reported a channel error.
    #[error("remote channel error (code {code:#06x})")]
    Remote { code: u16 },

    /// A header-phase fragment could not be parsed.
    #[error("malformed header record")]
    MalformedHeader,

    /// The holder's deadline expired.
    #[error("timed out")]
    TimedOut,

    /// The session was torn down.
    #[error("session closed")]
    SessionClosed,
}

// ── ChannelPhase ─────────────────────────────────────────────────

/// The current phase of a logical channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChannelPhase {
    /// Allocated; no fragment seen yet.
    #[default]
    Open,

    /// At least one non-terminator fragment accepted.
    Receiving,

    /// Terminator observed. Terminal.
    Complete,

    /// Aborted. Terminal.
    Failed(ChannelFailure),
}

impl std::fmt::Display for ChannelPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Receiving => write!(f, "Receiving"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed(reason) => write!(f, "Failed({reason})"),
        }
    }
}

impl ChannelPhase {
    /// Returns `true` for `Complete` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_))
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Receiving`.
    ///
    /// Valid from: `Open`, `Receiving` (no-op).
    pub fn begin_receiving(&mut self) -> Result<(), RespotError> {
        match self {
            Self::Open | Self::Receiving => {
                *self = Self::Receiving;
                Ok(())
            }
            _ => Err(RespotError::ProtocolViolation(
                "cannot receive: channel already terminal",
            )),
        }
    }

    /// Transition to `Complete`.
    ///
    /// Valid from: `Open`, `Receiving`.
    pub fn complete(&mut self) -> Result<(), RespotError> {
        match self {
            Self::Open | Self::Receiving => {
                *self = Self::Complete;
                Ok(())
            }
            _ => Err(RespotError::ProtocolViolation(
                "cannot complete: channel already terminal",
            )),
        }
    }

    /// Transition to `Failed`.
    ///
    /// Valid from: `Open`, `Receiving`.
    pub fn fail(&mut self, reason: ChannelFailure) -> Result<(), RespotError> {
        match self {
            Self::Open | Self::Receiving => {
                *self = Self::Failed(reason);
                Ok(())
            }
            _ => Err(RespotError::ProtocolViolation(
                "cannot fail: channel already terminal",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_open() {
        let phase = ChannelPhase::default();
        assert_eq!(phase, ChannelPhase::Open);
        assert!(!phase.is_terminal());
    }

    #[test]
    fn receive_then_complete() {
        let mut phase = ChannelPhase::Open;
        phase.begin_receiving().unwrap();
        phase.begin_receiving().unwrap();
        phase.complete().unwrap();
        assert!(phase.is_complete());
        assert!(phase.is_terminal());
    }

    #[test]
    fn terminator_first_completes() {
        let mut phase = ChannelPhase::Open;
        phase.complete().unwrap();
        assert!(phase.is_complete());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut phase = ChannelPhase::Complete;
        assert!(phase.begin_receiving().is_err());
        assert!(phase.fail(ChannelFailure::Aborted).is_err());
        assert!(phase.is_complete());

        let mut phase = ChannelPhase::Receiving;
        phase.fail(ChannelFailure::TimedOut).unwrap();
        assert!(phase.complete().is_err());
        assert_eq!(phase.to_string(), "Failed(timed out)");
    }
}
