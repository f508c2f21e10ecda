//! Logical channels: per-download endpoints multiplexed over one transport.
//!
//! A [`Channel`] is a cheap, cloneable handle. The player's channel table
//! holds one clone for routing, the download that allocated it holds
//! another. Fragments arrive through [`Channel::handle_fragment`] in
//! transport order; the holder observes progress through a `watch`
//! receiver and collects the reassembled bytes with [`Channel::wait`].
//!
//! The release callback runs exactly once, on whichever path first moves
//! the channel into a terminal phase.

mod phase;
mod table;

pub use phase::{ChannelFailure, ChannelPhase};
pub(crate) use table::ChannelTable;
pub use table::CHANNEL_ID_SPACE;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::error::RespotError;
use crate::protocol::chunk::{HeaderRecord, parse_header_block};

/// Invoked once with the channel id when the channel reaches a terminal phase.
pub type ReleaseCallback = Box<dyn FnOnce(u16) + Send + 'static>;

/// How the first fragments of a channel are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMode {
    /// Every non-empty fragment is payload.
    #[default]
    Raw,
    /// Fragments carry header records until a zero-length record, then payload.
    Headers,
}

/// Snapshot published to the holder after every fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelProgress {
    pub phase: ChannelPhase,
    /// Payload bytes accumulated so far (headers excluded).
    pub bytes_received: usize,
    /// Non-terminator fragments accepted.
    pub fragments: usize,
    /// The header phase is over (always `true` for [`ChannelMode::Raw`]).
    pub headers_done: bool,
}

struct ChannelState {
    phase: ChannelPhase,
    in_headers: bool,
    headers: Vec<HeaderRecord>,
    buffer: BytesMut,
    fragments: usize,
}

impl ChannelState {
    fn progress(&self) -> ChannelProgress {
        ChannelProgress {
            phase: self.phase.clone(),
            bytes_received: self.buffer.len(),
            fragments: self.fragments,
            headers_done: !self.in_headers,
        }
    }
}

struct ChannelInner {
    id: u16,
    mode: ChannelMode,
    state: Mutex<ChannelState>,
    progress: watch::Sender<ChannelProgress>,
    release: Mutex<Option<ReleaseCallback>>,
}

/// Handle to one logical channel.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub(crate) fn new(id: u16, mode: ChannelMode, release: ReleaseCallback) -> Self {
        let in_headers = mode == ChannelMode::Headers;
        let state = ChannelState {
            phase: ChannelPhase::Open,
            in_headers,
            headers: Vec::new(),
            buffer: BytesMut::new(),
            fragments: 0,
        };
        let (progress, _) = watch::channel(state.progress());
        Self {
            inner: Arc::new(ChannelInner {
                id,
                mode,
                state: Mutex::new(state),
                progress,
                release: Mutex::new(Some(release)),
            }),
        }
    }

    pub fn id(&self) -> u16 {
        self.inner.id
    }

    pub fn mode(&self) -> ChannelMode {
        self.inner.mode
    }

    pub fn phase(&self) -> ChannelPhase {
        self.lock_state().phase.clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.lock_state().phase.is_terminal()
    }

    /// `true` if both handles refer to the same channel allocation.
    pub fn same_channel(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Subscribe to incremental progress updates.
    pub fn progress(&self) -> watch::Receiver<ChannelProgress> {
        self.inner.progress.subscribe()
    }

    /// Header records received so far.
    pub fn headers(&self) -> Vec<HeaderRecord> {
        self.lock_state().headers.clone()
    }

    /// Copy of the payload accumulated so far.
    pub fn content(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock_state().buffer)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ChannelState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Inbound ──────────────────────────────────────────────────

    /// Accept one fragment routed by the dispatcher.
    ///
    /// An empty fragment completes the channel. Fragments after a terminal
    /// phase are dropped.
    pub fn handle_fragment(&self, fragment: Bytes) {
        let (progress, terminal) = {
            let mut state = self.lock_state();
            if state.phase.is_terminal() {
                debug!(
                    channel = self.inner.id,
                    phase = %state.phase,
                    len = fragment.len(),
                    "fragment after terminal phase dropped"
                );
                return;
            }

            if fragment.is_empty() {
                // Open/Receiving → Complete cannot fail here.
                let _ = state.phase.complete();
                state.in_headers = false;
                trace!(channel = self.inner.id, bytes = state.buffer.len(), "channel complete");
            } else {
                let _ = state.phase.begin_receiving();
                state.fragments += 1;
                if state.in_headers {
                    match parse_header_block(fragment) {
                        Ok(block) => {
                            state.headers.extend(block.records);
                            if block.ended {
                                state.in_headers = false;
                                state.buffer.extend_from_slice(&block.trailing);
                            }
                        }
                        Err(e) => {
                            warn!(channel = self.inner.id, "bad header fragment: {e}");
                            let _ = state.phase.fail(ChannelFailure::MalformedHeader);
                        }
                    }
                } else {
                    state.buffer.extend_from_slice(&fragment);
                }
            }
            (state.progress(), state.phase.is_terminal())
        };

        self.inner.progress.send_replace(progress);
        if terminal {
            self.release();
        }
    }

    /// Abort the channel. No-op if it is already terminal.
    pub fn fail(&self, reason: ChannelFailure) {
        let progress = {
            let mut state = self.lock_state();
            if state.phase.fail(reason.clone()).is_err() {
                return;
            }
            state.progress()
        };
        debug!(channel = self.inner.id, %reason, "channel failed");
        self.inner.progress.send_replace(progress);
        self.release();
    }

    fn release(&self) {
        let callback = self
            .inner
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            callback(self.inner.id);
        }
    }

    // ── Holder side ──────────────────────────────────────────────

    /// Wait until the header phase is over (or the channel ends).
    pub async fn wait_headers(&self) -> Result<Vec<HeaderRecord>, RespotError> {
        let mut rx = self.progress();
        let progress = rx
            .wait_for(|p| p.headers_done || p.phase.is_terminal())
            .await
            .map_err(|_| RespotError::SessionClosed)?
            .clone();
        match progress.phase {
            ChannelPhase::Failed(reason) => Err(RespotError::ChannelFailed {
                id: self.inner.id,
                reason,
            }),
            _ => Ok(self.headers()),
        }
    }

    /// Wait for a terminal phase and take the reassembled payload.
    pub async fn wait(&self) -> Result<Bytes, RespotError> {
        let mut rx = self.progress();
        let phase = rx
            .wait_for(|p| p.phase.is_terminal())
            .await
            .map_err(|_| RespotError::SessionClosed)?
            .phase
            .clone();
        match phase {
            ChannelPhase::Failed(reason) => Err(RespotError::ChannelFailed {
                id: self.inner.id,
                reason,
            }),
            _ => Ok(self.lock_state().buffer.split().freeze()),
        }
    }

    /// [`wait`](Self::wait) with a deadline. On expiry the channel is
    /// failed so that its id goes back to the pool.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<Bytes, RespotError> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(result) => result,
            Err(_) => {
                self.fail(ChannelFailure::TimedOut);
                Err(RespotError::Timeout(timeout))
            }
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("phase", &state.phase)
            .field("bytes", &state.buffer.len())
            .finish()
    }
}
