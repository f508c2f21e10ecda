//! The player: dispatcher and correlation registry.
//!
//! Two independent namespaces are correlated here:
//!
//! - **sequence numbers** for single-shot key requests, backed by a
//!   `oneshot` slot per request;
//! - **channel ids** for multi-fragment chunk streams, backed by the
//!   channel table.
//!
//! [`Player::dispatch`] is the single inbound entry point. It never blocks
//! and never awaits: it looks up the waiter under a short lock, drops the
//! lock, then hands the payload over.

mod pending;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use crate::audio::AudioFile;
use crate::channel::{Channel, ChannelFailure, ChannelMode, ChannelTable};
use crate::config::PlayerConfig;
use crate::error::{KeyError, RespotError};
use crate::message::PacketType;
use crate::network::Transport;
use crate::protocol::{
    AudioFormat, AudioKey, ChannelErrorFrame, ChunkRequest, ChunkResponse, FileId, KeyErrorFrame,
    KeyRequest, KeyResponse, TrackId,
};
use crate::sequence::SequenceSource;

use pending::PendingKeys;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PlayerInner {
    transport: Arc<dyn Transport>,
    sequences: Arc<dyn SequenceSource>,
    channels: Arc<Mutex<ChannelTable>>,
    pending_keys: Mutex<PendingKeys>,
    config: PlayerConfig,
}

/// Central dispatcher shared by every download on one session.
///
/// Cloning is cheap; all clones share the same tables.
#[derive(Clone)]
pub struct Player {
    inner: Arc<PlayerInner>,
}

impl Player {
    pub fn new(
        transport: Arc<dyn Transport>,
        sequences: Arc<dyn SequenceSource>,
        config: PlayerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PlayerInner {
                transport,
                sequences,
                channels: Arc::new(Mutex::new(ChannelTable::new())),
                pending_keys: Mutex::new(PendingKeys::new()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.inner.config
    }

    /// Channels currently registered.
    pub fn open_channels(&self) -> usize {
        lock(&self.inner.channels).len()
    }

    /// Key requests currently waiting for a response.
    pub fn pending_key_requests(&self) -> usize {
        lock(&self.inner.pending_keys).pending_count()
    }

    pub(crate) async fn send(&self, packet_type: PacketType, payload: Bytes) -> Result<(), RespotError> {
        self.inner.transport.send_packet(packet_type, payload).await
    }

    // ── Tracks ───────────────────────────────────────────────────

    /// Build an [`AudioFile`] and run its key and chunk phases concurrently.
    ///
    /// A key failure is recorded on the file (see [`AudioFile::key_state`])
    /// rather than returned, since the ciphertext is still worth keeping.
    pub async fn load_track(
        &self,
        file_id: FileId,
        format: AudioFormat,
        track_id: TrackId,
    ) -> Result<AudioFile, RespotError> {
        let file = AudioFile::new(file_id, format, track_id, self.clone());
        let (key, chunks) = tokio::join!(file.load_key(), file.load_chunks());
        if let Err(e) = key {
            warn!(file = %file_id, track = %track_id, "audio key unavailable: {e}");
        }
        chunks?;
        Ok(file)
    }

    // ── Channels ─────────────────────────────────────────────────

    /// Allocate a raw channel.
    pub fn allocate_channel(&self) -> Result<Channel, RespotError> {
        self.allocate_channel_with(ChannelMode::Raw)
    }

    /// Reserve a free id, register a channel under it and return the
    /// channel. Never blocks.
    pub fn allocate_channel_with(&self, mode: ChannelMode) -> Result<Channel, RespotError> {
        let mut table = lock(&self.inner.channels);
        let (id, serial) = table.reserve()?;

        let weak: Weak<Mutex<ChannelTable>> = Arc::downgrade(&self.inner.channels);
        let channel = Channel::new(
            id,
            mode,
            Box::new(move |id| {
                if let Some(table) = weak.upgrade() {
                    if lock(&table).release(id, serial) {
                        trace!(channel = id, "channel released");
                    }
                }
            }),
        );
        table.insert(serial, channel.clone());
        trace!(channel = id, ?mode, "channel allocated");
        Ok(channel)
    }

    /// Remove `channel` from the table. Releasing twice is a no-op.
    pub fn release_channel(&self, channel: &Channel) {
        if lock(&self.inner.channels).release_channel(channel) {
            trace!(channel = channel.id(), "channel released by owner");
        }
    }

    /// Allocate a header-mode channel and send a request for chunk `index`.
    ///
    /// On send failure the channel is failed (and so released) before the
    /// error is returned.
    pub async fn request_chunk(&self, file_id: FileId, index: u32) -> Result<Channel, RespotError> {
        let channel = self.allocate_channel_with(ChannelMode::Headers)?;
        let request = match ChunkRequest::for_chunk(channel.id(), file_id, index) {
            Ok(request) => request,
            Err(e) => {
                channel.fail(ChannelFailure::Aborted);
                return Err(e);
            }
        };
        trace!(channel = channel.id(), file = %file_id, index, "requesting chunk");
        if let Err(e) = self.send(PacketType::StreamChunk, request.encode()).await {
            warn!(channel = channel.id(), "chunk request send failed: {e}");
            channel.fail(ChannelFailure::Aborted);
            return Err(e);
        }
        Ok(channel)
    }

    // ── Keys ─────────────────────────────────────────────────────

    /// Request the key for `file_id` with the configured deadline.
    pub async fn request_key(&self, track_id: TrackId, file_id: FileId) -> Result<AudioKey, KeyError> {
        self.request_key_with_timeout(track_id, file_id, self.inner.config.key_timeout)
            .await
    }

    /// Request the key for `file_id`, waiting at most `timeout`.
    ///
    /// The slot is registered before the request is sent and removed on
    /// every exit path, including the returned future being dropped. The
    /// timeout spans both sending the request and waiting for the answer.
    pub async fn request_key_with_timeout(
        &self,
        track_id: TrackId,
        file_id: FileId,
        timeout: Duration,
    ) -> Result<AudioKey, KeyError> {
        let (tx, rx) = oneshot::channel();
        let (sequence, generation) = self.register_key_slot(tx)?;
        let _guard = KeySlotGuard {
            player: self.inner.as_ref(),
            sequence,
            generation,
        };

        let request = KeyRequest {
            sequence,
            track_id,
            file_id,
        };
        trace!(sequence, track = %track_id, file = %file_id, "requesting audio key");
        // The deadline covers the send too; a backed-up writer counts
        // against it.
        let exchange = async {
            if let Err(e) = self.send(PacketType::RequestKey, request.encode()).await {
                warn!(sequence, "key request send failed: {e}");
                return Err(KeyError::Send(e.to_string()));
            }
            rx.await.unwrap_or(Err(KeyError::Cancelled))
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(sequence, ?timeout, "key request timed out");
                Err(KeyError::Timeout(timeout))
            }
        }
    }

    fn register_key_slot(
        &self,
        mut slot: pending::KeySlot,
    ) -> Result<(u32, u64), KeyError> {
        let mut pending = lock(&self.inner.pending_keys);
        if pending.is_closed() {
            return Err(KeyError::SessionClosed);
        }
        // A wrapped sequence may collide with a request that is still
        // waiting; skip forward past it.
        let attempts = pending.pending_count() + 1;
        let mut sequence = 0;
        for _ in 0..attempts {
            sequence = self.inner.sequences.next_sequence();
            match pending.track(sequence, slot) {
                Ok(generation) => return Ok((sequence, generation)),
                Err(returned) => slot = returned,
            }
        }
        Err(KeyError::SequenceInUse(sequence))
    }

    // ── Inbound ──────────────────────────────────────────────────

    /// Route one inbound frame. Must be called in arrival order, never
    /// concurrently with itself.
    pub fn dispatch(&self, cmd: u8, payload: Bytes) {
        let packet_type = match PacketType::try_from(cmd) {
            Ok(t) => t,
            Err(_) => {
                debug!(cmd = %format!("{cmd:#04x}"), len = payload.len(), "unknown command byte");
                return;
            }
        };

        if !packet_type.is_player_bound() {
            trace!(packet = %packet_type, len = payload.len(), "not handled by player");
            return;
        }

        match packet_type {
            PacketType::AesKey => self.handle_key_response(&payload),
            PacketType::AesKeyError => self.handle_key_error(&payload),
            PacketType::StreamChunkRes => self.handle_chunk(payload),
            PacketType::ChannelError => self.handle_channel_error(&payload),
            _ => {}
        }
    }

    fn handle_key_response(&self, payload: &[u8]) {
        let response = match KeyResponse::decode(payload) {
            Ok(r) => r,
            Err(e) => {
                warn!("dropping malformed key response: {e}");
                return;
            }
        };

        let pending = lock(&self.inner.pending_keys).resolve(response.sequence);
        match pending {
            Some(pending) => {
                trace!(sequence = response.sequence, elapsed = ?pending.elapsed(), "audio key received");
                if pending.slot.send(Ok(response.key)).is_err() {
                    debug!(sequence = response.sequence, "key waiter already gone");
                }
            }
            None => debug!(sequence = response.sequence, "no pending request for audio key"),
        }
    }

    fn handle_key_error(&self, payload: &[u8]) {
        let frame = match KeyErrorFrame::decode(payload) {
            Ok(f) => f,
            Err(e) => {
                warn!(payload = ?payload, "dropping malformed key error: {e}");
                return;
            }
        };

        let pending = lock(&self.inner.pending_keys).resolve(frame.sequence);
        match pending {
            Some(pending) => {
                warn!(sequence = frame.sequence, code = ?frame.code, "audio key denied");
                let _ = pending.slot.send(Err(KeyError::Denied { code: frame.code }));
            }
            None => debug!(sequence = frame.sequence, code = ?frame.code, "key error for unknown sequence"),
        }
    }

    fn handle_chunk(&self, payload: Bytes) {
        let response = match ChunkResponse::decode(payload) {
            Ok(r) => r,
            Err(e) => {
                warn!("dropping malformed chunk response: {e}");
                return;
            }
        };

        let channel = lock(&self.inner.channels).get(response.channel_id);
        match channel {
            Some(channel) => channel.handle_fragment(response.payload),
            None => debug!(
                channel = response.channel_id,
                len = response.payload.len(),
                "data for unknown channel"
            ),
        }
    }

    fn handle_channel_error(&self, payload: &[u8]) {
        let frame = match ChannelErrorFrame::decode(payload) {
            Ok(f) => f,
            Err(e) => {
                warn!("dropping malformed channel error: {e}");
                return;
            }
        };

        let channel = lock(&self.inner.channels).get(frame.channel_id);
        match channel {
            Some(channel) => {
                warn!(channel = frame.channel_id, code = frame.code, "channel error");
                channel.fail(ChannelFailure::Remote { code: frame.code });
            }
            None => debug!(channel = frame.channel_id, "error for unknown channel"),
        }
    }

    // ── Shutdown ─────────────────────────────────────────────────

    /// Fail every outstanding waiter after a fatal transport disconnect.
    ///
    /// Later calls to [`request_key`](Self::request_key) and
    /// [`allocate_channel`](Self::allocate_channel) fail immediately.
    pub fn close(&self) {
        let keys = lock(&self.inner.pending_keys).close();
        let channels = lock(&self.inner.channels).close();
        if !keys.is_empty() || !channels.is_empty() {
            info!(
                keys = keys.len(),
                channels = channels.len(),
                "session closed; failing outstanding requests"
            );
        }
        for (_, pending) in keys {
            let _ = pending.slot.send(Err(KeyError::SessionClosed));
        }
        for channel in channels {
            channel.fail(ChannelFailure::SessionClosed);
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner.pending_keys).is_closed()
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("open_channels", &self.open_channels())
            .field("pending_key_requests", &self.pending_key_requests())
            .finish()
    }
}

/// Removes an abandoned key slot when the waiting future ends or is dropped.
struct KeySlotGuard<'a> {
    player: &'a PlayerInner,
    sequence: u32,
    generation: u64,
}

impl Drop for KeySlotGuard<'_> {
    fn drop(&mut self) {
        if lock(&self.player.pending_keys).abandon(self.sequence, self.generation) {
            trace!(sequence = self.sequence, "abandoned key slot reclaimed");
        }
    }
}
