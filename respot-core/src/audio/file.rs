use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, trace, warn};

use crate::audio::decrypt::decrypt_in_place;
use crate::audio::store::ChunkStore;
use crate::channel::{Channel, ChannelFailure};
use crate::error::{KeyError, RespotError};
use crate::player::Player;
use crate::protocol::{
    AudioFormat, AudioKey, CHUNK_SIZE_BYTES, FileId, HeaderRecord, TrackId, chunk_word_range,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Every chunk of a `size`-byte file can be named in a chunk request.
fn is_addressable(size: u64) -> bool {
    let count = size.div_ceil(CHUNK_SIZE_BYTES as u64);
    match count.checked_sub(1) {
        None => true,
        Some(last) => u32::try_from(last).ok().and_then(chunk_word_range).is_some(),
    }
}

/// Where the key exchange for a file stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KeyState {
    #[default]
    Pending,
    Loaded(AudioKey),
    Failed(KeyError),
}

/// One track's encrypted audio file and its decryption key.
///
/// The key phase and the chunk phase are independent: a missing key never
/// discards downloaded data, and a later successful
/// [`load_key`](Self::load_key) makes it readable.
pub struct AudioFile {
    file_id: FileId,
    format: AudioFormat,
    track_id: TrackId,
    player: Player,
    key: Mutex<KeyState>,
    store: Mutex<Option<ChunkStore>>,
}

impl AudioFile {
    pub fn new(file_id: FileId, format: AudioFormat, track_id: TrackId, player: Player) -> Self {
        Self {
            file_id,
            format,
            track_id,
            player,
            key: Mutex::new(KeyState::Pending),
            store: Mutex::new(None),
        }
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    pub fn key_state(&self) -> KeyState {
        lock(&self.key).clone()
    }

    pub fn key(&self) -> Option<AudioKey> {
        match *lock(&self.key) {
            KeyState::Loaded(key) => Some(key),
            _ => None,
        }
    }

    /// File size in bytes, once the first chunk's headers have arrived.
    pub fn size(&self) -> Option<u64> {
        lock(&self.store).as_ref().map(ChunkStore::size)
    }

    pub fn is_complete(&self) -> bool {
        lock(&self.store).as_ref().is_some_and(ChunkStore::is_complete)
    }

    // ── Key phase ────────────────────────────────────────────────

    /// Request the decryption key. May be called again after a failure.
    pub async fn load_key(&self) -> Result<(), KeyError> {
        let outcome = self.player.request_key(self.track_id, self.file_id).await;
        let mut state = lock(&self.key);
        match outcome {
            Ok(key) => {
                debug!(file = %self.file_id, "audio key loaded");
                *state = KeyState::Loaded(key);
                Ok(())
            }
            Err(e) => {
                *state = KeyState::Failed(e.clone());
                Err(e)
            }
        }
    }

    // ── Chunk phase ──────────────────────────────────────────────

    /// Download every chunk of the file.
    ///
    /// Chunk 0 is fetched first to learn the file size from its headers.
    /// The rest run on up to `max_parallel_channels` channels at once; all
    /// of them are driven to a terminal phase before the first error, if
    /// any, is returned.
    pub async fn load_chunks(&self) -> Result<(), RespotError> {
        let config = self.player.config().clone();

        let first = self.player.request_chunk(self.file_id, 0).await?;
        let headers = match tokio::time::timeout(config.chunk_timeout, first.wait_headers()).await {
            Ok(headers) => headers?,
            Err(_) => {
                first.fail(ChannelFailure::TimedOut);
                return Err(RespotError::Timeout(config.chunk_timeout));
            }
        };
        let Some(size) = headers.iter().find_map(HeaderRecord::as_file_size) else {
            first.fail(ChannelFailure::MalformedHeader);
            return Err(RespotError::ProtocolViolation("first chunk carries no file size"));
        };
        if !is_addressable(size) {
            warn!(file = %self.file_id, size, "file size beyond addressable chunk range");
            first.fail(ChannelFailure::MalformedHeader);
            return Err(RespotError::ProtocolViolation("file size beyond addressable chunk range"));
        }

        let count = {
            let mut store = lock(&self.store);
            let store = store.get_or_insert_with(|| ChunkStore::new(size));
            store.chunk_count()
        };
        info!(file = %self.file_id, format = %self.format, size, chunks = count, "downloading audio file");

        let first_data = first.wait_timeout(config.chunk_timeout).await?;
        if count > 0 {
            self.store_chunk(0, first_data)?;
        }

        let missing: Vec<usize> = match lock(&self.store).as_ref() {
            Some(store) => store.missing().collect(),
            None => Vec::new(),
        };
        let results: Vec<Result<(), RespotError>> = stream::iter(missing)
            .map(|index| self.fetch_chunk(index))
            .buffer_unordered(config.max_parallel_channels.max(1))
            .collect()
            .await;

        results.into_iter().collect::<Result<(), _>>()?;
        debug!(file = %self.file_id, "all chunks received");
        Ok(())
    }

    async fn fetch_chunk(&self, index: usize) -> Result<(), RespotError> {
        let timeout = self.player.config().chunk_timeout;
        let channel: Channel = self.player.request_chunk(self.file_id, index as u32).await?;
        match channel.wait_timeout(timeout).await {
            Ok(data) => {
                trace!(file = %self.file_id, index, len = data.len(), "chunk received");
                self.store_chunk(index, data)
            }
            Err(e) => {
                warn!(file = %self.file_id, index, "chunk download failed: {e}");
                Err(e)
            }
        }
    }

    fn store_chunk(&self, index: usize, data: Bytes) -> Result<(), RespotError> {
        match lock(&self.store).as_mut() {
            Some(store) => store.insert(index, data),
            None => Err(RespotError::ProtocolViolation("chunk before file size")),
        }
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Ciphertext bytes `[offset, offset + len)`.
    pub fn read(&self, offset: u64, len: usize) -> Result<Bytes, RespotError> {
        match lock(&self.store).as_ref() {
            Some(store) => store.read(offset, len),
            None => Err(RespotError::RangeUnavailable { offset, len }),
        }
    }

    /// Plaintext bytes `[offset, offset + len)`.
    pub fn read_decrypted(&self, offset: u64, len: usize) -> Result<Bytes, RespotError> {
        let key = self
            .key()
            .ok_or_else(|| RespotError::KeyUnavailable(self.file_id.to_hex()))?;
        let mut data = BytesMut::from(&self.read(offset, len)?[..]);
        decrypt_in_place(&key, offset, &mut data);
        Ok(data.freeze())
    }

    /// blake3 hash of the complete ciphertext.
    pub fn digest(&self) -> Result<blake3::Hash, RespotError> {
        let store = lock(&self.store);
        let store = store
            .as_ref()
            .ok_or(RespotError::RangeUnavailable { offset: 0, len: 0 })?;
        let data = store.read(0, store.size() as usize)?;
        Ok(blake3::hash(&data))
    }
}

impl std::fmt::Debug for AudioFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFile")
            .field("file_id", &self.file_id)
            .field("format", &self.format)
            .field("track_id", &self.track_id)
            .field("key", &self.key_state())
            .field("size", &self.size())
            .finish()
    }
}
