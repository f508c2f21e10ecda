//! In-process transport and access-point fake shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::PlayerConfig;
use crate::error::RespotError;
use crate::message::PacketType;
use crate::network::Transport;
use crate::player::Player;
use crate::protocol::{
    AudioKey, ChunkRequest, ChunkResponse, HeaderRecord, KeyErrorFrame, KeyRequest, KeyResponse,
};
use crate::sequence::SequenceCounter;

pub(crate) type Sent = (PacketType, Bytes);

/// Transport that records every outbound packet on an unbounded queue.
pub(crate) struct RecordingTransport {
    tx: mpsc::UnboundedSender<Sent>,
    fail: AtomicBool,
}

impl RecordingTransport {
    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_packet(&self, packet_type: PacketType, payload: Bytes) -> Result<(), RespotError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RespotError::ChannelClosed);
        }
        let _ = self.tx.send((packet_type, payload));
        Ok(())
    }
}

pub(crate) fn player_with_config(
    config: PlayerConfig,
) -> (Player, Arc<RecordingTransport>, mpsc::UnboundedReceiver<Sent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let transport = Arc::new(RecordingTransport {
        tx,
        fail: AtomicBool::new(false),
    });
    let player = Player::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::new(SequenceCounter::new()),
        config,
    );
    (player, transport, rx)
}

pub(crate) fn player() -> (Player, Arc<RecordingTransport>, mpsc::UnboundedReceiver<Sent>) {
    player_with_config(PlayerConfig::default())
}

/// Key bytes `00 01 02 .. 0f`.
pub(crate) fn sequential_key() -> AudioKey {
    let mut key = [0u8; 16];
    for (i, b) in key.iter_mut().enumerate() {
        *b = i as u8;
    }
    AudioKey::new(key)
}

/// Answers key and chunk requests for a single file by dispatching
/// responses straight into the player.
pub(crate) struct FakeAccessPoint {
    pub(crate) content: Bytes,
    /// `None` answers key requests with a key error.
    pub(crate) key: Option<AudioKey>,
    /// Payload bytes per chunk-response fragment.
    pub(crate) fragment_size: usize,
}

impl FakeAccessPoint {
    pub(crate) fn spawn(
        self,
        player: Player,
        mut rx: mpsc::UnboundedReceiver<Sent>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some((packet_type, payload)) = rx.recv().await {
                match packet_type {
                    PacketType::RequestKey => self.answer_key(&player, &payload),
                    PacketType::StreamChunk => self.answer_chunk(&player, &payload),
                    _ => {}
                }
            }
        })
    }

    fn answer_key(&self, player: &Player, payload: &[u8]) {
        let request = KeyRequest::decode(payload).expect("key request");
        match self.key {
            Some(key) => {
                let response = KeyResponse {
                    sequence: request.sequence,
                    key,
                };
                player.dispatch(PacketType::AesKey as u8, response.encode());
            }
            None => {
                let frame = KeyErrorFrame {
                    sequence: request.sequence,
                    code: Some(1),
                };
                player.dispatch(PacketType::AesKeyError as u8, frame.encode());
            }
        }
    }

    fn answer_chunk(&self, player: &Player, payload: &[u8]) {
        let request = ChunkRequest::decode(payload).expect("chunk request");
        let (start, end) = request.byte_range();
        let len = self.content.len() as u64;
        let data = self
            .content
            .slice(start.min(len) as usize..end.min(len) as usize);

        let send = |payload: &[u8]| {
            player.dispatch(
                PacketType::StreamChunkRes as u8,
                ChunkResponse::encode(request.channel_id, payload),
            );
        };
        send(&HeaderRecord::encode_block(&[HeaderRecord::file_size(len)])[..]);
        for fragment in data.chunks(self.fragment_size.max(1)) {
            send(fragment);
        }
        send(b"");
    }
}
