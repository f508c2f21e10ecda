//! Integration tests — full downloads, key refusal and disconnects over a
//! real TCP connection to a loopback access-point emulator.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use respot_core::audio::decrypt_in_place;
use respot_core::protocol::{
    ChunkRequest, ChunkResponse, HeaderRecord, KeyErrorFrame, KeyRequest, KeyResponse,
};
use respot_core::{
    AudioFormat, AudioKey, Connection, ConnectionInfo, FileId, KeyError, KeyState, Packet,
    PacketType, Player, PlayerConfig, RespotError, SequenceCounter, TrackId,
};
use tokio::net::TcpListener;

const TRACK: TrackId = TrackId::new([0x10; 16]);
const FILE: FileId = FileId::new([0x20; 20]);
const KEY: AudioKey = AudioKey::new([0x7f; 16]);
const FRAGMENT: usize = 16 * 1024;

// ── Helpers ──────────────────────────────────────────────────────

async fn ephemeral_listener() -> (TcpListener, ConnectionInfo) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let info = ConnectionInfo::new(addr.ip().to_string(), addr.port());
    (listener, info)
}

/// Connect a player to `info` with its dispatcher running.
async fn connect_player(info: &ConnectionInfo, config: PlayerConfig) -> Player {
    let conn = Connection::connect(info).await.unwrap();
    let player = Player::new(
        Arc::new(conn.sender()),
        Arc::new(SequenceCounter::new()),
        config,
    );
    conn.spawn_dispatcher(player.clone());
    player
}

fn encrypt(plain: &[u8]) -> Bytes {
    let mut data = plain.to_vec();
    decrypt_in_place(&KEY, 0, &mut data);
    Bytes::from(data)
}

/// Serves one file until the client goes away.
async fn serve(mut conn: Connection, content: Bytes, grant_key: bool) {
    while let Some(packet) = conn.recv().await {
        let (cmd, payload) = packet.into_parts();
        match PacketType::try_from(cmd) {
            Ok(PacketType::RequestKey) => {
                let request = KeyRequest::decode(&payload).unwrap();
                let reply = if grant_key {
                    let response = KeyResponse {
                        sequence: request.sequence,
                        key: KEY,
                    };
                    Packet::new(PacketType::AesKey, response.encode())
                } else {
                    let frame = KeyErrorFrame {
                        sequence: request.sequence,
                        code: Some(2),
                    };
                    Packet::new(PacketType::AesKeyError, frame.encode())
                };
                conn.send(reply.unwrap()).await.unwrap();
            }
            Ok(PacketType::StreamChunk) => {
                let request = ChunkRequest::decode(&payload).unwrap();
                let (start, end) = request.byte_range();
                let len = content.len() as u64;
                let data = content.slice(start.min(len) as usize..end.min(len) as usize);

                let header = HeaderRecord::encode_block(&[HeaderRecord::file_size(len)]);
                let mut fragments = vec![header];
                fragments.extend(data.chunks(FRAGMENT).map(Bytes::copy_from_slice));
                fragments.push(Bytes::new());
                for fragment in fragments {
                    let body = ChunkResponse::encode(request.channel_id, &fragment);
                    let packet = Packet::new(PacketType::StreamChunkRes, body).unwrap();
                    conn.send(packet).await.unwrap();
                }
            }
            _ => {}
        }
    }
}

// ── Downloads ────────────────────────────────────────────────────

#[tokio::test]
async fn test_load_track_over_tcp() {
    let (listener, info) = ephemeral_listener().await;
    let plain: Vec<u8> = (0..300_000u32).map(|i| (i % 253) as u8).collect();
    let content = encrypt(&plain);

    let server = tokio::spawn({
        let content = content.clone();
        async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve(Connection::new(stream), content, true).await;
        }
    });

    let player = connect_player(&info, PlayerConfig::default()).await;
    let file = tokio::time::timeout(
        Duration::from_secs(10),
        player.load_track(FILE, AudioFormat::OggVorbis160, TRACK),
    )
    .await
    .expect("timeout")
    .unwrap();

    assert!(file.is_complete());
    assert_eq!(file.size(), Some(plain.len() as u64));
    assert_eq!(file.key_state(), KeyState::Loaded(KEY));
    assert_eq!(file.digest().unwrap(), blake3::hash(&content));
    assert_eq!(&file.read_decrypted(0, plain.len()).unwrap()[..], &plain[..]);
    assert_eq!(player.open_channels(), 0);
    assert_eq!(player.pending_key_requests(), 0);

    drop(player);
    drop(file);
    server.abort();
}

#[tokio::test]
async fn test_key_denied_keeps_ciphertext() {
    let (listener, info) = ephemeral_listener().await;
    let content = encrypt(&[0xc3; 4096]);

    let server = tokio::spawn({
        let content = content.clone();
        async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve(Connection::new(stream), content, false).await;
        }
    });

    let player = connect_player(&info, PlayerConfig::default()).await;
    let file = player
        .load_track(FILE, AudioFormat::default(), TRACK)
        .await
        .unwrap();

    assert_eq!(
        file.key_state(),
        KeyState::Failed(KeyError::Denied { code: Some(2) })
    );
    assert!(matches!(
        file.read_decrypted(0, 16),
        Err(RespotError::KeyUnavailable(_))
    ));
    assert_eq!(file.read(0, content.len()).unwrap(), content);

    server.abort();
}

// ── Disconnects ──────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_fails_outstanding_requests() {
    let (listener, info) = ephemeral_listener().await;

    // Accept, read the first request, then hang up without answering.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut conn = Connection::new(stream);
        let first = conn.recv().await.unwrap();
        assert_eq!(first.packet_type().unwrap(), PacketType::RequestKey);
    });

    let player = connect_player(&info, PlayerConfig::default()).await;
    let err = tokio::time::timeout(Duration::from_secs(5), player.request_key(TRACK, FILE))
        .await
        .expect("timeout")
        .unwrap_err();
    server.await.unwrap();

    assert_eq!(err, KeyError::SessionClosed);
    assert!(player.is_closed());
    assert_eq!(player.pending_key_requests(), 0);
    assert!(matches!(
        player.allocate_channel(),
        Err(RespotError::SessionClosed)
    ));
}

#[tokio::test]
async fn test_ping_is_answered() {
    let (listener, info) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut conn = Connection::new(stream);
        let ping = Packet::new(PacketType::Ping, vec![0, 0, 0, 1]).unwrap();
        conn.send(ping).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), conn.recv())
            .await
            .expect("timeout")
            .expect("connection closed")
    });

    let _player = connect_player(&info, PlayerConfig::default()).await;
    let pong = server.await.unwrap();
    assert_eq!(pong.packet_type().unwrap(), PacketType::Pong);
}
