//! One download: connect, fetch a file with its key, optionally write the
//! decrypted bytes out.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use respot_core::{
    AudioFile, AudioFormat, Connection, ConnectionInfo, FileId, KeyState, Player, RespotError,
    SequenceCounter, TrackId,
};
use tracing::{info, warn};

use crate::config::FetchConfig;

/// What a finished download produced.
#[derive(Debug, Clone)]
pub struct FetchSummary {
    pub file_id: FileId,
    pub format: AudioFormat,
    pub size: u64,
    pub digest: String,
    pub key_loaded: bool,
    pub written: bool,
    pub elapsed: Duration,
}

impl fmt::Display for FetchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} bytes in {:.2?}, blake3 {}, key {}",
            self.file_id,
            self.format,
            self.size,
            self.elapsed,
            self.digest,
            if self.key_loaded { "loaded" } else { "missing" },
        )
    }
}

/// Download `file_id` of `track_id` and, when `output` is given and the
/// key was granted, write the decrypted file there.
pub async fn fetch(
    config: &FetchConfig,
    track_id: TrackId,
    file_id: FileId,
    format: AudioFormat,
    output: Option<&Path>,
) -> Result<FetchSummary, RespotError> {
    let started = Instant::now();
    let info = ConnectionInfo::new(config.network.host.clone(), config.network.port);
    let conn = Connection::connect(&info).await?;

    let player = Player::new(
        Arc::new(conn.sender()),
        Arc::new(SequenceCounter::new()),
        config.to_player_config(),
    );
    let dispatcher = conn.spawn_dispatcher(player.clone());

    let result = download(&player, track_id, file_id, format, output, started).await;
    player.close();
    dispatcher.abort();
    result
}

async fn download(
    player: &Player,
    track_id: TrackId,
    file_id: FileId,
    format: AudioFormat,
    output: Option<&Path>,
    started: Instant,
) -> Result<FetchSummary, RespotError> {
    let file = player.load_track(file_id, format, track_id).await?;
    let size = file.size().unwrap_or(0);
    let key_loaded = matches!(file.key_state(), KeyState::Loaded(_));

    let written = match output {
        Some(path) if key_loaded => {
            write_decrypted(&file, size, path).await?;
            info!(path = %path.display(), "decrypted file written");
            true
        }
        Some(path) => {
            warn!(path = %path.display(), "no key, nothing written");
            false
        }
        None => false,
    };

    Ok(FetchSummary {
        file_id,
        format,
        size,
        digest: file.digest()?.to_hex().to_string(),
        key_loaded,
        written,
        elapsed: started.elapsed(),
    })
}

async fn write_decrypted(file: &AudioFile, size: u64, path: &Path) -> Result<(), RespotError> {
    let plain = file.read_decrypted(0, size as usize)?;
    tokio::fs::write(path, &plain).await?;
    Ok(())
}
