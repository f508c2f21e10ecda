//! Tunables for the [`Player`](crate::player::Player).

use std::time::Duration;

/// Configuration for the player and the downloads it drives.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Deadline for a key response.
    pub key_timeout: Duration,
    /// Deadline for one chunk channel to reach a terminal phase.
    pub chunk_timeout: Duration,
    /// Chunk channels one file may have open at once.
    pub max_parallel_channels: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            key_timeout: Duration::from_secs(10),
            chunk_timeout: Duration::from_secs(30),
            max_parallel_channels: 4,
        }
    }
}
