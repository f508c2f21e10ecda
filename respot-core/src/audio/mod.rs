//! Per-track orchestration: key acquisition, chunk download and the
//! reassembled, optionally decrypted, file contents.

mod decrypt;
mod file;
mod store;

pub use decrypt::{AUDIO_AES_IV, decrypt_in_place};
pub use file::{AudioFile, KeyState};
pub use store::ChunkStore;
