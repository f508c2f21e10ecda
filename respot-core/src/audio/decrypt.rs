use aes::Aes128;
use ctr::Ctr128BE;
use ctr::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};

use crate::protocol::AudioKey;

/// Fixed initial counter block for audio payloads.
pub const AUDIO_AES_IV: [u8; 16] = [
    0x72, 0xe0, 0x67, 0xfb, 0xdd, 0xcb, 0xcf, 0x77, 0xeb, 0xe8, 0xbc, 0x64, 0x3f, 0x63, 0x0d, 0x93,
];

type Aes128Ctr = Ctr128BE<Aes128>;

/// Apply the AES-128-CTR keystream for the bytes starting at `offset`.
///
/// CTR is symmetric, so the same call encrypts and decrypts.
pub fn decrypt_in_place(key: &AudioKey, offset: u64, data: &mut [u8]) {
    let mut cipher = Aes128Ctr::new(&(*key.as_bytes()).into(), &AUDIO_AES_IV.into());
    cipher.seek(offset);
    cipher.apply_keystream(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> AudioKey {
        AudioKey::new([0x42; 16])
    }

    #[test]
    fn round_trips() {
        let plain = b"the quick brown fox jumps over the lazy dog".to_vec();
        let mut data = plain.clone();
        decrypt_in_place(&key(), 0, &mut data);
        assert_ne!(data, plain);
        decrypt_in_place(&key(), 0, &mut data);
        assert_eq!(data, plain);
    }

    #[test]
    fn seeking_matches_a_full_pass() {
        let mut whole = vec![0u8; 100];
        decrypt_in_place(&key(), 0, &mut whole);

        // Unaligned offset into the middle of a block.
        let mut tail = vec![0u8; 63];
        decrypt_in_place(&key(), 37, &mut tail);
        assert_eq!(&whole[37..], &tail[..]);
    }
}
