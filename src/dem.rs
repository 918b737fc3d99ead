//! Data encapsulation: the symmetric half of the envelope.

use aes::Aes256;
use cfb_mode::cipher::KeyIvInit;
use cfb_mode::{BufDecryptor, BufEncryptor};

use crate::error::{Error, Result};
use crate::types::SYMMETRIC_KEY_SIZE;

/// Stateful in-place transform over consecutive chunks of one stream.
///
/// Chunks may have any length; the output only depends on the concatenated
/// input, never on where it was split.
pub trait ChunkTransform {
    fn apply(&mut self, chunk: &mut [u8]);
}

/// A block-cipher based stream mode keyed with a 32-byte key.
pub trait SymmetricCipher {
    /// Cipher block length, also the IV length and the plaintext chunk size.
    const BLOCK_SIZE: usize;

    type Encryptor: ChunkTransform;
    type Decryptor: ChunkTransform;

    fn encryptor(&self, key: &[u8; SYMMETRIC_KEY_SIZE], iv: &[u8]) -> Result<Self::Encryptor>;

    fn decryptor(&self, key: &[u8; SYMMETRIC_KEY_SIZE], iv: &[u8]) -> Result<Self::Decryptor>;
}

/// AES-256 in full-block cipher feedback mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct Aes256Cfb;

impl ChunkTransform for BufEncryptor<Aes256> {
    fn apply(&mut self, chunk: &mut [u8]) {
        self.encrypt(chunk);
    }
}

impl ChunkTransform for BufDecryptor<Aes256> {
    fn apply(&mut self, chunk: &mut [u8]) {
        self.decrypt(chunk);
    }
}

impl SymmetricCipher for Aes256Cfb {
    const BLOCK_SIZE: usize = 16;

    type Encryptor = BufEncryptor<Aes256>;
    type Decryptor = BufDecryptor<Aes256>;

    fn encryptor(&self, key: &[u8; SYMMETRIC_KEY_SIZE], iv: &[u8]) -> Result<Self::Encryptor> {
        BufEncryptor::new_from_slices(key, iv)
            .map_err(|_| Error::InvalidArgument(format!("AES-256-CFB needs a 16-byte IV, got {}", iv.len())))
    }

    fn decryptor(&self, key: &[u8; SYMMETRIC_KEY_SIZE], iv: &[u8]) -> Result<Self::Decryptor> {
        BufDecryptor::new_from_slices(key, iv)
            .map_err(|_| Error::InvalidArgument(format!("AES-256-CFB needs a 16-byte IV, got {}", iv.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];
    const IV: [u8; 16] = [9u8; 16];

    fn encrypt_in_chunks(data: &[u8], chunk: usize) -> Vec<u8> {
        let mut encryptor = Aes256Cfb.encryptor(&KEY, &IV).unwrap();
        let mut out = data.to_vec();
        for piece in out.chunks_mut(chunk) {
            encryptor.apply(piece);
        }
        out
    }

    #[test]
    fn chunking_does_not_change_output() {
        let data: Vec<u8> = (0..200u8).collect();
        let reference = encrypt_in_chunks(&data, data.len());
        assert_eq!(encrypt_in_chunks(&data, 16), reference);
        assert_eq!(encrypt_in_chunks(&data, 5), reference);
        assert_ne!(reference, data);
    }

    #[test]
    fn decrypts_across_different_boundaries() {
        let data: Vec<u8> = (0..130u8).map(|b| b.wrapping_mul(31)).collect();
        let mut ct = encrypt_in_chunks(&data, Aes256Cfb::BLOCK_SIZE);
        assert_eq!(ct.len(), data.len());

        let mut decryptor = Aes256Cfb.decryptor(&KEY, &IV).unwrap();
        for piece in ct.chunks_mut(7) {
            decryptor.apply(piece);
        }
        assert_eq!(ct, data);
    }

    #[test]
    fn rejects_wrong_iv_length() {
        assert!(matches!(
            Aes256Cfb.encryptor(&KEY, &[0u8; 8]),
            Err(Error::InvalidArgument(_))
        ));
    }
}
