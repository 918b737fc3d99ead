//! Hybrid KEM/DEM envelope.
//!
//! A fresh session secret is encapsulated with the attribute-based scheme and
//! hashed into the key of a symmetric stream cipher that encrypts the
//! payload. Wire layout, all integers little-endian:
//!
//! ```text
//! offset 0        IV                      BLOCK_SIZE bytes
//! offset B        encapsulated key length u64
//! offset B+8      encapsulated key        L bytes
//! offset B+8+L    payload ciphertext      same length as the plaintext
//! ```
//!
//! Decryption runs `Start -> HeaderRead -> KeyDecapsulated ->
//! StreamDecrypting -> Done`. A key that does not satisfy the predicate stops
//! at `KeyDecapsulated` with [`Error::DecryptionDenied`], before a single
//! payload byte is read from the input.

use std::io::{self, Read, Write};

use rand::{CryptoRng, Rng};

use crate::dem::{Aes256Cfb, ChunkTransform, SymmetricCipher};
use crate::error::{Error, Result};
use crate::scheme::EncapsulationScheme;
use crate::types::SessionSecret;

/// Size of the encapsulated-key length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 8;

/// Fixed-size chunks read lazily from a byte stream.
///
/// Every chunk is exactly `chunk_size` bytes except possibly the last one.
pub struct Chunks<R> {
    reader: R,
    chunk_size: usize,
    done: bool,
}

impl<R: Read> Chunks<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Chunks {
            reader,
            chunk_size: chunk_size.max(1),
            done: false,
        }
    }
}

impl<R: Read> Iterator for Chunks<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut chunk = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            match self.reader.read(&mut chunk[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        if filled < self.chunk_size {
            self.done = true;
        }
        if filled == 0 {
            return None;
        }
        chunk.truncate(filled);
        Some(Ok(chunk))
    }
}

/// Everything in front of the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub iv: Vec<u8>,
    pub encapsulated_key: Vec<u8>,
}

impl Header {
    pub fn encoded_len(&self) -> usize {
        self.iv.len() + LENGTH_PREFIX_SIZE + self.encapsulated_key.len()
    }

    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.iv)?;
        out.write_all(&(self.encapsulated_key.len() as u64).to_le_bytes())?;
        out.write_all(&self.encapsulated_key)
    }

    /// Read a header whose IV is `iv_len` bytes long, leaving `input`
    /// positioned on the first payload byte.
    pub fn read_from<R: Read + ?Sized>(input: &mut R, iv_len: usize) -> Result<Self> {
        let mut iv = vec![0u8; iv_len];
        read_header_field(input, &mut iv, "IV")?;

        let mut length = [0u8; LENGTH_PREFIX_SIZE];
        read_header_field(input, &mut length, "encapsulated key length")?;
        let declared = u64::from_le_bytes(length);

        let mut encapsulated_key = Vec::new();
        input.take(declared).read_to_end(&mut encapsulated_key)?;
        if encapsulated_key.len() as u64 != declared {
            return Err(Error::MalformedCiphertext(format!(
                "declared encapsulated key length {declared} exceeds the {} bytes available",
                encapsulated_key.len()
            )));
        }

        Ok(Header {
            iv,
            encapsulated_key,
        })
    }
}

fn read_header_field<R: Read + ?Sized>(input: &mut R, buf: &mut [u8], field: &str) -> Result<()> {
    input.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            Error::MalformedCiphertext(format!("truncated header: missing {field}"))
        }
        _ => Error::Io(e),
    })
}

/// Lazily decrypted payload of an opened envelope.
pub struct PlaintextChunks<R, D> {
    chunks: Chunks<R>,
    decryptor: D,
}

impl<R: Read, D: ChunkTransform> Iterator for PlaintextChunks<R, D> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunks.next()?;
        Some(chunk.map_err(Error::from).map(|mut chunk| {
            self.decryptor.apply(&mut chunk);
            tracing::trace!(len = chunk.len(), "decrypted chunk");
            chunk
        }))
    }
}

/// Composes an [`EncapsulationScheme`] with a [`SymmetricCipher`].
#[derive(Clone, Debug, Default)]
pub struct Envelope<S, C = Aes256Cfb> {
    scheme: S,
    cipher: C,
}

impl<S: EncapsulationScheme> Envelope<S, Aes256Cfb> {
    pub fn new(scheme: S) -> Self {
        Envelope {
            scheme,
            cipher: Aes256Cfb,
        }
    }
}

impl<S, C> Envelope<S, C>
where
    S: EncapsulationScheme,
    C: SymmetricCipher,
{
    pub fn with_cipher(scheme: S, cipher: C) -> Self {
        Envelope { scheme, cipher }
    }

    pub fn scheme(&self) -> &S {
        &self.scheme
    }

    /// Encrypt `plaintext` under `input`, streaming the envelope into `out`.
    ///
    /// # Arguments
    /// * `mpk` - Master public key of the scheme
    /// * `plaintext` - Read in `BLOCK_SIZE` chunks, never buffered whole
    /// * `input` - Policy (ciphertext-policy) or attributes (key-policy)
    /// * `out` - Receives the header, then each encrypted chunk as produced
    /// * `rng` - Source of the session secret, the IV and the scheme's randomness
    ///
    /// # Returns
    /// * Number of bytes written
    pub fn encrypt_to<P, W, R>(
        &self,
        mpk: &S::PublicKey,
        plaintext: P,
        input: &S::EncryptionInput,
        mut out: W,
        rng: &mut R,
    ) -> Result<u64>
    where
        P: Read,
        W: Write,
        R: Rng + CryptoRng,
    {
        let _span = tracing::debug_span!("envelope_encrypt", scheme = S::NAME).entered();

        let secret = SessionSecret::random(rng);
        let encapsulated_key = self.scheme.encapsulate(mpk, &secret, input, rng)?;
        let key = secret.symmetric_key()?;
        drop(secret);

        let mut iv = vec![0u8; C::BLOCK_SIZE];
        rng.fill_bytes(&mut iv);
        let mut encryptor = self.cipher.encryptor(&key, &iv)?;

        let header = Header {
            iv,
            encapsulated_key,
        };
        header.write_to(&mut out)?;
        let mut written = header.encoded_len() as u64;
        tracing::debug!(header = written, "wrote envelope header");

        for chunk in Chunks::new(plaintext, C::BLOCK_SIZE) {
            let mut chunk = chunk?;
            encryptor.apply(&mut chunk);
            out.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        out.flush()?;

        tracing::debug!(bytes = written, "envelope encrypted");
        Ok(written)
    }

    /// Encrypt into a fresh buffer.
    pub fn encrypt<P, R>(
        &self,
        mpk: &S::PublicKey,
        plaintext: P,
        input: &S::EncryptionInput,
        rng: &mut R,
    ) -> Result<Vec<u8>>
    where
        P: Read,
        R: Rng + CryptoRng,
    {
        let mut out = Vec::new();
        self.encrypt_to(mpk, plaintext, input, &mut out, rng)?;
        Ok(out)
    }

    /// Read the header and decapsulate, returning the payload as a lazy
    /// sequence of plaintext chunks.
    ///
    /// Fails with [`Error::DecryptionDenied`] without touching the payload
    /// when `dk` does not satisfy the ciphertext predicate.
    pub fn open<P: Read>(
        &self,
        mpk: &S::PublicKey,
        dk: &S::DecapsulationKey,
        mut ciphertext: P,
    ) -> Result<PlaintextChunks<P, C::Decryptor>> {
        let _span = tracing::debug_span!("envelope_decrypt", scheme = S::NAME).entered();

        let header = Header::read_from(&mut ciphertext, C::BLOCK_SIZE)?;
        tracing::debug!(
            encapsulated_key = header.encapsulated_key.len(),
            "header read"
        );

        let secret = match self.scheme.decapsulate(mpk, dk, &header.encapsulated_key)? {
            Some(secret) => secret,
            None => {
                tracing::warn!("decapsulation key does not satisfy the ciphertext predicate");
                return Err(Error::DecryptionDenied);
            }
        };
        let key = secret.symmetric_key()?;
        drop(secret);
        tracing::debug!("key decapsulated");

        let decryptor = self.cipher.decryptor(&key, &header.iv)?;
        Ok(PlaintextChunks {
            chunks: Chunks::new(ciphertext, C::BLOCK_SIZE),
            decryptor,
        })
    }

    /// Decrypt the whole payload. Nothing is returned unless every step,
    /// including every payload read, succeeds.
    pub fn decrypt<P: Read>(
        &self,
        mpk: &S::PublicKey,
        dk: &S::DecapsulationKey,
        ciphertext: P,
    ) -> Result<Vec<u8>> {
        let mut plaintext = Vec::new();
        for chunk in self.open(mpk, dk, ciphertext)? {
            plaintext.extend_from_slice(&chunk?);
        }
        Ok(plaintext)
    }

    /// Decrypt, streaming plaintext chunks into `out` as they are produced.
    ///
    /// Denial and header errors happen before anything is written. A read
    /// error in the middle of the payload leaves the chunks decrypted so far
    /// in `out`; callers wanting all-or-nothing output use [`decrypt`].
    ///
    /// [`decrypt`]: Envelope::decrypt
    pub fn decrypt_to<P: Read, W: Write>(
        &self,
        mpk: &S::PublicKey,
        dk: &S::DecapsulationKey,
        ciphertext: P,
        mut out: W,
    ) -> Result<u64> {
        let mut written = 0u64;
        for chunk in self.open(mpk, dk, ciphertext)? {
            let chunk = chunk?;
            out.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        out.flush()?;
        Ok(written)
    }
}
