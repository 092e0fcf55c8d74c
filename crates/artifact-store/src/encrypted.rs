//! Transparent artifact encryption.
//!
//! Artifacts are AES-256-GCM sealed in frames so that arbitrarily large dumps can be streamed.
//!
//! Layout: `magic (4) | nonce prefix (8) | frame*` where each frame is a big endian `u32`
//! header (high bit marks the final frame, the rest is the ciphertext length) followed by the
//! ciphertext. The nonce of a frame is the prefix followed by the frame counter, and the
//! associated data binds the counter and final flag, so reordered, dropped or truncated frames
//! fail to decrypt.

use std::io::{self, ErrorKind, Read, Write};

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, Payload, consts::U12},
};
use rand::RngCore;
use tracing::debug;

use crate::{ArtifactReader, ArtifactWriter, StorageError, StorageProvider};

const MAGIC: &[u8; 4] = b"RBE1";
const KEY_CONTEXT: &str = "runtime-backup 2024-10 artifact encryption key";
const NONCE_PREFIX_BYTES: usize = 8;
const FRAME_PLAINTEXT_BYTES: usize = 64 * 1024;
const TAG_BYTES: usize = 16;
const FINAL_FRAME: u32 = 1 << 31;

/// Wraps another provider, encrypting everything written and decrypting everything read.
///
/// The wrapped provider only ever sees ciphertext.
pub struct EncryptedProvider<P> {
    inner: P,
    key: [u8; 32],
}

impl<P: StorageProvider> EncryptedProvider<P> {
    /// Wrap `inner`, deriving the cipher key from `key`.
    pub fn new(inner: P, key: &str) -> Result<Self, StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey);
        }

        Ok(Self {
            inner,
            key: blake3::derive_key(KEY_CONTEXT, key.as_bytes()),
        })
    }

    /// The wrapped provider.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }
}

impl<P: StorageProvider> StorageProvider for EncryptedProvider<P> {
    fn writer(&self, path: &[&str]) -> Result<Box<dyn ArtifactWriter>, StorageError> {
        let mut inner = self.inner.writer(path)?;

        let mut nonce_prefix = [0u8; NONCE_PREFIX_BYTES];
        rand::thread_rng().fill_bytes(&mut nonce_prefix);

        inner
            .write_all(MAGIC)
            .and_then(|()| inner.write_all(&nonce_prefix))
            .map_err(|e| StorageError::Io(e, "write encryption header"))?;

        debug!("Encrypting artifact {path:?}");

        Ok(Box::new(EncryptingWriter {
            inner,
            frames: FrameCipher::new(self.cipher(), nonce_prefix),
            buffer: Vec::with_capacity(FRAME_PLAINTEXT_BYTES),
        }))
    }

    fn reader(&self, path: &[&str]) -> Result<ArtifactReader, StorageError> {
        let mut inner = self.inner.reader(path)?;

        let mut header = [0u8; MAGIC.len() + NONCE_PREFIX_BYTES];
        inner.read_exact(&mut header).map_err(|error| match error.kind() {
            ErrorKind::UnexpectedEof => StorageError::NotEncrypted,
            _ => StorageError::Io(error, "read encryption header"),
        })?;

        let (magic, prefix) = header.split_at(MAGIC.len());
        if magic != MAGIC {
            return Err(StorageError::NotEncrypted);
        }

        let mut nonce_prefix = [0u8; NONCE_PREFIX_BYTES];
        nonce_prefix.copy_from_slice(prefix);

        debug!("Decrypting artifact {path:?}");

        Ok(Box::new(DecryptingReader {
            inner,
            frames: FrameCipher::new(self.cipher(), nonce_prefix),
            plaintext: Vec::new(),
            position: 0,
            finished: false,
        }))
    }
}

struct FrameCipher {
    cipher: Aes256Gcm,
    nonce_prefix: [u8; NONCE_PREFIX_BYTES],
    counter: u32,
}

impl FrameCipher {
    fn new(cipher: Aes256Gcm, nonce_prefix: [u8; NONCE_PREFIX_BYTES]) -> Self {
        Self {
            cipher,
            nonce_prefix,
            counter: 0,
        }
    }

    fn nonce(&self) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        let (prefix, counter) = nonce.split_at_mut(NONCE_PREFIX_BYTES);
        prefix.copy_from_slice(&self.nonce_prefix);
        counter.copy_from_slice(&self.counter.to_be_bytes());
        nonce
    }

    fn associated_data(&self, last: bool) -> [u8; 5] {
        let mut aad = [0u8; 5];
        let (counter, flag) = aad.split_at_mut(4);
        counter.copy_from_slice(&self.counter.to_be_bytes());
        flag.fill(u8::from(last));
        aad
    }

    fn advance(&mut self) -> Result<(), StorageError> {
        self.counter = self.counter.checked_add(1).ok_or(StorageError::Encrypt)?;
        Ok(())
    }

    fn seal(&mut self, plaintext: &[u8], last: bool) -> Result<Vec<u8>, StorageError> {
        let nonce = self.nonce();
        let aad = self.associated_data(last);
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::<U12>::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| StorageError::Encrypt)?;

        self.advance()?;
        Ok(ciphertext)
    }

    fn open(&mut self, ciphertext: &[u8], last: bool) -> Result<Vec<u8>, StorageError> {
        let nonce = self.nonce();
        let aad = self.associated_data(last);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::<U12>::from_slice(&nonce),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| StorageError::Decrypt)?;

        self.advance().map_err(|_| StorageError::Decrypt)?;
        Ok(plaintext)
    }
}

struct EncryptingWriter {
    inner: Box<dyn ArtifactWriter>,
    frames: FrameCipher,
    buffer: Vec<u8>,
}

impl EncryptingWriter {
    fn write_frame(&mut self, length: usize, last: bool) -> Result<(), StorageError> {
        let plaintext: Vec<u8> = self.buffer.drain(..length).collect();
        let ciphertext = self.frames.seal(&plaintext, last)?;

        let mut header = u32::try_from(ciphertext.len()).map_err(|_| StorageError::Encrypt)?;
        if last {
            header |= FINAL_FRAME;
        }

        self.inner
            .write_all(&header.to_be_bytes())
            .and_then(|()| self.inner.write_all(&ciphertext))
            .map_err(|e| StorageError::Io(e, "write encrypted frame"))
    }
}

impl Write for EncryptingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        // The last frame is only sealed on finish, so always keep something buffered.
        while self.buffer.len() > FRAME_PLAINTEXT_BYTES {
            self.write_frame(FRAME_PLAINTEXT_BYTES, false)?;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl ArtifactWriter for EncryptingWriter {
    fn finish(mut self: Box<Self>) -> Result<(), StorageError> {
        let remaining = self.buffer.len();
        self.write_frame(remaining, true)?;
        self.inner.finish()
    }
}

struct DecryptingReader {
    inner: ArtifactReader,
    frames: FrameCipher,
    plaintext: Vec<u8>,
    position: usize,
    finished: bool,
}

impl DecryptingReader {
    fn read_frame(&mut self) -> Result<(), StorageError> {
        let mut header = [0u8; 4];
        self.inner
            .read_exact(&mut header)
            .map_err(|error| match error.kind() {
                ErrorKind::UnexpectedEof => StorageError::Decrypt,
                _ => StorageError::Io(error, "read encrypted frame"),
            })?;

        let header = u32::from_be_bytes(header);
        let last = header & FINAL_FRAME != 0;
        let length = usize::try_from(header & !FINAL_FRAME).map_err(|_| StorageError::Decrypt)?;
        if length > FRAME_PLAINTEXT_BYTES + TAG_BYTES {
            return Err(StorageError::Decrypt);
        }

        let mut ciphertext = vec![0u8; length];
        self.inner
            .read_exact(&mut ciphertext)
            .map_err(|error| match error.kind() {
                ErrorKind::UnexpectedEof => StorageError::Decrypt,
                _ => StorageError::Io(error, "read encrypted frame"),
            })?;

        self.plaintext = self.frames.open(&ciphertext, last)?;
        self.position = 0;

        if last {
            // Nothing may follow the final frame.
            let mut trailing = [0u8; 1];
            let read = self
                .inner
                .read(&mut trailing)
                .map_err(|e| StorageError::Io(e, "read encrypted frame"))?;
            if read != 0 {
                return Err(StorageError::Decrypt);
            }

            self.finished = true;
        }

        Ok(())
    }
}

impl Read for DecryptingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let available = self.plaintext.get(self.position..).unwrap_or_default();
            if !available.is_empty() {
                let count = available.len().min(buf.len());
                buf[..count].copy_from_slice(&available[..count]);
                self.position += count;
                return Ok(count);
            }

            if self.finished {
                return Ok(0);
            }

            self.read_frame()?;
        }
    }
}
