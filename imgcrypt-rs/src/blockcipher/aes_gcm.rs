// Copyright The imgcrypt-rs Authors.
// SPDX-License-Identifier: Apache-2.0

//! Chunked AES-GCM layer cipher.
//!
//! The layer is cut into chunks of [`CHUNK_SIZE`] bytes, each sealed as its
//! own AES-GCM message with the 16 byte tag appended. The 12 byte nonce of a
//! chunk is `prefix (7) || counter (4, big endian) || last (1)`, where the
//! prefix is drawn fresh for every encryption and recorded in the cipher
//! options under `nonce`. Dropping, reordering or appending chunks makes
//! authentication fail.

use std::io::{self, Read};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes128Gcm, Aes256Gcm, KeyInit, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

use crate::blockcipher::rand::rand_bytes;
use crate::blockcipher::{LayerBlockCipher, LayerBlockCipherOptions};
use crate::{Error, Result};

/// Plaintext bytes sealed per chunk
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Key of the cipher options entry holding the base64 nonce prefix
pub const NONCE_OPT: &str = "nonce";

const TAG_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;
const NONCE_PREFIX_SIZE: usize = 7;

fn seal_failed(e: aes_gcm::Error) -> Error {
    Error::ChunkSeal(format!("{e}"))
}

enum GcmCipher {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl GcmCipher {
    fn seal(&self, nonce: &[u8; NONCE_SIZE], chunk: &[u8]) -> Result<Vec<u8>> {
        let nonce = Nonce::from_slice(nonce);
        let sealed = match self {
            GcmCipher::Aes128(cipher) => cipher.encrypt(nonce, chunk),
            GcmCipher::Aes256(cipher) => cipher.encrypt(nonce, chunk),
        };
        sealed.map_err(seal_failed)
    }

    fn open(&self, nonce: &[u8; NONCE_SIZE], chunk: &[u8]) -> Result<Vec<u8>> {
        let nonce = Nonce::from_slice(nonce);
        let opened = match self {
            GcmCipher::Aes128(cipher) => cipher.decrypt(nonce, chunk),
            GcmCipher::Aes256(cipher) => cipher.decrypt(nonce, chunk),
        };
        opened.map_err(|_| Error::Authentication)
    }
}

/// Hands out the per chunk nonces of one stream. Every nonce is produced
/// once; the sequence ends with the nonce of the last chunk.
struct NonceSequence {
    prefix: [u8; NONCE_PREFIX_SIZE],
    counter: u32,
    finished: bool,
}

impl NonceSequence {
    fn new(prefix: [u8; NONCE_PREFIX_SIZE]) -> Self {
        NonceSequence {
            prefix,
            counter: 0,
            finished: false,
        }
    }

    fn next(&mut self, last: bool) -> Result<[u8; NONCE_SIZE]> {
        if self.finished {
            return Err(Error::InvalidCipherOptions(
                "nonce sequence already finished".to_string(),
            ));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..NONCE_PREFIX_SIZE].copy_from_slice(&self.prefix);
        nonce[NONCE_PREFIX_SIZE..NONCE_SIZE - 1].copy_from_slice(&self.counter.to_be_bytes());
        nonce[NONCE_SIZE - 1] = last as u8;

        if last {
            self.finished = true;
        } else {
            self.counter = self.counter.checked_add(1).ok_or_else(|| {
                Error::InvalidCipherOptions("layer exceeds the chunk counter".to_string())
            })?;
        }

        Ok(nonce)
    }
}

/// CryptedDataReader is the encrypting or decrypting stream over a layer.
/// Besides the data it reports the size and digest of what it produced.
pub struct CryptedDataReader<R: Read> {
    reader: R,
    cipher: GcmCipher,
    nonces: NonceSequence,
    encrypt: bool,
    lookahead: Option<Vec<u8>>,
    chunk: Vec<u8>,
    pos: usize,
    done: bool,
    failed: bool,
    size: u64,
    hasher: Sha256,
    digest: Option<String>,
}

impl<R: Read> CryptedDataReader<R> {
    fn new(reader: R, cipher: GcmCipher, prefix: [u8; NONCE_PREFIX_SIZE], encrypt: bool) -> Self {
        CryptedDataReader {
            reader,
            cipher,
            nonces: NonceSequence::new(prefix),
            encrypt,
            lookahead: None,
            chunk: Vec::new(),
            pos: 0,
            done: false,
            failed: false,
            size: 0,
            hasher: Sha256::new(),
            digest: None,
        }
    }

    /// Number of bytes produced so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// `sha256:<hex>` digest of the produced stream, available once it has
    /// been read to the end.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    fn input_unit(&self) -> usize {
        if self.encrypt {
            CHUNK_SIZE
        } else {
            CHUNK_SIZE + TAG_SIZE
        }
    }

    fn read_unit(&mut self) -> io::Result<Vec<u8>> {
        let unit = self.input_unit();
        let mut buf = Vec::with_capacity(unit);
        (&mut self.reader).take(unit as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    // A chunk is the last one when the input ends right after it. A full
    // chunk needs one unit of lookahead to tell.
    fn next_chunk(&mut self) -> Result<()> {
        let current = match self.lookahead.take() {
            Some(chunk) => chunk,
            None => self.read_unit()?,
        };

        let last = if current.len() < self.input_unit() {
            true
        } else {
            let next = self.read_unit()?;
            let last = next.is_empty();
            if !last {
                self.lookahead = Some(next);
            }
            last
        };

        let nonce = self.nonces.next(last)?;
        self.chunk = if self.encrypt {
            self.cipher.seal(&nonce, &current)?
        } else {
            if current.len() < TAG_SIZE {
                return Err(Error::Authentication);
            }
            self.cipher.open(&nonce, &current)?
        };
        self.pos = 0;
        self.done = last;

        Ok(())
    }

    fn finish(&mut self) {
        if self.digest.is_none() {
            let hash = std::mem::take(&mut self.hasher).finalize();
            self.digest = Some(format!("sha256:{}", hex::encode(hash)));
        }
    }
}

impl<R: Read> Read for CryptedDataReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.failed {
            return Err(Error::Authentication.into_stream());
        }

        while self.pos == self.chunk.len() {
            if self.done {
                self.finish();
                return Ok(0);
            }

            if let Err(e) = self.next_chunk() {
                self.failed = true;
                return Err(e.into_stream());
            }
        }

        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.hasher.update(&buf[..n]);
        self.size += n as u64;
        self.pos += n;

        Ok(n)
    }
}

/// AESGCMBlockCipher implements the chunked AES GCM layer cipher
#[derive(Debug, Clone)]
pub struct AESGCMBlockCipher {
    key_len: usize,
}

impl AESGCMBlockCipher {
    /// Create a cipher for AES GCM with a key of `bits` bits (128 or 256).
    pub fn new(bits: usize) -> Result<AESGCMBlockCipher> {
        match bits {
            128 | 256 => Ok(AESGCMBlockCipher { key_len: bits / 8 }),
            _ => Err(Error::InvalidKeySize(bits)),
        }
    }

    /// Key length in bytes
    pub fn key_len(&self) -> usize {
        self.key_len
    }

    /// generate_key creates a symmetric key
    pub fn generate_key(&self) -> Result<Vec<u8>> {
        let mut key = vec![0; self.key_len];
        rand_bytes(&mut key)?;
        Ok(key)
    }

    fn cipher(&self, symmetric_key: &[u8]) -> Result<GcmCipher> {
        let invalid_length = || Error::InvalidKeyLength {
            actual: symmetric_key.len(),
            expected: self.key_len,
        };
        if symmetric_key.len() != self.key_len {
            return Err(invalid_length());
        }

        let cipher = match self.key_len {
            16 => GcmCipher::Aes128(Box::new(
                Aes128Gcm::new_from_slice(symmetric_key).map_err(|_| invalid_length())?,
            )),
            _ => GcmCipher::Aes256(Box::new(
                Aes256Gcm::new_from_slice(symmetric_key).map_err(|_| invalid_length())?,
            )),
        };

        Ok(cipher)
    }
}

impl<R: Read> LayerBlockCipher<R> for AESGCMBlockCipher {
    type Reader = CryptedDataReader<R>;

    fn encrypt(
        &self,
        input: R,
        mut opts: LayerBlockCipherOptions,
    ) -> Result<(CryptedDataReader<R>, LayerBlockCipherOptions)> {
        let cipher = self.cipher(&opts.symmetric_key)?;

        // never take a nonce from the caller, the key may have been used before
        let mut prefix = [0u8; NONCE_PREFIX_SIZE];
        rand_bytes(&mut prefix)?;
        opts.cipher_options
            .insert(NONCE_OPT.to_string(), STANDARD.encode(prefix));

        Ok((CryptedDataReader::new(input, cipher, prefix, true), opts))
    }

    fn decrypt(&self, input: R, opts: &LayerBlockCipherOptions) -> Result<CryptedDataReader<R>> {
        let cipher = self.cipher(&opts.symmetric_key)?;

        let prefix = opts
            .cipher_options
            .get(NONCE_OPT)
            .ok_or_else(|| Error::InvalidCipherOptions("no nonce provided".to_string()))?;
        let prefix = STANDARD
            .decode(prefix)
            .map_err(|_| Error::InvalidBase64("the layer nonce"))?;
        let prefix: [u8; NONCE_PREFIX_SIZE] = prefix.try_into().map_err(|v: Vec<u8>| {
            Error::InvalidCipherOptions(format!(
                "invalid nonce length of {} bytes; need {} bytes",
                v.len(),
                NONCE_PREFIX_SIZE
            ))
        })?;

        Ok(CryptedDataReader::new(input, cipher, prefix, false))
    }
}
