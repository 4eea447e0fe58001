// Copyright The imgcrypt-rs Authors.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as, DefaultOnNull};
use strum::{AsRefStr, Display, EnumString};
use zeroize::Zeroize;

use crate::{Error, Result};

pub mod aes_gcm;
pub(crate) mod rand;

pub use self::aes_gcm::{AESGCMBlockCipher, CryptedDataReader};

/// Key of the cipher options entry naming the layer cipher type
pub const CIPHER_TYPE_OPT: &str = "type";

/// LayerCipherType is the ciphertype as specified in the layer metadata
#[derive(
    EnumString,
    AsRefStr,
    Display,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
)]
pub enum CipherType {
    #[strum(serialize = "AEAD_AES_128_GCM")]
    #[serde(rename = "AEAD_AES_128_GCM")]
    Aes128Gcm,

    #[default]
    #[strum(serialize = "AEAD_AES_256_GCM")]
    #[serde(rename = "AEAD_AES_256_GCM")]
    Aes256Gcm,
}

impl CipherType {
    /// Parse a cipher type tag as recorded in the cipher options.
    pub fn parse(typ: &str) -> Result<Self> {
        typ.parse()
            .map_err(|_| Error::UnsupportedCipherType(typ.to_string()))
    }

    pub fn key_bits(&self) -> usize {
        match self {
            CipherType::Aes128Gcm => 128,
            CipherType::Aes256Gcm => 256,
        }
    }
}

/// LayerBlockCipherOptions holds the symmetric key of a layer and the cipher
/// metadata needed to decrypt it. Its JSON form is the opaque payload that
/// the key wrapping schemes seal for the recipients.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct LayerBlockCipherOptions {
    /// symmetric_key represents the symmetric key used for encryption/decryption
    #[serde_as(as = "Base64")]
    #[serde(rename = "SymmetricKey", alias = "symkey")]
    pub symmetric_key: Vec<u8>,

    /// cipher_options contains the cipher metadata used for encryption/decryption.
    /// It is populated by encrypt calls.
    #[serde_as(as = "DefaultOnNull")]
    #[serde(rename = "CipherOptions", alias = "cipheroptions", default)]
    pub cipher_options: BTreeMap<String, String>,
}

impl LayerBlockCipherOptions {
    pub fn new(symmetric_key: Vec<u8>) -> Self {
        LayerBlockCipherOptions {
            symmetric_key,
            cipher_options: BTreeMap::new(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|source| Error::InvalidOptsData { source })
    }

    pub fn from_json(opts_data: &[u8]) -> Result<Self> {
        serde_json::from_slice(opts_data).map_err(|source| Error::InvalidOptsData { source })
    }
}

impl Drop for LayerBlockCipherOptions {
    fn drop(&mut self) {
        self.symmetric_key.zeroize();
    }
}

/// LayerBlockCipher defines the interface for setting up encrypt/decrypt
/// streams over layer data for a specific algorithm
pub trait LayerBlockCipher<R: Read> {
    type Reader: Read;

    /// encrypt takes in layer data and the LayerBlockCipherOptions holding the
    /// key, and returns the ciphertext stream and the completed options
    fn encrypt(
        &self,
        input: R,
        opts: LayerBlockCipherOptions,
    ) -> Result<(Self::Reader, LayerBlockCipherOptions)>;

    /// decrypt takes in layer ciphertext and the options recorded at
    /// encryption time, and returns the plaintext stream
    fn decrypt(&self, input: R, opts: &LayerBlockCipherOptions) -> Result<Self::Reader>;
}

/// LayerBlockCipherHandler is the registry of the supported layer ciphers.
/// It is immutable once built and can be shared between threads.
#[derive(Debug)]
pub struct LayerBlockCipherHandler {
    cipher_map: HashMap<CipherType, AESGCMBlockCipher>,
}

impl LayerBlockCipherHandler {
    /// Create a LayerBlockCipherHandler with the AES GCM 128 and 256 ciphers
    pub fn new() -> Result<LayerBlockCipherHandler> {
        let mut cipher_map = HashMap::new();
        cipher_map.insert(CipherType::Aes128Gcm, AESGCMBlockCipher::new(128)?);
        cipher_map.insert(CipherType::Aes256Gcm, AESGCMBlockCipher::new(256)?);

        Ok(LayerBlockCipherHandler { cipher_map })
    }

    fn cipher(&self, typ: CipherType) -> Result<&AESGCMBlockCipher> {
        self.cipher_map
            .get(&typ)
            .ok_or_else(|| Error::UnsupportedCipherType(typ.to_string()))
    }

    /// generate_key creates a fresh symmetric key for the given cipher type
    pub fn generate_key(&self, typ: CipherType) -> Result<Vec<u8>> {
        self.cipher(typ)?.generate_key()
    }

    /// encrypt is the handler for the layer encryption routine
    pub fn encrypt<R: Read>(
        &self,
        plain_data_reader: R,
        typ: CipherType,
        opts: LayerBlockCipherOptions,
    ) -> Result<(CryptedDataReader<R>, LayerBlockCipherOptions)> {
        let (reader, mut opts) = self.cipher(typ)?.encrypt(plain_data_reader, opts)?;
        opts.cipher_options
            .insert(CIPHER_TYPE_OPT.to_string(), typ.to_string());

        Ok((reader, opts))
    }

    /// decrypt is the handler for the layer decryption routine
    pub fn decrypt<R: Read>(
        &self,
        enc_data_reader: R,
        opts: &LayerBlockCipherOptions,
    ) -> Result<CryptedDataReader<R>> {
        let typ = opts
            .cipher_options
            .get(CIPHER_TYPE_OPT)
            .ok_or(Error::CipherTypeAnnotationMissing)?;
        let typ = CipherType::parse(typ)?;

        self.cipher(typ)?.decrypt(enc_data_reader, opts)
    }

    /// Encrypt a whole in-memory layer.
    pub fn encrypt_bytes(
        &self,
        plain_data: &[u8],
        typ: CipherType,
        opts: LayerBlockCipherOptions,
    ) -> Result<(Vec<u8>, LayerBlockCipherOptions)> {
        let (reader, opts) = self.encrypt(plain_data, typ, opts)?;
        Ok((read_all(reader)?, opts))
    }

    /// Decrypt a whole in-memory layer.
    pub fn decrypt_bytes(&self, enc_data: &[u8], opts: &LayerBlockCipherOptions) -> Result<Vec<u8>> {
        read_all(self.decrypt(enc_data, opts)?)
    }
}

/// Drain a layer stream, surfacing the typed error a failing chunk carries.
pub fn read_all(mut reader: impl Read) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .map_err(Error::from_stream)?;
    Ok(data)
}
