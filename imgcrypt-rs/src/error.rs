// Copyright The imgcrypt-rs Authors.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} must not be empty")]
    ConfigMissing(&'static str),

    #[error("unsupported cipher type {0}")]
    UnsupportedCipherType(String),

    #[error("no cipher type provided in the cipher options")]
    CipherTypeAnnotationMissing,

    #[error("AES GCM bit count {0} not supported, must be 128 or 256")]
    InvalidKeySize(usize),

    #[error("invalid key length of {actual} bytes; need {expected} bytes")]
    InvalidKeyLength { actual: usize, expected: usize },

    #[error("invalid cipher options: {0}")]
    InvalidCipherOptions(String),

    #[error("failed to seal layer chunk: {0}")]
    ChunkSeal(String),

    #[error("failed to authenticate layer data, the key is wrong or the data was tampered with")]
    Authentication,

    #[error("no encryptor found to handle encryption, no recipients configured")]
    NoRecipientsConfigured,

    #[error("{scheme}: malformed wrapped key")]
    BlobParse {
        scheme: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("{scheme}: no suitable private key found for decryption")]
    PrivateKeyMismatch { scheme: &'static str },

    #[error("missing private key needed for decryption")]
    MissingPrivateKeyMaterial,

    #[error("no suitable key found for decrypting this layer, none of the private keys could be used")]
    KeyExhausted,

    #[error("private key password array length must be same as that of private keys")]
    PasswordArrayLengthMismatch,

    #[error("unknown decryption key type")]
    UnknownKeyMaterialType,

    #[error("{context}: invalid key material")]
    InvalidKeyMaterial {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("could not base64 decode {0}")]
    InvalidBase64(&'static str),

    #[error("could not (de)serialize cipher options")]
    InvalidOptsData {
        #[source]
        source: serde_json::Error,
    },

    #[error("{scheme}: failed to wrap keys")]
    WrapKeysFailed {
        scheme: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to generate random bytes")]
    Random {
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to load configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Unwraps an `io::Error` produced by a layer stream back into the typed
    /// error it carries, if any.
    pub fn from_stream(err: std::io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::Io(err);
        }

        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(typed)) => *typed,
            Some(Err(other)) => Error::Io(std::io::Error::new(kind, other)),
            None => Error::Io(kind.into()),
        }
    }

    pub(crate) fn into_stream(self) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::InvalidData, self)
    }
}
