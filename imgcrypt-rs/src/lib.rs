// Copyright The imgcrypt-rs Authors.
// SPDX-License-Identifier: Apache-2.0

//! # imgcrypt-rs
//!
//! Envelope encryption of OCI image layers. A layer is sealed with a random
//! per-layer AES-GCM key, and the serialized key options are wrapped for each
//! recipient by one or more key wrapping schemes. The wrapped keys travel as
//! annotations on the layer descriptor.
//!
//! ## Components
//!
//! - `blockcipher`: chunked AES-GCM layer ciphers and the cipher registry
//! - `keywrap`: the key wrapping schemes (`jwe`, `pkcs7`)
//! - `encryption`: the layer encrypt/decrypt orchestration
//! - `utils`: parsing and classification of key material
//! - `config`: encryption and decryption parameters

pub mod blockcipher;
pub mod config;
pub mod encryption;
pub mod error;
pub mod keywrap;
pub mod layer;
pub mod spec;
pub mod utils;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) mod testing;
