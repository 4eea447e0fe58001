// Copyright The imgcrypt-rs Authors.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::convert::TryFrom;
use std::fs::File;
use std::path::Path;

use log::debug;
use serde::Deserialize;

use crate::blockcipher::CipherType;
use crate::{Error, Result};

/// Environment variable naming the imgcrypt configuration file
pub const IMGCRYPT_CONFIG_ENV: &str = "IMGCRYPT_CONFIG";

/// Recipient public keys for the JWE scheme
pub const PUBKEYS: &str = "pubkeys";
/// Recipient certificates for PKCS7, or decryption certificates
pub const X509S: &str = "x509s";
pub const GPG_RECIPIENTS: &str = "gpg-recipients";
pub const GPG_PUBKEYRINGFILE: &str = "gpg-pubkeyringfile";
pub const PRIVKEYS: &str = "privkeys";
/// Passwords of `privkeys`, index aligned
pub const PRIVKEYS_PASSWORDS: &str = "privkeys-passwords";
pub const GPG_PRIVATEKEYS: &str = "gpg-privatekeys";
/// Passwords of `gpg-privatekeys`, index aligned
pub const GPG_PRIVATEKEYS_PASSWORDS: &str = "gpg-privatekeys-passwords";

/// What an encryption run does to the recipients of an already sealed layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Operation {
    /// Wrap the layer key for the configured recipients in addition to the
    /// existing ones.
    #[default]
    AddRecipients,

    /// Make the configured recipients the complete recipient set.
    RemoveRecipients,
}

/// EncryptConfig is the container image encryption configuration holding
/// the recipients that will be able to decrypt the layers.
#[derive(Clone, Debug, Default)]
pub struct EncryptConfig {
    /// map holding 'gpg-recipients', 'gpg-pubkeyringfile', 'pubkeys', 'x509s'
    pub param: HashMap<String, Vec<Vec<u8>>>,

    pub operation: Operation,

    /// for adding recipients on an already encrypted image we need the
    /// symmetric keys for the layers so we can wrap them with the recipient's
    /// public key
    pub decrypt_config: Option<DecryptConfig>,

    /// cipher used when a layer is sealed for the first time
    pub cipher_type: CipherType,
}

impl EncryptConfig {
    /// Add JWE recipients given as public keys (DER, PEM or JWK).
    pub fn encrypt_with_jwe(&mut self, pubkeys: Vec<Vec<u8>>) -> Result<()> {
        append(&mut self.param, PUBKEYS, pubkeys);
        Ok(())
    }

    /// Add PKCS7 recipients given as x509 certificates (DER or PEM).
    pub fn encrypt_with_pkcs7(&mut self, x509s: Vec<Vec<u8>>) -> Result<()> {
        append(&mut self.param, X509S, x509s);
        Ok(())
    }

    /// Add GPG recipients together with the public keyring holding their keys.
    pub fn encrypt_with_gpg(
        &mut self,
        gpg_recipients: Vec<Vec<u8>>,
        gpg_pubkey_ring_file: Vec<Vec<u8>>,
    ) -> Result<()> {
        append(&mut self.param, GPG_RECIPIENTS, gpg_recipients);
        append(&mut self.param, GPG_PUBKEYRINGFILE, gpg_pubkey_ring_file);
        Ok(())
    }
}

/// DecryptConfig wraps the parameters map that holds the decryption keys.
#[derive(Clone, Debug, Default)]
pub struct DecryptConfig {
    /// map holding 'privkeys', 'x509s', 'gpg-privatekeys' and the passwords
    pub param: HashMap<String, Vec<Vec<u8>>>,
}

impl DecryptConfig {
    /// Add private keys with their passwords. An empty password marks an
    /// unprotected key.
    pub fn decrypt_with_priv_keys(
        &mut self,
        privkeys: Vec<Vec<u8>>,
        privkeys_passwords: Vec<Vec<u8>>,
    ) -> Result<()> {
        if privkeys.len() != privkeys_passwords.len() {
            return Err(Error::PasswordArrayLengthMismatch);
        }

        append(&mut self.param, PRIVKEYS, privkeys);
        append(&mut self.param, PRIVKEYS_PASSWORDS, privkeys_passwords);
        Ok(())
    }

    /// Add the certificates matching the private keys, needed by PKCS7.
    pub fn decrypt_with_x509s(&mut self, x509s: Vec<Vec<u8>>) -> Result<()> {
        append(&mut self.param, X509S, x509s);
        Ok(())
    }

    /// Add GPG secret keyrings with their passwords.
    pub fn decrypt_with_gpg(
        &mut self,
        gpg_privkeys: Vec<Vec<u8>>,
        gpg_privkeys_passwords: Vec<Vec<u8>>,
    ) -> Result<()> {
        if gpg_privkeys.len() != gpg_privkeys_passwords.len() {
            return Err(Error::PasswordArrayLengthMismatch);
        }

        append(&mut self.param, GPG_PRIVATEKEYS, gpg_privkeys);
        append(
            &mut self.param,
            GPG_PRIVATEKEYS_PASSWORDS,
            gpg_privkeys_passwords,
        );
        Ok(())
    }
}

fn append(param: &mut HashMap<String, Vec<Vec<u8>>>, key: &str, values: Vec<Vec<u8>>) {
    param.entry(key.to_string()).or_default().extend(values);
}

/// CryptoConfig is a common wrapper for EncryptConfig and DecryptConfig that
/// can be passed through functions that share code for both directions.
#[derive(Clone, Debug, Default)]
pub struct CryptoConfig {
    pub encrypt_config: Option<EncryptConfig>,
    pub decrypt_config: Option<DecryptConfig>,
}

impl CryptoConfig {
    pub fn encrypt_config(&self) -> Result<&EncryptConfig> {
        self.encrypt_config
            .as_ref()
            .ok_or(Error::ConfigMissing("EncryptConfig"))
    }

    pub fn decrypt_config(&self) -> Result<&DecryptConfig> {
        self.decrypt_config
            .as_ref()
            .ok_or(Error::ConfigMissing("DecryptConfig"))
    }
}

/// `imgcrypt-rs` configuration information.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImgcryptConfig {
    /// Cipher used to seal layers that are not encrypted yet.
    pub default_cipher: CipherType,
}

impl ImgcryptConfig {
    /// Load the configuration from the file named by `IMGCRYPT_CONFIG`,
    /// or the defaults if the variable is not set.
    pub fn from_env() -> Result<Self> {
        match std::env::var(IMGCRYPT_CONFIG_ENV) {
            Ok(path) => {
                debug!("loading imgcrypt config from {path}");
                ImgcryptConfig::try_from(Path::new(&path))
            }
            Err(_) => Ok(ImgcryptConfig::default()),
        }
    }

    /// An empty EncryptConfig sealing with the configured cipher.
    pub fn encrypt_config(&self) -> EncryptConfig {
        EncryptConfig {
            cipher_type: self.default_cipher,
            ..Default::default()
        }
    }
}

impl TryFrom<&Path> for ImgcryptConfig {
    type Error = Error;

    /// Load `ImgcryptConfig` from a configuration file like:
    ///    {
    ///        "default_cipher": "AEAD_AES_256_GCM"
    ///    }
    fn try_from(config_path: &Path) -> Result<Self> {
        let file = File::open(config_path).map_err(|e| {
            Error::InvalidConfig(format!(
                "failed to open config file {}: {e}",
                config_path.display()
            ))
        })?;

        serde_json::from_reader::<File, ImgcryptConfig>(file)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse config file: {e}")))
    }
}
