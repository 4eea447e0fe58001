// Copyright The imgcrypt-rs Authors.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::io::Read;
use std::sync::LazyLock;

use base64::{engine::general_purpose::STANDARD, Engine};
use log::{debug, warn};
use oci_spec::image::Descriptor;
use zeroize::Zeroizing;

use crate::blockcipher::{CryptedDataReader, LayerBlockCipherHandler, LayerBlockCipherOptions};
use crate::config::{DecryptConfig, EncryptConfig, Operation};
use crate::keywrap::{default_key_wrappers, KeyWrapper};
use crate::layer::LayerInfo;
use crate::{Error, Result};

static DEFAULT_CRYPTER: LazyLock<Result<LayerCrypter>> = LazyLock::new(LayerCrypter::new);

/// WrappedKeys is the parsed form of a key annotation: the base64 encoded
/// wrapped blobs of one scheme, in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WrappedKeys {
    blobs: Vec<String>,
}

impl WrappedKeys {
    /// Parse an annotation value. Base64 never contains `,`, so entries are
    /// split on it; empty entries are dropped.
    pub fn parse(annotation: &str) -> Self {
        let blobs = annotation
            .split(',')
            .filter(|blob| !blob.is_empty())
            .map(str::to_string)
            .collect();
        WrappedKeys { blobs }
    }

    /// The base64 encoded blobs.
    pub fn blobs(&self) -> impl Iterator<Item = &str> {
        self.blobs.iter().map(String::as_str)
    }

    /// Append a raw wrapped blob.
    pub fn push(&mut self, blob: &[u8]) {
        self.blobs.push(STANDARD.encode(blob));
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn to_annotation(&self) -> String {
        self.blobs.join(",")
    }
}

/// Outcome of the search for a key that opens one of the wrapped blobs of a
/// layer.
#[derive(Debug, PartialEq)]
pub enum KeyRecovery {
    /// The serialized layer cipher options
    Recovered(Vec<u8>),

    /// No scheme annotated on the layer has private key material to try
    NothingToTry,

    /// Every attemptable scheme and blob was tried without success
    Exhausted,
}

/// LayerCrypter ties the layer cipher registry to the key wrapping schemes.
/// It is immutable once built.
pub struct LayerCrypter {
    handler: LayerBlockCipherHandler,
    key_wrappers: Vec<Box<dyn KeyWrapper>>,
}

impl LayerCrypter {
    /// Create a LayerCrypter with every key wrapper compiled into the crate.
    pub fn new() -> Result<LayerCrypter> {
        LayerCrypter::with_key_wrappers(default_key_wrappers())
    }

    /// Create a LayerCrypter applying the given key wrappers in order.
    pub fn with_key_wrappers(key_wrappers: Vec<Box<dyn KeyWrapper>>) -> Result<LayerCrypter> {
        Ok(LayerCrypter {
            handler: LayerBlockCipherHandler::new()?,
            key_wrappers,
        })
    }

    fn is_encrypted(&self, annotations: Option<&HashMap<String, String>>) -> bool {
        let Some(annotations) = annotations else {
            return false;
        };

        self.key_wrappers.iter().any(|kw| {
            annotations
                .get(kw.annotation_id())
                .is_some_and(|value| !value.is_empty())
        })
    }

    /// encrypt_layer encrypts the layer and wraps its key for the recipients
    /// in `ec`. Returns the encrypting stream, or `None` when the layer is
    /// already encrypted and only recipients are updated, together with the
    /// key annotations to set on the descriptor.
    pub fn encrypt_layer<R: Read>(
        &self,
        ec: &EncryptConfig,
        layer_reader: R,
        desc: &Descriptor,
    ) -> Result<(Option<CryptedDataReader<R>>, HashMap<String, String>)> {
        let annotations = desc.annotations().as_ref();

        let (reader, opts_data) = if self.is_encrypted(annotations) {
            let dc = ec
                .decrypt_config
                .as_ref()
                .ok_or(Error::ConfigMissing("DecryptConfig"))?;
            debug!("layer {} is already encrypted, updating recipients", desc.digest());

            (None, Zeroizing::new(self.decrypt_layer_key_opts_data(dc, desc)?))
        } else {
            let symmetric_key = self.handler.generate_key(ec.cipher_type)?;
            let (reader, opts) = self.handler.encrypt(
                layer_reader,
                ec.cipher_type,
                LayerBlockCipherOptions::new(symmetric_key),
            )?;

            (Some(reader), Zeroizing::new(opts.to_json()?))
        };

        let mut new_annotations = HashMap::new();
        for key_wrapper in &self.key_wrappers {
            let annotation_id = key_wrapper.annotation_id();

            let mut wrapped_keys = match (ec.operation, annotations) {
                (Operation::AddRecipients, Some(annotations)) => annotations
                    .get(annotation_id)
                    .map(|value| WrappedKeys::parse(value))
                    .unwrap_or_default(),
                _ => WrappedKeys::default(),
            };

            if let Some(blob) = key_wrapper.wrap_keys(ec, &opts_data)? {
                wrapped_keys.push(&blob);
            }

            if !wrapped_keys.is_empty() {
                new_annotations.insert(annotation_id.to_string(), wrapped_keys.to_annotation());
            }
        }

        if new_annotations.is_empty() {
            return Err(Error::NoRecipientsConfigured);
        }

        Ok((reader, new_annotations))
    }

    /// decrypt_layer recovers the layer key from the descriptor annotations
    /// with the private keys in `dc` and returns the decrypting stream.
    pub fn decrypt_layer<R: Read>(
        &self,
        dc: &DecryptConfig,
        layer_reader: R,
        desc: &Descriptor,
    ) -> Result<CryptedDataReader<R>> {
        let opts_data = Zeroizing::new(self.decrypt_layer_key_opts_data(dc, desc)?);
        let opts = LayerBlockCipherOptions::from_json(&opts_data)?;

        self.handler.decrypt(layer_reader, &opts)
    }

    /// decrypt_layer_key_opts_data returns the serialized cipher options of
    /// the layer, trying one key wrapper after the other.
    pub fn decrypt_layer_key_opts_data(
        &self,
        dc: &DecryptConfig,
        desc: &Descriptor,
    ) -> Result<Vec<u8>> {
        match self.recover_layer_key(dc, desc.annotations().as_ref()) {
            KeyRecovery::Recovered(opts_data) => Ok(opts_data),
            KeyRecovery::NothingToTry => Err(Error::MissingPrivateKeyMaterial),
            KeyRecovery::Exhausted => Err(Error::KeyExhausted),
        }
    }

    /// recover_layer_key searches the wrapped blobs of every scheme that has
    /// private key material in `dc`. Blobs that fail to decode or unwrap are
    /// skipped; the first one that opens wins.
    pub fn recover_layer_key(
        &self,
        dc: &DecryptConfig,
        annotations: Option<&HashMap<String, String>>,
    ) -> KeyRecovery {
        let Some(annotations) = annotations else {
            return KeyRecovery::NothingToTry;
        };

        let mut attempted = false;
        for key_wrapper in &self.key_wrappers {
            let annotation_id = key_wrapper.annotation_id();
            let Some(value) = annotations.get(annotation_id) else {
                continue;
            };

            if key_wrapper.no_possible_keys(&dc.param) {
                debug!("{annotation_id}: no private key material to try");
                continue;
            }
            attempted = true;

            for (idx, b64_blob) in WrappedKeys::parse(value).blobs().enumerate() {
                let blob = match STANDARD.decode(b64_blob) {
                    Ok(blob) => blob,
                    Err(e) => {
                        warn!("{annotation_id}: skipping wrapped key {idx}, invalid base64: {e}");
                        continue;
                    }
                };

                match key_wrapper.unwrap_keys(dc, &blob) {
                    Ok(opts_data) if !opts_data.is_empty() => {
                        return KeyRecovery::Recovered(opts_data)
                    }
                    Ok(_) => debug!("{annotation_id}: wrapped key {idx} holds no data"),
                    Err(e) => debug!("{annotation_id}: wrapped key {idx} not opened: {e}"),
                }
            }
        }

        if attempted {
            KeyRecovery::Exhausted
        } else {
            KeyRecovery::NothingToTry
        }
    }

    /// layer_info reports how the layer `id` described by `desc` is encrypted.
    pub fn layer_info(&self, id: u32, desc: &Descriptor) -> LayerInfo {
        let mut info = LayerInfo {
            id,
            digest: desc.digest().to_string(),
            size: desc.size(),
            ..Default::default()
        };

        let Some(annotations) = desc.annotations().as_ref() else {
            return info;
        };

        for key_wrapper in &self.key_wrappers {
            let annotation_id = key_wrapper.annotation_id();
            let Some(value) = annotations.get(annotation_id).filter(|v| !v.is_empty()) else {
                continue;
            };

            let scheme = annotation_id.rsplit('.').next().unwrap_or(annotation_id);
            info.encryption.push(scheme.to_string());
            if let Some(recipients) = key_wrapper.recipients(value) {
                info.recipients.extend(recipients);
            }
        }

        info
    }
}

fn default_crypter() -> Result<&'static LayerCrypter> {
    DEFAULT_CRYPTER
        .as_ref()
        .map_err(|e| Error::InvalidConfig(format!("layer crypter unavailable: {e}")))
}

/// encrypt_layer encrypts the layer by running one key wrapper after the other
pub fn encrypt_layer<R: Read>(
    ec: &EncryptConfig,
    layer_reader: R,
    desc: &Descriptor,
) -> Result<(Option<CryptedDataReader<R>>, HashMap<String, String>)> {
    default_crypter()?.encrypt_layer(ec, layer_reader, desc)
}

/// decrypt_layer decrypts a layer trying one key wrapper after the other to
/// see whether it can apply the provided private keys
pub fn decrypt_layer<R: Read>(
    dc: &DecryptConfig,
    layer_reader: R,
    desc: &Descriptor,
) -> Result<CryptedDataReader<R>> {
    default_crypter()?.decrypt_layer(dc, layer_reader, desc)
}

pub fn decrypt_layer_key_opts_data(dc: &DecryptConfig, desc: &Descriptor) -> Result<Vec<u8>> {
    default_crypter()?.decrypt_layer_key_opts_data(dc, desc)
}
