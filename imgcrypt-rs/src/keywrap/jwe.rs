// Copyright The imgcrypt-rs Authors.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use anyhow::anyhow;
use josekit::jwe::{
    deserialize_json, serialize_general_json, JweDecrypter, JweEncrypter, JweHeader, JweHeaderSet,
    ECDH_ES_A256KW, RSA_OAEP,
};
use josekit::jwk::Jwk;
use log::debug;
use openssl::pkey::Id;

use crate::config::{DecryptConfig, EncryptConfig, PRIVKEYS, PRIVKEYS_PASSWORDS, PUBKEYS};
use crate::keywrap::KeyWrapper;
use crate::spec::ANNOTATION_KEYS_JWE;
use crate::utils::{parse_private_key, parse_public_key, ParsedKey};
use crate::{Error, Result};

const SCHEME: &str = "JWE";

/// A Jwe keywrapper
#[derive(Debug)]
pub struct JweKeyWrapper {}

fn is_ec_jwk(jwk: &serde_json::Map<String, serde_json::Value>) -> bool {
    jwk.get("kty").and_then(|kty| kty.as_str()) == Some("EC")
}

// Get the encrypter from public key: ECDH-ES+A256KW for EC keys, RSA-OAEP otherwise
fn encrypter(pubkey: &[u8]) -> anyhow::Result<Box<dyn JweEncrypter>> {
    let encrypter: Box<dyn JweEncrypter> = match parse_public_key(pubkey)? {
        ParsedKey::Pkey(key) => {
            let der = key.public_key_to_der()?;
            match key.id() {
                Id::EC => Box::new(ECDH_ES_A256KW.encrypter_from_der(&der)?),
                Id::RSA => Box::new(RSA_OAEP.encrypter_from_der(&der)?),
                id => return Err(anyhow!("unsupported public key type {id:?}")),
            }
        }
        ParsedKey::Jwk(map) => {
            let ec = is_ec_jwk(&map);
            let jwk = Jwk::from_map(map)?;
            if ec {
                Box::new(ECDH_ES_A256KW.encrypter_from_jwk(&jwk)?)
            } else {
                Box::new(RSA_OAEP.encrypter_from_jwk(&jwk)?)
            }
        }
    };

    Ok(encrypter)
}

// Get the decrypter from private key. Keys are handed to josekit as PKCS#8
// DER so that password protected keys work the same as plain ones.
fn decrypter(privkey: &[u8], password: &[u8]) -> anyhow::Result<Box<dyn JweDecrypter>> {
    let decrypter: Box<dyn JweDecrypter> = match parse_private_key(privkey, password)? {
        ParsedKey::Pkey(key) => {
            let der = key.private_key_to_pkcs8()?;
            match key.id() {
                Id::EC => Box::new(ECDH_ES_A256KW.decrypter_from_der(&der)?),
                Id::RSA => Box::new(RSA_OAEP.decrypter_from_der(&der)?),
                id => return Err(anyhow!("unsupported private key type {id:?}")),
            }
        }
        ParsedKey::Jwk(map) => {
            let ec = is_ec_jwk(&map);
            let jwk = Jwk::from_map(map)?;
            if ec {
                Box::new(ECDH_ES_A256KW.decrypter_from_jwk(&jwk)?)
            } else {
                Box::new(RSA_OAEP.decrypter_from_jwk(&jwk)?)
            }
        }
    };

    Ok(decrypter)
}

// A general JSON serialized JWE is a JSON object carrying the ciphertext.
fn parse_jwe(jwe: &[u8]) -> Result<&str> {
    let blob_parse = |source| Error::BlobParse {
        scheme: SCHEME,
        source,
    };

    let jwe_string = std::str::from_utf8(jwe).map_err(|e| blob_parse(anyhow!(e)))?;
    let value: serde_json::Value =
        serde_json::from_str(jwe_string).map_err(|e| blob_parse(anyhow!(e)))?;
    if value.get("ciphertext").is_none() {
        return Err(blob_parse(anyhow!("no ciphertext found")));
    }

    Ok(jwe_string)
}

impl KeyWrapper for JweKeyWrapper {
    fn wrap_keys(&self, ec: &EncryptConfig, opts_data: &[u8]) -> Result<Option<Vec<u8>>> {
        let pubkeys = match ec.param.get(PUBKEYS) {
            Some(pubkeys) if !pubkeys.is_empty() => pubkeys,
            // no recipients is not an error
            _ => return Ok(None),
        };

        let wrap_failed = |source| Error::WrapKeysFailed {
            scheme: SCHEME,
            source,
        };

        let mut src_header = JweHeaderSet::new();
        src_header.set_content_encryption("A256GCM", true);
        let src_rheader = JweHeader::new();

        let encrypters = pubkeys
            .iter()
            .map(|pubkey| encrypter(pubkey))
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(wrap_failed)?;
        let recipients: Vec<(Option<&JweHeader>, &dyn JweEncrypter)> = encrypters
            .iter()
            .map(|x| (Some(&src_rheader), &**x))
            .collect();

        let json = serialize_general_json(opts_data, Some(&src_header), &recipients, None)
            .map_err(|e| wrap_failed(anyhow!(e)))?;

        Ok(Some(json.into_bytes()))
    }

    fn unwrap_keys(&self, dc: &DecryptConfig, jwe: &[u8]) -> Result<Vec<u8>> {
        let jwe_string = parse_jwe(jwe)?;

        let privkeys = self
            .private_keys(&dc.param)
            .ok_or(Error::MissingPrivateKeyMaterial)?;
        let passwords = dc.param.get(PRIVKEYS_PASSWORDS);

        for (idx, privkey) in privkeys.iter().enumerate() {
            let password = passwords
                .and_then(|passwords| passwords.get(idx))
                .map(Vec::as_slice)
                .unwrap_or_default();

            let decrypter = match decrypter(privkey, password) {
                Ok(decrypter) => decrypter,
                Err(e) => {
                    debug!("JWE: skipping private key {idx}: {e}");
                    continue;
                }
            };

            match deserialize_json(jwe_string, &*decrypter) {
                Ok((payload, _)) => return Ok(payload),
                Err(e) => debug!("JWE: private key {idx} does not open the token: {e}"),
            }
        }

        Err(Error::PrivateKeyMismatch { scheme: SCHEME })
    }

    fn annotation_id(&self) -> &'static str {
        ANNOTATION_KEYS_JWE
    }

    fn private_keys(&self, dc_param: &HashMap<String, Vec<Vec<u8>>>) -> Option<Vec<Vec<u8>>> {
        dc_param.get(PRIVKEYS).cloned()
    }

    fn keyids_from_packet(&self, _packet: &str) -> Option<Vec<u64>> {
        None
    }

    fn recipients(&self, _packet: &str) -> Option<Vec<String>> {
        Some(vec!["[jwe]".to_string()])
    }
}
