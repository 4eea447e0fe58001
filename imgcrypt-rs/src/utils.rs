// Copyright The imgcrypt-rs Authors.
// SPDX-License-Identifier: Apache-2.0

//! Parsing and classification of key material handed in for decryption.

use std::collections::HashMap;

use anyhow::anyhow;
use base64::{engine::general_purpose::STANDARD, Engine};
use log::debug;
use openssl::pkey::{PKey, Private, Public};
use openssl::x509::X509;
use sequoia_openpgp as openpgp;

use openpgp::cert::CertParser;
use openpgp::parse::Parse;

use crate::config::{GPG_PRIVATEKEYS, PRIVKEYS, X509S};
use crate::{Error, Result};

/// The kinds of key material a decryption key list may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyMaterialType {
    PrivateKey,
    Certificate,
    GpgPrivateKeyRing,
}

impl KeyMaterialType {
    /// DecryptConfig parameter the material is filed under.
    pub fn param_key(&self) -> &'static str {
        match self {
            KeyMaterialType::PrivateKey => PRIVKEYS,
            KeyMaterialType::Certificate => X509S,
            KeyMaterialType::GpgPrivateKeyRing => GPG_PRIVATEKEYS,
        }
    }
}

/// A parsed asymmetric key. JWKs are kept as their JSON members.
#[derive(Debug)]
pub enum ParsedKey<T> {
    Pkey(PKey<T>),
    Jwk(serde_json::Map<String, serde_json::Value>),
}

fn parse_jwk(data: &[u8], private: bool) -> Result<serde_json::Map<String, serde_json::Value>> {
    let invalid = |source| Error::InvalidKeyMaterial {
        context: "JWK",
        source,
    };

    let jwk: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(data).map_err(|e| invalid(anyhow!(e)))?;

    let members: &[&str] = match jwk.get("kty").and_then(|kty| kty.as_str()) {
        Some("RSA") => &["n", "e"],
        Some("EC") => &["crv", "x", "y"],
        Some("OKP") => &["crv", "x"],
        Some(kty) => return Err(invalid(anyhow!("unsupported key type {kty}"))),
        None => return Err(invalid(anyhow!("no key type found"))),
    };
    if let Some(missing) = members
        .iter()
        .find(|member| !jwk.get(**member).is_some_and(|value| value.is_string()))
    {
        return Err(invalid(anyhow!("missing key member {missing}")));
    }

    #[cfg(feature = "keywrap-jwe")]
    josekit::jwk::Jwk::from_map(jwk.clone()).map_err(|e| invalid(anyhow!(e)))?;

    match (jwk.get("d").is_some_and(|d| d.is_string()), private) {
        (true, false) => Err(invalid(anyhow!("JWK is not a public key"))),
        (false, true) => Err(invalid(anyhow!("JWK is not a private key"))),
        _ => Ok(jwk),
    }
}

/// Parse a private key in DER format (PKCS#8 or PKCS#1) first, then PEM and
/// finally as a JWK. A non-empty password decrypts an encrypted key.
pub fn parse_private_key(data: &[u8], password: &[u8]) -> Result<ParsedKey<Private>> {
    let der = if password.is_empty() {
        PKey::private_key_from_der(data)
    } else {
        PKey::private_key_from_pkcs8_passphrase(data, password)
    };
    if let Ok(key) = der {
        return Ok(ParsedKey::Pkey(key));
    }

    if data.starts_with(b"-----BEGIN") {
        // an empty password must never fall back to prompting on a tty
        let pem = if password.is_empty() {
            PKey::private_key_from_pem_callback(data, |_| Ok(0))
        } else {
            PKey::private_key_from_pem_passphrase(data, password)
        };
        return pem
            .map(ParsedKey::Pkey)
            .map_err(|e| Error::InvalidKeyMaterial {
                context: "could not parse private key",
                source: anyhow!(e),
            });
    }

    parse_jwk(data, true).map(ParsedKey::Jwk)
}

/// Parse a public key in DER format first, then PEM and finally as a JWK.
pub fn parse_public_key(data: &[u8]) -> Result<ParsedKey<Public>> {
    if let Ok(key) = PKey::public_key_from_der(data) {
        return Ok(ParsedKey::Pkey(key));
    }

    if data.starts_with(b"-----BEGIN") {
        return PKey::public_key_from_pem(data)
            .map(ParsedKey::Pkey)
            .map_err(|e| Error::InvalidKeyMaterial {
                context: "could not parse public key",
                source: anyhow!(e),
            });
    }

    parse_jwk(data, false).map(ParsedKey::Jwk)
}

/// Parse an x509 certificate in DER format first and PEM format after.
pub fn parse_certificate(data: &[u8]) -> Result<X509> {
    X509::from_der(data)
        .or_else(|_| X509::from_pem(data))
        .map_err(|e| Error::InvalidKeyMaterial {
            context: "could not parse x509 certificate",
            source: anyhow!(e),
        })
}

pub fn is_private_key(data: &[u8]) -> bool {
    parse_private_key(data, &[]).is_ok()
}

pub fn is_public_key(data: &[u8]) -> bool {
    parse_public_key(data).is_ok()
}

pub fn is_certificate(data: &[u8]) -> bool {
    parse_certificate(data).is_ok()
}

/// Whether the data is an OpenPGP keyring holding secret key material.
pub fn is_gpg_private_key_ring(data: &[u8]) -> bool {
    let parser = match CertParser::from_bytes(data) {
        Ok(parser) => parser,
        Err(e) => {
            debug!("not an OpenPGP keyring: {e}");
            return false;
        }
    };

    let mut has_secret = false;
    for cert in parser {
        match cert {
            Ok(cert) => has_secret |= cert.is_tsk(),
            Err(_) => return false,
        }
    }

    has_secret
}

/// Classify a single piece of decryption key material.
pub fn classify(item: &[u8]) -> Result<KeyMaterialType> {
    if is_private_key(item) {
        Ok(KeyMaterialType::PrivateKey)
    } else if is_certificate(item) {
        Ok(KeyMaterialType::Certificate)
    } else if is_gpg_private_key_ring(item) {
        Ok(KeyMaterialType::GpgPrivateKeyRing)
    } else {
        Err(Error::UnknownKeyMaterialType)
    }
}

/// Parse a list of comma separated base64 entries and sort them into
/// DecryptConfig parameters. Each entry may be a private key, an x509
/// certificate or a GPG private keyring; one bad entry fails the list.
pub fn sort_decryption_keys(b64_item_list: &str) -> Result<HashMap<String, Vec<Vec<u8>>>> {
    let mut dc_param: HashMap<String, Vec<Vec<u8>>> = HashMap::new();

    for b64_item in b64_item_list.split(',') {
        let item = STANDARD
            .decode(b64_item)
            .map_err(|_| Error::InvalidBase64("a passed decryption key"))?;
        let typ = classify(&item)?;

        dc_param
            .entry(typ.param_key().to_string())
            .or_default()
            .push(item);
    }

    Ok(dc_param)
}
