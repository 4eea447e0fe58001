// Copyright The imgcrypt-rs Authors.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use anyhow::anyhow;
use log::debug;
use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
use openssl::stack::Stack;
use openssl::symm::Cipher;
use openssl::x509::X509;

use crate::config::{DecryptConfig, EncryptConfig, PRIVKEYS, PRIVKEYS_PASSWORDS, X509S};
use crate::keywrap::KeyWrapper;
use crate::spec::ANNOTATION_KEYS_PKCS7;
use crate::utils::{parse_certificate, parse_private_key, ParsedKey};
use crate::{Error, Result};

const SCHEME: &str = "PKCS7";

/// A PKCS7 keywrapper, sealing the key options as enveloped-data to x509
/// certificates.
#[derive(Debug)]
pub struct Pkcs7KeyWrapper {}

fn collect_x509s(x509s: Option<&Vec<Vec<u8>>>) -> Result<Vec<X509>> {
    x509s
        .into_iter()
        .flatten()
        .map(|x509| parse_certificate(x509))
        .collect()
}

impl KeyWrapper for Pkcs7KeyWrapper {
    fn wrap_keys(&self, ec: &EncryptConfig, opts_data: &[u8]) -> Result<Option<Vec<u8>>> {
        let x509_certs = collect_x509s(ec.param.get(X509S))?;
        // no recipients is not an error
        if x509_certs.is_empty() {
            return Ok(None);
        }

        let wrap_failed = |e: openssl::error::ErrorStack| Error::WrapKeysFailed {
            scheme: SCHEME,
            source: anyhow!(e),
        };

        let mut certs = Stack::new().map_err(wrap_failed)?;
        for cert in x509_certs {
            certs.push(cert).map_err(wrap_failed)?;
        }

        let p7 = Pkcs7::encrypt(
            &certs,
            opts_data,
            Cipher::aes_256_cbc(),
            Pkcs7Flags::BINARY,
        )
        .map_err(wrap_failed)?;

        Ok(Some(p7.to_der().map_err(wrap_failed)?))
    }

    fn unwrap_keys(&self, dc: &DecryptConfig, pkcs7_packet: &[u8]) -> Result<Vec<u8>> {
        let privkeys = self.private_keys(&dc.param).unwrap_or_default();
        let passwords = dc
            .param
            .get(PRIVKEYS_PASSWORDS)
            .cloned()
            .unwrap_or_default();
        if privkeys.len() != passwords.len() {
            return Err(Error::PasswordArrayLengthMismatch);
        }
        if privkeys.is_empty() {
            return Err(Error::MissingPrivateKeyMaterial);
        }

        let x509_certs = collect_x509s(dc.param.get(X509S))?;
        if x509_certs.is_empty() {
            return Err(Error::ConfigMissing("x509 certificates for PKCS7 decryption"));
        }

        let p7 = Pkcs7::from_der(pkcs7_packet).map_err(|e| Error::BlobParse {
            scheme: SCHEME,
            source: anyhow!(e),
        })?;

        for (idx, (privkey, password)) in privkeys.iter().zip(passwords.iter()).enumerate() {
            let key = match parse_private_key(privkey, password) {
                Ok(ParsedKey::Pkey(key)) => key,
                Ok(ParsedKey::Jwk(_)) => {
                    debug!("PKCS7: skipping JWK private key {idx}");
                    continue;
                }
                Err(e) => {
                    debug!("PKCS7: skipping private key {idx}: {e}");
                    continue;
                }
            };

            for cert in &x509_certs {
                match p7.decrypt(&key, cert, Pkcs7Flags::BINARY) {
                    Ok(opts_data) => return Ok(opts_data),
                    Err(e) => debug!("PKCS7: private key {idx} does not open the packet: {e}"),
                }
            }
        }

        Err(Error::PrivateKeyMismatch { scheme: SCHEME })
    }

    fn annotation_id(&self) -> &'static str {
        ANNOTATION_KEYS_PKCS7
    }

    fn private_keys(&self, dc_param: &HashMap<String, Vec<Vec<u8>>>) -> Option<Vec<Vec<u8>>> {
        dc_param.get(PRIVKEYS).cloned()
    }

    fn keyids_from_packet(&self, _packet: &str) -> Option<Vec<u64>> {
        None
    }

    fn recipients(&self, _packet: &str) -> Option<Vec<String>> {
        Some(vec!["[pkcs7]".to_string()])
    }
}
