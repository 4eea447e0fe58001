// Copyright The imgcrypt-rs Authors.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use crate::config::{DecryptConfig, EncryptConfig};
use crate::Result;

#[cfg(feature = "keywrap-jwe")]
pub mod jwe;

#[cfg(feature = "keywrap-pkcs7")]
pub mod pkcs7;

/// KeyWrapper is the interface used for wrapping keys using
/// a specific encryption technology (jwe, pkcs7)
#[allow(unused_variables)]
pub trait KeyWrapper: Send + Sync {
    /// wrap keys data with encrypt config. Returns `None` when the config
    /// holds no recipients for this scheme.
    fn wrap_keys(&self, ec: &EncryptConfig, opts_data: &[u8]) -> Result<Option<Vec<u8>>>;

    /// unwrap keys data with decrypt config.
    fn unwrap_keys(&self, dc: &DecryptConfig, annotation: &[u8]) -> Result<Vec<u8>>;

    /// return the keywrapper annotation id.
    fn annotation_id(&self) -> &'static str;

    /// no_possible_keys returns true if there is no possibility of performing
    /// decryption for parameters provided.
    fn no_possible_keys(&self, dc_param: &HashMap<String, Vec<Vec<u8>>>) -> bool {
        self.private_keys(dc_param)
            .map_or(true, |privkeys| privkeys.is_empty())
    }

    /// private_keys (optional) gets the array of private keys. It is an optional implementation
    /// as in some key services, a private key may not be exportable (i.e. HSM)
    /// If not implemented, return `None`.
    fn private_keys(&self, dc_param: &HashMap<String, Vec<Vec<u8>>>) -> Option<Vec<Vec<u8>>> {
        None
    }

    /// keyids_from_packet (optional) gets a list of key IDs. This is optional as some encryption
    /// schemes may not have a notion of key IDs
    /// If not implemented, return `None`.
    fn keyids_from_packet(&self, packet: &str) -> Option<Vec<u64>> {
        None
    }

    /// recipients (optional) gets a list of recipients. It is optional due to the validity of
    /// recipients in a particular encryption scheme
    /// If not implemented, return `None`.
    fn recipients(&self, packet: &str) -> Option<Vec<String>> {
        None
    }
}

/// The key wrappers compiled into the crate, in the order they are applied.
pub fn default_key_wrappers() -> Vec<Box<dyn KeyWrapper>> {
    #[allow(unused_mut)]
    let mut key_wrappers: Vec<Box<dyn KeyWrapper>> = Vec::new();

    #[cfg(feature = "keywrap-jwe")]
    key_wrappers.push(Box::new(jwe::JweKeyWrapper {}));

    #[cfg(feature = "keywrap-pkcs7")]
    key_wrappers.push(Box::new(pkcs7::Pkcs7KeyWrapper {}));

    key_wrappers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(all(feature = "keywrap-jwe", feature = "keywrap-pkcs7"))]
    fn test_default_key_wrappers_order() {
        let ids: Vec<&str> = default_key_wrappers()
            .iter()
            .map(|kw| kw.annotation_id())
            .collect();
        assert_eq!(
            ids,
            vec![
                crate::spec::ANNOTATION_KEYS_JWE,
                crate::spec::ANNOTATION_KEYS_PKCS7
            ]
        );
    }
}
