// Copyright The imgcrypt-rs Authors.
// SPDX-License-Identifier: Apache-2.0

//! End to end encryption of the layers of an image.

#![cfg(all(feature = "keywrap-jwe", feature = "keywrap-pkcs7"))]

use std::io::Read;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use common::{init_logger, layer_desc, Recipient};
use imgcrypt_rs::blockcipher::{read_all, CipherType, LayerBlockCipherOptions};
use imgcrypt_rs::config::{
    DecryptConfig, EncryptConfig, ImgcryptConfig, PRIVKEYS, PRIVKEYS_PASSWORDS,
};
use imgcrypt_rs::encryption::LayerCrypter;
use imgcrypt_rs::layer::LayerFilter;
use imgcrypt_rs::spec::{decrypted_media_type, encrypted_media_type};
use imgcrypt_rs::utils::sort_decryption_keys;
use imgcrypt_rs::Error;
use oci_spec::image::{Descriptor, Digest, MediaType};
use rstest::rstest;

mod common;

fn image_layers() -> Vec<Vec<u8>> {
    vec![
        b"base layer".to_vec(),
        (0..200_000u32).map(|i| (i % 253) as u8).collect(),
        Vec::new(),
        b"top layer".to_vec(),
    ]
}

/// Encrypt the selected layers and return the updated descriptors and blobs.
fn encrypt_image(
    crypter: &LayerCrypter,
    ec: &EncryptConfig,
    filter: &LayerFilter,
    layers: &[Vec<u8>],
) -> Vec<(Descriptor, Vec<u8>)> {
    let total = layers.len();
    layers
        .iter()
        .enumerate()
        .map(|(index, data)| {
            let desc = layer_desc(MediaType::ImageLayerGzip, data, None);
            if !filter.is_layer_selected(index, total) {
                return (desc, data.clone());
            }

            let (reader, annotations) = crypter.encrypt_layer(ec, data.as_slice(), &desc).unwrap();
            let mut reader = reader.unwrap();
            let mut ciphertext = Vec::new();
            reader.read_to_end(&mut ciphertext).unwrap();

            let media_type = encrypted_media_type(&desc.media_type().to_string()).unwrap();
            let mut enc_desc = Descriptor::new(
                MediaType::from(media_type),
                reader.size(),
                Digest::from_str(reader.digest().unwrap()).unwrap(),
            );
            enc_desc.set_annotations(Some(annotations));
            (enc_desc, ciphertext)
        })
        .collect()
}

fn decrypt_image(
    crypter: &LayerCrypter,
    dc: &DecryptConfig,
    image: &[(Descriptor, Vec<u8>)],
) -> imgcrypt_rs::Result<Vec<Vec<u8>>> {
    image
        .iter()
        .enumerate()
        .map(|(index, (desc, blob))| {
            if !crypter.layer_info(index as u32, desc).is_encrypted() {
                return Ok(blob.clone());
            }

            let media_type = desc.media_type().to_string();
            assert!(decrypted_media_type(&media_type).is_some());
            read_all(crypter.decrypt_layer(dc, blob.as_slice(), desc)?)
        })
        .collect()
}

#[rstest]
#[case(CipherType::Aes128Gcm)]
#[case(CipherType::Aes256Gcm)]
fn test_encrypt_decrypt_image(#[case] cipher_type: CipherType) {
    init_logger();
    let alice = Recipient::generate("alice").unwrap();
    let bob = Recipient::generate("bob").unwrap();

    let mut ec = EncryptConfig {
        cipher_type,
        ..Default::default()
    };
    ec.encrypt_with_jwe(vec![alice.public_key_pem()]).unwrap();
    ec.encrypt_with_pkcs7(vec![bob.cert_pem()]).unwrap();

    let filter = LayerFilter {
        layers: vec![1, -1],
        ..Default::default()
    };

    let crypter = LayerCrypter::new().unwrap();
    let layers = image_layers();
    let image = encrypt_image(&crypter, &ec, &filter, &layers);

    let encrypted: Vec<bool> = image
        .iter()
        .enumerate()
        .map(|(index, (desc, _))| crypter.layer_info(index as u32, desc).is_encrypted())
        .collect();
    assert_eq!(encrypted, vec![false, true, false, true]);

    let info = crypter.layer_info(1, &image[1].0);
    assert_eq!(info.encryption, vec!["jwe", "pkcs7"]);
    assert_eq!(info.size, image[1].1.len() as u64);
    assert_eq!(info.digest, common::digest_of(&image[1].1).to_string());

    // alice holds a JWE key, bob a PKCS7 key and certificate
    let alice_keys = STANDARD.encode(alice.private_key_pem());
    let bob_keys = format!(
        "{},{}",
        STANDARD.encode(bob.private_key_pem()),
        STANDARD.encode(bob.cert_pem())
    );

    for keys in [alice_keys, bob_keys] {
        let mut dc = DecryptConfig {
            param: sort_decryption_keys(&keys).unwrap(),
        };
        let count = dc.param[PRIVKEYS].len();
        dc.param
            .insert(PRIVKEYS_PASSWORDS.to_string(), vec![vec![]; count]);

        assert_eq!(decrypt_image(&crypter, &dc, &image).unwrap(), layers);
    }
}

#[test]
fn test_add_recipient_to_image() {
    init_logger();
    let alice = Recipient::generate("alice").unwrap();
    let carol = Recipient::generate("carol").unwrap();

    let mut ec = EncryptConfig::default();
    ec.encrypt_with_jwe(vec![alice.public_key_pem()]).unwrap();

    let mut dc_alice = DecryptConfig::default();
    dc_alice
        .decrypt_with_priv_keys(vec![alice.private_key_pem()], vec![vec![]])
        .unwrap();

    let mut dc_carol = DecryptConfig::default();
    dc_carol
        .decrypt_with_priv_keys(vec![carol.private_key_pem()], vec![vec![]])
        .unwrap();
    dc_carol.decrypt_with_x509s(vec![carol.cert_pem()]).unwrap();

    let crypter = LayerCrypter::new().unwrap();
    let layers = image_layers();
    let mut image = encrypt_image(&crypter, &ec, &LayerFilter::default(), &layers);

    assert!(matches!(
        decrypt_image(&crypter, &dc_carol, &image),
        Err(Error::KeyExhausted)
    ));

    // wrap the existing layer keys for carol, the layer blobs stay untouched
    let mut ec_carol = EncryptConfig::default();
    ec_carol.encrypt_with_pkcs7(vec![carol.cert_pem()]).unwrap();
    ec_carol.decrypt_config = Some(dc_alice.clone());

    for (desc, blob) in image.iter_mut() {
        let (reader, annotations) = crypter.encrypt_layer(&ec_carol, blob.as_slice(), desc).unwrap();
        assert!(reader.is_none());
        assert_eq!(annotations.len(), 2);
        desc.set_annotations(Some(annotations));
    }

    assert_eq!(decrypt_image(&crypter, &dc_alice, &image).unwrap(), layers);
    assert_eq!(decrypt_image(&crypter, &dc_carol, &image).unwrap(), layers);
}

#[test]
fn test_tampered_layer_is_rejected() {
    let alice = Recipient::generate("alice").unwrap();
    let mut ec = EncryptConfig::default();
    ec.encrypt_with_jwe(vec![alice.public_key_pem()]).unwrap();
    let mut dc = DecryptConfig::default();
    dc.decrypt_with_priv_keys(vec![alice.private_key_pem()], vec![vec![]])
        .unwrap();

    let crypter = LayerCrypter::new().unwrap();
    let mut image = encrypt_image(&crypter, &ec, &LayerFilter::default(), &image_layers());

    let blob = &mut image[1].1;
    let last = blob.len() - 1;
    blob[last] ^= 0x80;

    assert!(matches!(
        decrypt_image(&crypter, &dc, &image),
        Err(Error::Authentication)
    ));
}

#[test]
fn test_encrypt_with_configured_cipher() {
    let tempdir = tempfile::tempdir().unwrap();
    let config_file = tempdir.path().join("imgcrypt.json");
    std::fs::write(&config_file, r#"{"default_cipher": "AEAD_AES_128_GCM"}"#).unwrap();

    let config = ImgcryptConfig::try_from(config_file.as_path()).unwrap();
    let alice = Recipient::generate("alice").unwrap();
    let mut ec = config.encrypt_config();
    ec.encrypt_with_jwe(vec![alice.public_key_pem()]).unwrap();
    let mut dc = DecryptConfig::default();
    dc.decrypt_with_priv_keys(vec![alice.private_key_pem()], vec![vec![]])
        .unwrap();

    let image = encrypt_image(
        &LayerCrypter::new().unwrap(),
        &ec,
        &LayerFilter::default(),
        &image_layers(),
    );

    let opts_data =
        imgcrypt_rs::encryption::decrypt_layer_key_opts_data(&dc, &image[0].0).unwrap();
    let opts = LayerBlockCipherOptions::from_json(&opts_data).unwrap();
    assert_eq!(opts.symmetric_key.len(), 16);
}
