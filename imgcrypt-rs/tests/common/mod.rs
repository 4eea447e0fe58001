// Copyright The imgcrypt-rs Authors.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::Result;
use oci_spec::image::{Descriptor, Digest, MediaType};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::{X509NameBuilder, X509};
use sha2::{Digest as _, Sha256};

/// Key material of one party able to decrypt layers.
pub struct Recipient {
    pub key: PKey<Private>,
    pub cert: X509,
}

impl Recipient {
    pub fn generate(name: &str) -> Result<Self> {
        let key = PKey::from_rsa(Rsa::generate(2048)?)?;

        let mut subject = X509NameBuilder::new()?;
        subject.append_entry_by_text("CN", name)?;
        let subject = subject.build();

        let mut serial = BigNum::new()?;
        serial.rand(64, MsbOption::MAYBE_ZERO, false)?;
        let serial = serial.to_asn1_integer()?;
        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(1)?;

        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&subject)?;
        builder.set_issuer_name(&subject)?;
        builder.set_pubkey(&key)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;
        builder.sign(&key, MessageDigest::sha256())?;

        Ok(Recipient {
            key,
            cert: builder.build(),
        })
    }

    pub fn public_key_pem(&self) -> Vec<u8> {
        self.key.public_key_to_pem().unwrap()
    }

    pub fn private_key_pem(&self) -> Vec<u8> {
        self.key.private_key_to_pem_pkcs8().unwrap()
    }

    pub fn cert_pem(&self) -> Vec<u8> {
        self.cert.to_pem().unwrap()
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn digest_of(data: &[u8]) -> Digest {
    Digest::from_str(&format!("sha256:{}", hex::encode(Sha256::digest(data)))).unwrap()
}

pub fn layer_desc(
    media_type: MediaType,
    data: &[u8],
    annotations: Option<HashMap<String, String>>,
) -> Descriptor {
    let mut desc = Descriptor::new(media_type, data.len() as u64, digest_of(data));
    desc.set_annotations(annotations);
    desc
}
