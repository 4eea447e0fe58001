// Copyright The imgcrypt-rs Authors.
// SPDX-License-Identifier: Apache-2.0

//! Reserved annotation keys and media types of encrypted layers.

/// Annotation carrying the JWE wrapped layer keys
pub const ANNOTATION_KEYS_JWE: &str = "org.opencontainers.image.enc.keys.jwe";

/// Annotation carrying the PKCS7 wrapped layer keys
pub const ANNOTATION_KEYS_PKCS7: &str = "org.opencontainers.image.enc.keys.pkcs7";

pub const MEDIA_TYPE_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";
pub const MEDIA_TYPE_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
pub const MEDIA_TYPE_LAYER_ENC: &str = "application/vnd.oci.image.layer.v1.tar+encrypted";
pub const MEDIA_TYPE_LAYER_GZIP_ENC: &str = "application/vnd.oci.image.layer.v1.tar+gzip+encrypted";

/// Media type a layer of `media_type` carries once sealed.
pub fn encrypted_media_type(media_type: &str) -> Option<&'static str> {
    match media_type {
        MEDIA_TYPE_LAYER => Some(MEDIA_TYPE_LAYER_ENC),
        MEDIA_TYPE_LAYER_GZIP => Some(MEDIA_TYPE_LAYER_GZIP_ENC),
        _ => None,
    }
}

/// Media type of the plaintext behind a sealed layer of `media_type`.
pub fn decrypted_media_type(media_type: &str) -> Option<&'static str> {
    match media_type {
        MEDIA_TYPE_LAYER_ENC => Some(MEDIA_TYPE_LAYER),
        MEDIA_TYPE_LAYER_GZIP_ENC => Some(MEDIA_TYPE_LAYER_GZIP),
        _ => None,
    }
}
