// Copyright The imgcrypt-rs Authors.
// SPDX-License-Identifier: Apache-2.0

use rand::rngs::OsRng;
use rand::TryRngCore;

use crate::{Error, Result};

/// Fill the given slice with cryptographically generated random numbers
pub(crate) fn rand_bytes(data: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(data)
        .map_err(|e| Error::Random {
            source: anyhow::Error::new(e),
        })
}
