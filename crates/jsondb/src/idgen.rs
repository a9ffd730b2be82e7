// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Record identifiers
//!
//! Random identifiers name records written without an explicit resource.
//! Seeded identifiers give reproducible names from a natural key.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of identifiers generated for unnamed records
pub const DEFAULT_ID_LEN: usize = 64;

/// Random identifier of `len` characters drawn uniformly from `[0-9A-Za-z]`.
///
/// Uses the operating system CSPRNG; a failing random source panics.
#[must_use]
pub fn gen_id(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Lowercase hex SHA-256 of the seed bytes (64 characters).
#[must_use]
pub fn gen_id_from_seed(seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hex::encode(hasher.finalize())
}
