// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cryptographic building blocks for the permit registry.
//!
//! - [`KeyVault`] generates the key set on first run and loads it afterwards.
//! - [`FieldCipher`] seals individual sensitive fields with AES-256-GCM.
//! - [`RecordSigner`] computes and verifies the HMAC-SHA256 record signature
//!   over [`StoredFields`], and produces RSA-PSS [`Attestation`]s.

pub mod cipher;
pub mod error;
pub mod signer;
pub mod vault;

pub use cipher::FieldCipher;
pub use error::{CryptoError, CryptoResult};
pub use signer::{verify_attestation, Attestation, RecordSigner, StoredFields};
pub use vault::{testing, KeyMaterial, KeyVault, KEY_FILES};
