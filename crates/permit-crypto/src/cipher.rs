// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-field authenticated encryption.
//!
//! Each sensitive value is sealed with AES-256-GCM under the vault's field key
//! and a fresh random 96-bit nonce. The stored token is
//! `base64(nonce || ciphertext || tag)`, so it is self-contained and safe to
//! place in a text column and in the canonical signing input.

use aes_gcm::{
	aead::{Aead, KeyInit, OsRng},
	Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use permit_common_secret::SecretKey;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Size of AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

#[derive(Clone)]
pub struct FieldCipher {
	cipher: Aes256Gcm,
}

/// Generate a random nonce.
///
/// Random 96-bit nonces are safe well past the number of field encryptions a
/// registry performs under one key; the (key, nonce) pair must never repeat.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
	let mut nonce = [0u8; NONCE_SIZE];
	OsRng.fill_bytes(&mut nonce);
	nonce
}

impl FieldCipher {
	pub fn new(key: &SecretKey) -> Self {
		let key = Key::<Aes256Gcm>::from_slice(key.expose());
		Self {
			cipher: Aes256Gcm::new(key),
		}
	}

	/// Seals `plaintext` into a stored token.
	pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<String> {
		let nonce_bytes = generate_nonce();
		let nonce = Nonce::from_slice(&nonce_bytes);

		let ciphertext = self
			.cipher
			.encrypt(nonce, plaintext)
			.map_err(|e| CryptoError::Encryption(format!("field encryption failed: {e}")))?;

		let mut token = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
		token.extend_from_slice(&nonce_bytes);
		token.extend_from_slice(&ciphertext);
		Ok(BASE64.encode(token))
	}

	/// Opens a stored token. Fails on bad encoding, truncation, tampering or
	/// a token sealed under another key.
	pub fn decrypt(&self, token: &str) -> CryptoResult<Zeroizing<Vec<u8>>> {
		let raw = BASE64
			.decode(token.as_bytes())
			.map_err(|e| CryptoError::DecryptionFailed(format!("token is not base64: {e}")))?;

		if raw.len() < NONCE_SIZE + TAG_SIZE {
			return Err(CryptoError::DecryptionFailed(format!(
				"token too short: {} bytes",
				raw.len()
			)));
		}

		let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
		let plaintext = self
			.cipher
			.decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
			.map_err(|e| CryptoError::DecryptionFailed(format!("authentication failed: {e}")))?;

		Ok(Zeroizing::new(plaintext))
	}

	pub fn encrypt_str(&self, plaintext: &str) -> CryptoResult<String> {
		self.encrypt(plaintext.as_bytes())
	}

	pub fn decrypt_str(&self, token: &str) -> CryptoResult<String> {
		let bytes = self.decrypt(token)?;
		String::from_utf8(bytes.to_vec())
			.map_err(|_| CryptoError::DecryptionFailed("plaintext is not UTF-8".to_string()))
	}

	/// Absent values stay absent; they are never encrypted.
	pub fn encrypt_optional(&self, plaintext: Option<&str>) -> CryptoResult<Option<String>> {
		plaintext.map(|p| self.encrypt_str(p)).transpose()
	}
}

impl std::fmt::Debug for FieldCipher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FieldCipher")
			.field("key", &permit_common_secret::REDACTED)
			.finish()
	}
}
