// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Passphrase envelope: `MAGIC ‖ salt ‖ nonce ‖ AES-256-GCM(payload)`, with
//! the key derived by Argon2id.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use permit_common_secret::SecretString;
use permit_crypto::cipher::{generate_nonce, NONCE_SIZE};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{BackupError, BackupResult};

pub const MAGIC: &[u8] = b"PERMITBK1";
pub const SALT_SIZE: usize = 16;
pub const MIN_PASSPHRASE_LEN: usize = 16;

const HEADER_LEN: usize = MAGIC.len() + SALT_SIZE + NONCE_SIZE;

pub fn check_passphrase(passphrase: &SecretString) -> BackupResult<()> {
	if passphrase.char_len() < MIN_PASSPHRASE_LEN {
		return Err(BackupError::WeakPassphrase {
			min: MIN_PASSPHRASE_LEN,
		});
	}
	Ok(())
}

fn derive_key(passphrase: &SecretString, salt: &[u8]) -> BackupResult<Zeroizing<[u8; 32]>> {
	let mut key = Zeroizing::new([0u8; 32]);
	Argon2::default()
		.hash_password_into(passphrase.expose().as_bytes(), salt, &mut key[..])
		.map_err(|e| BackupError::KeyDerivation(e.to_string()))?;
	Ok(key)
}

fn cipher(key: &[u8; 32]) -> BackupResult<Aes256Gcm> {
	Aes256Gcm::new_from_slice(key).map_err(|e| BackupError::KeyDerivation(e.to_string()))
}

pub fn seal(passphrase: &SecretString, payload: &[u8]) -> BackupResult<Vec<u8>> {
	check_passphrase(passphrase)?;

	let mut salt = [0u8; SALT_SIZE];
	rand::rngs::OsRng.fill_bytes(&mut salt);
	let nonce = generate_nonce();
	let key = derive_key(passphrase, &salt)?;

	let ciphertext = cipher(&key)?
		.encrypt(Nonce::from_slice(&nonce), payload)
		.map_err(|e| BackupError::Encryption(e.to_string()))?;

	let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
	out.extend_from_slice(MAGIC);
	out.extend_from_slice(&salt);
	out.extend_from_slice(&nonce);
	out.extend_from_slice(&ciphertext);
	Ok(out)
}

pub fn open(passphrase: &SecretString, data: &[u8]) -> BackupResult<Zeroizing<Vec<u8>>> {
	let Some(rest) = data.strip_prefix(MAGIC) else {
		return Err(BackupError::InvalidFormat("missing backup header".into()));
	};
	if rest.len() < SALT_SIZE + NONCE_SIZE {
		return Err(BackupError::InvalidFormat("truncated header".into()));
	}
	let (salt, rest) = rest.split_at(SALT_SIZE);
	let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

	let key = derive_key(passphrase, salt)?;
	let plaintext = cipher(&key)?
		.decrypt(Nonce::from_slice(nonce), ciphertext)
		.map_err(|_| BackupError::Decryption)?;
	Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn pass(s: &str) -> SecretString {
		SecretString::new(s.to_string())
	}

	#[test]
	fn seal_then_open() {
		let p = pass("correct horse battery staple");
		let sealed = seal(&p, b"registry bundle").unwrap();
		assert!(sealed.starts_with(MAGIC));
		assert_eq!(&open(&p, &sealed).unwrap()[..], b"registry bundle");
	}

	#[test]
	fn fresh_salt_and_nonce_each_time() {
		let p = pass("correct horse battery staple");
		let a = seal(&p, b"same").unwrap();
		let b = seal(&p, b"same").unwrap();
		assert_ne!(a[..HEADER_LEN], b[..HEADER_LEN]);
	}

	#[test]
	fn wrong_passphrase_fails() {
		let sealed = seal(&pass("correct horse battery staple"), b"x").unwrap();
		assert!(matches!(
			open(&pass("incorrect horse battery staple"), &sealed),
			Err(BackupError::Decryption)
		));
	}

	#[test]
	fn modified_body_fails() {
		let p = pass("correct horse battery staple");
		let mut sealed = seal(&p, b"registry bundle").unwrap();
		let last = sealed.len() - 1;
		sealed[last] ^= 0x01;
		assert!(matches!(open(&p, &sealed), Err(BackupError::Decryption)));
	}

	#[test]
	fn short_passphrase_rejected() {
		assert!(matches!(
			seal(&pass("short"), b"x"),
			Err(BackupError::WeakPassphrase { .. })
		));
	}

	#[test]
	fn foreign_file_rejected() {
		let p = pass("correct horse battery staple");
		assert!(matches!(
			open(&p, b"SQLite format 3\0"),
			Err(BackupError::InvalidFormat(_))
		));
		assert!(matches!(
			open(&p, b"PERMITBK1short"),
			Err(BackupError::InvalidFormat(_))
		));
	}

	mod proptests {
		use super::*;
		use proptest::prelude::*;

		proptest! {
			#![proptest_config(ProptestConfig::with_cases(8))]

			#[test]
			fn any_flipped_byte_is_rejected(
				payload in proptest::collection::vec(any::<u8>(), 1..64),
				pos in any::<prop::sample::Index>()
			) {
				let p = pass("correct horse battery staple");
				let mut sealed = seal(&p, &payload).unwrap();
				let i = pos.index(sealed.len());
				sealed[i] ^= 0x80;
				prop_assert!(open(&p, &sealed).is_err());
			}
		}
	}
}
