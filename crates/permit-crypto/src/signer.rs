// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Record signatures.
//!
//! A record is signed over a canonical string built from its *stored*
//! representation, so verification needs the HMAC key but never the field
//! key. Layout:
//!
//! ```text
//! permit-record-v1 US protocol_id US owner_name US plate US payment_method
//!   US start_date US end_date US address US mobile US email US payment_amount
//!   US created_at US updated_at US version
//! ```
//!
//! `US` is the ASCII unit separator (0x1F). Plain columns are rendered as
//! base64 of their UTF-8 bytes, encrypted columns as their stored token
//! (already base64), absent values as `-` and the version in decimal. None of
//! `US` or `-` can appear in a base64 rendering, so distinct records never
//! share a canonical string.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rsa::pkcs8::DecodePublicKey;
use rsa::pss::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::RsaPublicKey;
use sha2::Sha256;
use tracing::instrument;

use crate::error::{CryptoError, CryptoResult};
use crate::vault::KeyMaterial;

type HmacSha256 = Hmac<Sha256>;

pub const CANONICAL_TAG: &str = "permit-record-v1";
pub const FIELD_SEPARATOR: char = '\u{1f}';
pub const ABSENT_MARKER: &str = "-";

/// A record exactly as persisted, borrowed for signing.
///
/// The struct is the canonical field order; adding a field here is a format
/// change and needs a new [`CANONICAL_TAG`].
#[derive(Debug, Clone, Copy)]
pub struct StoredFields<'a> {
	pub protocol_id: &'a str,
	pub owner_name: &'a str,
	pub plate: &'a str,
	pub payment_method: &'a str,
	pub start_date: &'a str,
	pub end_date: &'a str,
	pub address: Option<&'a str>,
	pub mobile: Option<&'a str>,
	pub email: Option<&'a str>,
	pub payment_amount: Option<&'a str>,
	pub created_at: &'a str,
	pub updated_at: &'a str,
	pub version: i64,
}

impl StoredFields<'_> {
	pub fn canonical(&self) -> String {
		let plain = |value: &str| BASE64.encode(value.as_bytes());
		let sealed = |token: Option<&str>| token.unwrap_or(ABSENT_MARKER).to_string();

		let parts = [
			CANONICAL_TAG.to_string(),
			plain(self.protocol_id),
			plain(self.owner_name),
			plain(self.plate),
			plain(self.payment_method),
			plain(self.start_date),
			plain(self.end_date),
			sealed(self.address),
			sealed(self.mobile),
			sealed(self.email),
			sealed(self.payment_amount),
			plain(self.created_at),
			plain(self.updated_at),
			self.version.to_string(),
		];

		let mut out = String::new();
		for (i, part) in parts.iter().enumerate() {
			if i > 0 {
				out.push(FIELD_SEPARATOR);
			}
			out.push_str(part);
		}
		out
	}
}

/// RSA-PSS signature over a record's canonical string, verifiable by anyone
/// holding the public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
	pub protocol_id: String,
	pub canonical: String,
	/// Base64 RSA-PSS/SHA-256 signature.
	pub signature: String,
}

#[derive(Clone)]
pub struct RecordSigner {
	hmac_key: permit_common_secret::SecretKey,
	signing_key: SigningKey<Sha256>,
	verifying_key: VerifyingKey<Sha256>,
}

impl RecordSigner {
	pub fn new(keys: &KeyMaterial) -> Self {
		let signing_key = SigningKey::<Sha256>::new(keys.private_key().clone());
		let verifying_key = VerifyingKey::<Sha256>::new(keys.public_key().clone());
		Self {
			hmac_key: keys.hmac_key().clone(),
			signing_key,
			verifying_key,
		}
	}

	fn mac(&self, fields: &StoredFields<'_>) -> CryptoResult<HmacSha256> {
		let mut mac = HmacSha256::new_from_slice(self.hmac_key.expose())
			.map_err(|e| CryptoError::Internal(format!("HMAC key rejected: {e}")))?;
		mac.update(fields.canonical().as_bytes());
		Ok(mac)
	}

	/// Hex HMAC-SHA256 of the canonical string.
	pub fn sign(&self, fields: &StoredFields<'_>) -> CryptoResult<String> {
		let mac = self.mac(fields)?;
		Ok(hex::encode(mac.finalize().into_bytes()))
	}

	/// Recomputes the signature and compares in constant time.
	pub fn verify(&self, fields: &StoredFields<'_>, signature: &str) -> bool {
		let Ok(expected) = hex::decode(signature) else {
			return false;
		};
		match self.mac(fields) {
			Ok(mac) => mac.verify_slice(&expected).is_ok(),
			Err(_) => false,
		}
	}

	#[instrument(skip(self, record), fields(protocol_id = record.protocol_id))]
	pub fn attest(&self, record: &StoredFields<'_>) -> Attestation {
		let canonical = record.canonical();
		let signature = self
			.signing_key
			.sign_with_rng(&mut OsRng, canonical.as_bytes());
		Attestation {
			protocol_id: record.protocol_id.to_string(),
			signature: BASE64.encode(signature.to_bytes()),
			canonical,
		}
	}

	/// Checks an attestation against this signer's own public key.
	pub fn verify_attestation(&self, attestation: &Attestation) -> bool {
		verify_with_key(&self.verifying_key, attestation)
	}
}

impl std::fmt::Debug for RecordSigner {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RecordSigner")
			.field("hmac_key", &permit_common_secret::REDACTED)
			.field("signing_key", &permit_common_secret::REDACTED)
			.finish()
	}
}

/// Third-party check of an attestation using only the PEM public key.
pub fn verify_attestation(public_key_pem: &str, attestation: &Attestation) -> CryptoResult<bool> {
	let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
		.map_err(|e| CryptoError::Attestation(format!("invalid public key: {e}")))?;
	Ok(verify_with_key(
		&VerifyingKey::<Sha256>::new(public_key),
		attestation,
	))
}

fn verify_with_key(key: &VerifyingKey<Sha256>, attestation: &Attestation) -> bool {
	let Ok(raw) = BASE64.decode(attestation.signature.as_bytes()) else {
		return false;
	};
	let Ok(signature) = Signature::try_from(raw.as_slice()) else {
		return false;
	};
	key.verify(attestation.canonical.as_bytes(), &signature)
		.is_ok()
}
