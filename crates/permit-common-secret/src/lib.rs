// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wrapper for key material and passphrases.
//!
//! [`Secret<T>`] keeps the registry's symmetric key, HMAC key and backup
//! passphrase out of logs, audit snapshots and config dumps:
//!
//! - `Debug`, `Display` and `Serialize` all print `[REDACTED]`
//! - the inner value is zeroized when the wrapper is dropped
//! - reading the value requires an explicit `.expose()`
//!
//! ```
//! use permit_common_secret::{SecretKey, SecretString};
//!
//! let key = SecretKey::new([7u8; 32]);
//! assert_eq!(format!("{key:?}"), "Secret(\"[REDACTED]\")");
//! assert_eq!(key.expose()[0], 7);
//!
//! let passphrase = SecretString::new("correct horse battery".to_string());
//! assert_eq!(passphrase.to_string(), "[REDACTED]");
//! ```

use std::fmt;
use zeroize::Zeroize;

/// Placeholder printed wherever a secret would otherwise appear.
pub const REDACTED: &str = "[REDACTED]";

/// Length in bytes of the symmetric and HMAC keys.
pub const KEY_LEN: usize = 32;

#[derive(Zeroize)]
#[zeroize(drop)]
pub struct Secret<T>
where
	T: Zeroize,
{
	inner: T,
}

/// Passphrases and other textual secrets.
pub type SecretString = Secret<String>;

/// A 256-bit key (field encryption or HMAC).
pub type SecretKey = Secret<[u8; KEY_LEN]>;

/// Arbitrary-length secret bytes, e.g. an encoded private key.
pub type SecretBytes = Secret<Vec<u8>>;

impl<T> Secret<T>
where
	T: Zeroize,
{
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	/// Borrow the inner value. Every call site is a place a secret leaves
	/// its wrapper, so keep them few.
	pub fn expose(&self) -> &T {
		&self.inner
	}

	/// Copy the inner value out, leaving the original to be zeroized on drop.
	pub fn into_inner(self) -> T
	where
		T: Clone,
	{
		self.inner.clone()
	}
}

impl SecretString {
	/// Length in characters, for minimum-length policies.
	pub fn char_len(&self) -> usize {
		self.inner.chars().count()
	}
}

impl SecretKey {
	/// Builds a key from a slice, returning `None` unless it is exactly
	/// [`KEY_LEN`] bytes long.
	pub fn from_slice(bytes: &[u8]) -> Option<Self> {
		let mut key = [0u8; KEY_LEN];
		if bytes.len() != KEY_LEN {
			return None;
		}
		key.copy_from_slice(bytes);
		let secret = Self::new(key);
		key.zeroize();
		Some(secret)
	}
}

impl<T> Clone for Secret<T>
where
	T: Zeroize + Clone,
{
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T> fmt::Debug for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Secret").field(&REDACTED).finish()
	}
}

impl<T> fmt::Display for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T> PartialEq for Secret<T>
where
	T: Zeroize + PartialEq,
{
	fn eq(&self, other: &Self) -> bool {
		self.inner == other.inner
	}
}

impl<T> Eq for Secret<T> where T: Zeroize + Eq {}

#[cfg(feature = "serde")]
mod serde_impl {
	use super::{Secret, REDACTED};
	use serde::{Deserialize, Deserializer, Serialize, Serializer};
	use zeroize::Zeroize;

	impl<T> Serialize for Secret<T>
	where
		T: Zeroize,
	{
		fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			serializer.serialize_str(REDACTED)
		}
	}

	impl<'de, T> Deserialize<'de> for Secret<T>
	where
		T: Deserialize<'de> + Zeroize,
	{
		fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
		where
			D: Deserializer<'de>,
		{
			T::deserialize(deserializer).map(Secret::new)
		}
	}
}
