// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for key handling, field encryption and signing.

use std::path::PathBuf;

use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
	// =========================================================================
	// Key material
	// =========================================================================
	#[error("key material corrupt: {0}")]
	KeyMaterialCorrupt(String),

	#[error("key material unreadable at {path}: {source}")]
	KeyMaterialUnreadable {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("key material I/O error at {path}: {source}")]
	KeyIo {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("key generation failed: {0}")]
	KeyGeneration(String),

	// =========================================================================
	// Field cipher
	// =========================================================================
	#[error("encryption failed: {0}")]
	Encryption(String),

	#[error("decryption failed: {0}")]
	DecryptionFailed(String),

	// =========================================================================
	// Signatures
	// =========================================================================
	#[error("attestation error: {0}")]
	Attestation(String),

	#[error("internal error: {0}")]
	Internal(String),
}

impl CryptoError {
	/// Classifies an I/O error raised while touching a key file.
	pub(crate) fn from_key_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
		let path = path.into();
		if source.kind() == std::io::ErrorKind::PermissionDenied {
			CryptoError::KeyMaterialUnreadable { path, source }
		} else {
			CryptoError::KeyIo { path, source }
		}
	}

	/// Key-material errors stop the process before any record is touched.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			CryptoError::KeyMaterialCorrupt(_)
				| CryptoError::KeyMaterialUnreadable { .. }
				| CryptoError::KeyIo { .. }
				| CryptoError::KeyGeneration(_)
		)
	}
}
