// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use thiserror::Error;

pub type BackupResult<T> = Result<T, BackupError>;

#[derive(Debug, Error)]
pub enum BackupError {
	#[error("passphrase must be at least {min} characters")]
	WeakPassphrase { min: usize },

	#[error("not a registry backup: {0}")]
	InvalidFormat(String),

	/// Wrong passphrase or a modified file; the two are indistinguishable.
	#[error("backup cannot be decrypted: wrong passphrase or corrupted file")]
	Decryption,

	#[error("key derivation failed: {0}")]
	KeyDerivation(String),

	#[error("encryption failed: {0}")]
	Encryption(String),

	#[error("{0} already exists; pass overwrite to replace it")]
	Exists(PathBuf),

	#[error("backup contains unusable key material: {0}")]
	Keys(#[from] permit_crypto::CryptoError),

	#[error("I/O error at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("database snapshot failed: {0}")]
	Database(#[from] sqlx::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl BackupError {
	pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
		BackupError::Io {
			path: path.into(),
			source,
		}
	}
}
