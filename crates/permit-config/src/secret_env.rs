// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `VAR` / `VAR_FILE` secret loading.
//!
//! The backup passphrase is never stored in the TOML file. Operators either
//! export it directly or point `*_FILE` at a file mounted with tight
//! permissions; the file form wins when both are set.

use std::path::PathBuf;
use std::{env, fs};

use permit_common_secret::SecretString;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretEnvError {
	#[error("failed to read secret file at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("secret file path in {var} is empty")]
	EmptyPath { var: String },

	#[error("required secret not found: set either {var} or {var}_FILE")]
	Missing { var: String },
}

/// Loads `var` from the environment, preferring the file named by `{var}_FILE`.
///
/// A single trailing newline is stripped from file contents.
pub fn load_secret_env(var: &str) -> Result<Option<SecretString>, SecretEnvError> {
	let file_var = format!("{var}_FILE");

	if let Ok(path_str) = env::var(&file_var) {
		if path_str.is_empty() {
			return Err(SecretEnvError::EmptyPath { var: file_var });
		}

		let path = PathBuf::from(&path_str);
		let content = fs::read_to_string(&path).map_err(|e| SecretEnvError::Io {
			path: path.clone(),
			source: e,
		})?;

		let secret = content.strip_suffix('\n').unwrap_or(&content).to_string();
		return Ok(Some(SecretString::new(secret)));
	}

	Ok(env::var(var).ok().map(SecretString::new))
}

/// Like [`load_secret_env`] but absence is an error.
pub fn require_secret_env(var: &str) -> Result<SecretString, SecretEnvError> {
	load_secret_env(var)?.ok_or_else(|| SecretEnvError::Missing {
		var: var.to_string(),
	})
}
