// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Filesystem locations: data directory, key directory, query log.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_data_dir() -> PathBuf {
	PathBuf::from("./data")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PathsConfigLayer {
	pub data_dir: Option<PathBuf>,
	pub keys_dir: Option<PathBuf>,
	pub query_log_path: Option<PathBuf>,
}

impl PathsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.data_dir.is_some() {
			self.data_dir = other.data_dir;
		}
		if other.keys_dir.is_some() {
			self.keys_dir = other.keys_dir;
		}
		if other.query_log_path.is_some() {
			self.query_log_path = other.query_log_path;
		}
	}

	/// Unset locations are placed under `data_dir`.
	pub fn finalize(self) -> PathsConfig {
		let data_dir = self.data_dir.unwrap_or_else(default_data_dir);
		PathsConfig {
			keys_dir: self.keys_dir.unwrap_or_else(|| data_dir.join("keys")),
			query_log_path: self
				.query_log_path
				.unwrap_or_else(|| data_dir.join("queries.jsonl")),
			data_dir,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
	pub data_dir: PathBuf,
	pub keys_dir: PathBuf,
	pub query_log_path: PathBuf,
}

impl Default for PathsConfig {
	fn default() -> Self {
		PathsConfigLayer::default().finalize()
	}
}
