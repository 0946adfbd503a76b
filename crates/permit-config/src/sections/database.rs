// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Database configuration (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
	pub url: String,
	/// Upper bound on waiting for a SQLite lock or a pooled connection.
	pub busy_timeout_ms: u64,
	pub max_connections: u32,
}

impl DatabaseConfig {
	pub fn busy_timeout(&self) -> Duration {
		Duration::from_millis(self.busy_timeout_ms)
	}
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		DatabaseConfigLayer::default().finalize(Path::new("./data"))
	}
}

/// Database configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfigLayer {
	#[serde(default)]
	pub url: Option<String>,
	#[serde(default)]
	pub busy_timeout_ms: Option<u64>,
	#[serde(default)]
	pub max_connections: Option<u32>,
}

impl DatabaseConfigLayer {
	pub fn merge(&mut self, other: DatabaseConfigLayer) {
		if other.url.is_some() {
			self.url = other.url;
		}
		if other.busy_timeout_ms.is_some() {
			self.busy_timeout_ms = other.busy_timeout_ms;
		}
		if other.max_connections.is_some() {
			self.max_connections = other.max_connections;
		}
	}

	pub fn finalize(self, data_dir: &Path) -> DatabaseConfig {
		DatabaseConfig {
			url: self
				.url
				.unwrap_or_else(|| format!("sqlite:{}", data_dir.join("registry.db").display())),
			busy_timeout_ms: self.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
			max_connections: self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
		}
	}
}
