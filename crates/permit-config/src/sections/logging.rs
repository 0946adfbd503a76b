// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Logging configuration section.

use serde::{Deserialize, Serialize};

fn default_level() -> String {
	"info,sqlx=warn".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfigLayer {
	pub level: Option<String>,
	pub json: Option<bool>,
}

impl LoggingConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.level.is_some() {
			self.level = other.level;
		}
		if other.json.is_some() {
			self.json = other.json;
		}
	}

	pub fn finalize(self) -> LoggingConfig {
		LoggingConfig {
			level: self.level.unwrap_or_else(default_level),
			json: self.json.unwrap_or(false),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
	pub level: String,
	pub json: bool,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		LoggingConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = LoggingConfig::default();
		assert_eq!(config.level, "info,sqlx=warn");
		assert!(!config.json);
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = LoggingConfigLayer {
			level: Some("info".to_string()),
			json: Some(true),
		};
		base.merge(LoggingConfigLayer {
			level: Some("debug".to_string()),
			json: None,
		});
		assert_eq!(base.level, Some("debug".to_string()));
		assert_eq!(base.json, Some(true));
	}

	#[test]
	fn test_serde_roundtrip() {
		let config = LoggingConfig {
			level: "warn".to_string(),
			json: true,
		};
		let toml_str = toml::to_string(&config).unwrap();
		let parsed: LoggingConfig = toml::from_str(&toml_str).unwrap();
		assert_eq!(config, parsed);
	}
}
