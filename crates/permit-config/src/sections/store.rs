// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Record store policy.

use serde::{Deserialize, Serialize};

const DEFAULT_MIN_REASON_LENGTH: usize = 10;
const DEFAULT_UPDATE_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreConfigLayer {
	pub min_reason_length: Option<usize>,
	pub update_max_retries: Option<u32>,
}

impl StoreConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.min_reason_length.is_some() {
			self.min_reason_length = other.min_reason_length;
		}
		if other.update_max_retries.is_some() {
			self.update_max_retries = other.update_max_retries;
		}
	}

	pub fn finalize(self) -> StoreConfig {
		StoreConfig {
			min_reason_length: self
				.min_reason_length
				.unwrap_or(DEFAULT_MIN_REASON_LENGTH),
			update_max_retries: self
				.update_max_retries
				.unwrap_or(DEFAULT_UPDATE_MAX_RETRIES),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
	/// Minimum justification length, in characters after trimming.
	pub min_reason_length: usize,
	/// Extra attempts `update` makes after losing a compare-and-swap.
	pub update_max_retries: u32,
}

impl Default for StoreConfig {
	fn default() -> Self {
		StoreConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults() {
		let config = StoreConfig::default();
		assert_eq!(config.min_reason_length, 10);
		assert_eq!(config.update_max_retries, 3);
	}

	#[test]
	fn deserialize_and_finalize() {
		let layer: StoreConfigLayer = toml::from_str("min_reason_length = 20").unwrap();
		let config = layer.finalize();
		assert_eq!(config.min_reason_length, 20);
		assert_eq!(config.update_max_retries, 3);
	}
}
