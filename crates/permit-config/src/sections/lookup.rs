// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Remote plate lookup: throttling, expiry threshold and caller allow-list.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_REQUESTS: u32 = 20;
const DEFAULT_WINDOW_SECS: u64 = 60;
const DEFAULT_EXPIRING_THRESHOLD_DAYS: u32 = 7;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LookupConfigLayer {
	pub max_requests: Option<u32>,
	pub window_secs: Option<u64>,
	pub expiring_threshold_days: Option<u32>,
	pub allowed_callers: Option<Vec<String>>,
}

impl LookupConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.max_requests.is_some() {
			self.max_requests = other.max_requests;
		}
		if other.window_secs.is_some() {
			self.window_secs = other.window_secs;
		}
		if other.expiring_threshold_days.is_some() {
			self.expiring_threshold_days = other.expiring_threshold_days;
		}
		if other.allowed_callers.is_some() {
			self.allowed_callers = other.allowed_callers;
		}
	}

	pub fn finalize(self) -> LookupConfig {
		LookupConfig {
			max_requests: self.max_requests.unwrap_or(DEFAULT_MAX_REQUESTS),
			window_secs: self.window_secs.unwrap_or(DEFAULT_WINDOW_SECS),
			expiring_threshold_days: self
				.expiring_threshold_days
				.unwrap_or(DEFAULT_EXPIRING_THRESHOLD_DAYS),
			allowed_callers: self.allowed_callers.unwrap_or_default(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LookupConfig {
	pub max_requests: u32,
	pub window_secs: u64,
	pub expiring_threshold_days: u32,
	/// Caller ids permitted to query. Empty denies everyone.
	pub allowed_callers: Vec<String>,
}

impl LookupConfig {
	pub fn window(&self) -> Duration {
		Duration::from_secs(self.window_secs)
	}
}

impl Default for LookupConfig {
	fn default() -> Self {
		LookupConfigLayer::default().finalize()
	}
}
