// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;
use std::time::Duration;

use permit_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
	#[error("caller {caller_id} is not authorized: {reason}")]
	Denied { caller_id: String, reason: String },

	#[error("rate limit exceeded, retry in {}s", retry_after.as_secs().max(1))]
	RateLimited { retry_after: Duration },

	#[error("invalid query: {0}")]
	InvalidQuery(String),

	/// The matching record failed signature verification. Never reported as
	/// a valid subscription.
	#[error("record {protocol_id} failed integrity verification")]
	Integrity { protocol_id: String },

	#[error(transparent)]
	Store(#[from] StoreError),
}

impl LookupError {
	/// Value written to the query log's `result_status`.
	pub fn status(&self) -> &'static str {
		match self {
			LookupError::Denied { .. } => "denied",
			LookupError::RateLimited { .. } => "rate_limited",
			LookupError::InvalidQuery(_) => "invalid_query",
			LookupError::Integrity { .. } => "integrity_failed",
			LookupError::Store(StoreError::StoreBusy(_)) => "busy",
			LookupError::Store(_) => "error",
		}
	}
}

#[derive(Debug, Error)]
pub enum QueryLogError {
	#[error("query log I/O error at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("query log serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rate_limited_message_rounds_up_to_a_second() {
		let err = LookupError::RateLimited {
			retry_after: Duration::from_millis(200),
		};
		assert_eq!(err.to_string(), "rate limit exceeded, retry in 1s");
		assert_eq!(err.status(), "rate_limited");
	}

	#[test]
	fn busy_store_has_its_own_status() {
		let err = LookupError::Store(StoreError::StoreBusy("locked".into()));
		assert_eq!(err.status(), "busy");
	}
}
