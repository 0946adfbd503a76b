// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type AuditResult<T> = Result<T, AuditError>;

#[derive(Error, Debug)]
pub enum AuditError {
	#[error("audit storage error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("audit snapshot serialization failed: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("stored audit entry {id} is malformed: {reason}")]
	Malformed { id: String, reason: String },
}

impl AuditError {
	/// Lock contention or pool exhaustion; the enclosing mutation may be
	/// retried as a whole.
	pub fn is_transient(&self) -> bool {
		match self {
			AuditError::Database(e) => match e {
				sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
				sqlx::Error::Database(db_err) => {
					let msg = db_err.message().to_lowercase();
					msg.contains("busy") || msg.contains("locked") || msg.contains("timeout")
				}
				_ => false,
			},
			_ => false,
		}
	}
}
