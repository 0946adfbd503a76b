// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Internal: {0}")]
	Internal(String),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl DbError {
	/// Lock-wait or pool-acquire timeout: the store was busy, not broken.
	pub fn is_busy(&self) -> bool {
		match self {
			DbError::Sqlx(e) => is_busy_error(e),
			_ => false,
		}
	}

	pub fn is_unique_violation(&self) -> bool {
		matches!(self, DbError::Sqlx(sqlx::Error::Database(e)) if e.is_unique_violation())
	}
}

/// `SQLITE_BUSY`/`SQLITE_LOCKED` (including their extended codes) or a pool
/// that could not hand out a connection in time.
pub fn is_busy_error(e: &sqlx::Error) -> bool {
	match e {
		sqlx::Error::PoolTimedOut => true,
		sqlx::Error::Database(db_err) => {
			let primary = db_err
				.code()
				.and_then(|c| c.parse::<i32>().ok())
				.map(|c| c & 0xff);
			match primary {
				Some(code) => code == SQLITE_BUSY || code == SQLITE_LOCKED,
				None => {
					let msg = db_err.message().to_lowercase();
					msg.contains("database is locked") || msg.contains("busy")
				}
			}
		}
		_ => false,
	}
}
