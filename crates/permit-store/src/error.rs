// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for record store operations.

use permit_audit::AuditError;
use permit_crypto::CryptoError;
use permit_db::DbError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("validation failed: {0}")]
	Validation(String),

	#[error("record {0} not found")]
	NotFound(String),

	#[error("integrity violation: record {protocol_id} does not match its signature")]
	IntegrityViolation { protocol_id: String },

	#[error("field {field} of record {protocol_id} cannot be decrypted")]
	DecryptionFailed {
		protocol_id: String,
		field: &'static str,
	},

	#[error("record {0} was modified concurrently")]
	ConcurrentModification(String),

	#[error("store busy: {0}")]
	StoreBusy(String),

	#[error("key material corrupt: {0}")]
	KeyMaterialCorrupt(String),

	#[error("key material unreadable: {0}")]
	KeyMaterialUnreadable(String),

	#[error("database error: {0}")]
	Database(sqlx::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("internal error: {0}")]
	Internal(String),
}

impl StoreError {
	/// Errors an end user can act on: bad input, a stale view, a busy store.
	pub fn is_recoverable(&self) -> bool {
		matches!(
			self,
			StoreError::Validation(_)
				| StoreError::NotFound(_)
				| StoreError::ConcurrentModification(_)
				| StoreError::StoreBusy(_)
		)
	}

	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			StoreError::KeyMaterialCorrupt(_) | StoreError::KeyMaterialUnreadable(_)
		)
	}
}

impl From<sqlx::Error> for StoreError {
	fn from(e: sqlx::Error) -> Self {
		if permit_db::is_busy_error(&e) {
			return StoreError::StoreBusy(e.to_string());
		}
		if let sqlx::Error::Database(db_err) = &e {
			if db_err.is_unique_violation() {
				let message = if db_err.message().contains("plate") {
					"plate is already registered".to_string()
				} else {
					format!("duplicate value: {}", db_err.message())
				};
				return StoreError::Validation(message);
			}
			if db_err.is_check_violation() {
				return StoreError::Validation(format!("rejected by schema: {}", db_err.message()));
			}
		}
		StoreError::Database(e)
	}
}

impl From<DbError> for StoreError {
	fn from(e: DbError) -> Self {
		match e {
			DbError::Sqlx(e) => e.into(),
			DbError::NotFound(id) => StoreError::NotFound(id),
			DbError::Conflict(id) => StoreError::ConcurrentModification(id),
			DbError::Internal(msg) => StoreError::Internal(msg),
			DbError::Serialization(e) => StoreError::Serialization(e),
		}
	}
}

impl From<AuditError> for StoreError {
	fn from(e: AuditError) -> Self {
		match e {
			AuditError::Database(e) => e.into(),
			AuditError::Serialization(e) => StoreError::Serialization(e),
			other => StoreError::Internal(other.to_string()),
		}
	}
}

/// Record-independent crypto failures. Signature and decryption failures are
/// mapped where the record id is known.
impl From<CryptoError> for StoreError {
	fn from(e: CryptoError) -> Self {
		match e {
			CryptoError::KeyMaterialCorrupt(msg) => StoreError::KeyMaterialCorrupt(msg),
			e @ CryptoError::KeyMaterialUnreadable { .. } => {
				StoreError::KeyMaterialUnreadable(e.to_string())
			}
			other => StoreError::Internal(other.to_string()),
		}
	}
}
