// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Records as returned to callers: decrypted best-effort, with their
//! integrity status attached rather than hidden.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{StoreError, StoreResult};
use crate::fields::{PaymentMethod, RecordFields, SensitiveFields, DATE_FORMAT};

/// Placeholder written into audit snapshots for a field that could not be
/// decrypted.
pub const UNREADABLE: &str = "<unreadable>";

/// A sensitive field after decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum DecryptedField {
	Absent,
	Present(String),
	/// The stored token did not decrypt under the current key.
	Unreadable,
}

impl DecryptedField {
	pub fn as_deref(&self) -> Option<&str> {
		match self {
			DecryptedField::Present(v) => Some(v),
			_ => None,
		}
	}

	pub fn is_unreadable(&self) -> bool {
		matches!(self, DecryptedField::Unreadable)
	}

	fn snapshot(&self) -> Value {
		match self {
			DecryptedField::Absent => Value::Null,
			DecryptedField::Present(v) => Value::String(v.clone()),
			DecryptedField::Unreadable => Value::String(UNREADABLE.to_string()),
		}
	}
}

/// A plain column as read back. A value that no longer parses is kept as
/// the stored text and the record is flagged as failing verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PlainField<T> {
	Valid(T),
	Malformed(String),
}

impl<T> PlainField<T> {
	pub fn valid(&self) -> Option<&T> {
		match self {
			PlainField::Valid(v) => Some(v),
			PlainField::Malformed(_) => None,
		}
	}

	pub fn is_malformed(&self) -> bool {
		matches!(self, PlainField::Malformed(_))
	}

	fn text_with(&self, render: impl FnOnce(&T) -> String) -> String {
		match self {
			PlainField::Valid(v) => render(v),
			PlainField::Malformed(raw) => raw.clone(),
		}
	}
}

impl PlainField<NaiveDate> {
	pub fn text(&self) -> String {
		self.text_with(|d| d.format(DATE_FORMAT).to_string())
	}
}

impl PlainField<PaymentMethod> {
	pub fn text(&self) -> String {
		self.text_with(|m| m.as_str().to_string())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
	Verified,
	/// Stored signature does not match the stored fields.
	Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
	pub protocol_id: String,
	pub owner_name: String,
	pub plate: String,
	pub payment_method: PlainField<PaymentMethod>,
	pub start_date: PlainField<NaiveDate>,
	pub end_date: PlainField<NaiveDate>,
	pub address: DecryptedField,
	pub mobile: DecryptedField,
	pub email: DecryptedField,
	pub payment_amount: DecryptedField,
	pub version: i64,
	pub created_at: String,
	pub updated_at: String,
	pub integrity: IntegrityStatus,
}

impl Record {
	pub fn is_verified(&self) -> bool {
		self.integrity == IntegrityStatus::Verified
	}

	pub fn ensure_verified(&self) -> StoreResult<()> {
		if self.is_verified() {
			Ok(())
		} else {
			Err(StoreError::IntegrityViolation {
				protocol_id: self.protocol_id.clone(),
			})
		}
	}

	/// Sensitive fields in signing order.
	pub fn sensitive_entries(&self) -> [(&'static str, &DecryptedField); 4] {
		[
			("address", &self.address),
			("mobile", &self.mobile),
			("email", &self.email),
			("payment_amount", &self.payment_amount),
		]
	}

	pub fn unreadable_fields(&self) -> Vec<&'static str> {
		self.sensitive_entries()
			.into_iter()
			.filter(|(_, f)| f.is_unreadable())
			.map(|(name, _)| name)
			.collect()
	}

	/// Plain columns whose stored text does not parse.
	pub fn malformed_fields(&self) -> Vec<&'static str> {
		[
			("payment_method", self.payment_method.is_malformed()),
			("start_date", self.start_date.is_malformed()),
			("end_date", self.end_date.is_malformed()),
		]
		.into_iter()
		.filter(|(_, bad)| *bad)
		.map(|(name, _)| name)
		.collect()
	}

	/// Start and end of the subscription, if both columns parse.
	pub fn period(&self) -> Option<(NaiveDate, NaiveDate)> {
		Some((*self.start_date.valid()?, *self.end_date.valid()?))
	}

	/// The plaintext fields. Fails if any sensitive field is unreadable or
	/// any plain column is malformed.
	pub fn fields(&self) -> StoreResult<RecordFields> {
		let strict = |name: &'static str, field: &DecryptedField| match field {
			DecryptedField::Absent => Ok(None),
			DecryptedField::Present(v) => Ok(Some(v.clone())),
			DecryptedField::Unreadable => Err(StoreError::DecryptionFailed {
				protocol_id: self.protocol_id.clone(),
				field: name,
			}),
		};
		let (Some(payment_method), Some((start_date, end_date))) =
			(self.payment_method.valid(), self.period())
		else {
			return Err(StoreError::IntegrityViolation {
				protocol_id: self.protocol_id.clone(),
			});
		};
		Ok(RecordFields {
			owner_name: self.owner_name.clone(),
			plate: self.plate.clone(),
			payment_method: *payment_method,
			start_date,
			end_date,
			sensitive: SensitiveFields {
				address: strict("address", &self.address)?,
				mobile: strict("mobile", &self.mobile)?,
				email: strict("email", &self.email)?,
				payment_amount: strict("payment_amount", &self.payment_amount)?,
			},
		})
	}

	/// Best-effort plaintext image for audit snapshots.
	pub fn snapshot(&self) -> Value {
		json!({
			"protocol_id": self.protocol_id,
			"owner_name": self.owner_name,
			"plate": self.plate,
			"payment_method": self.payment_method.text(),
			"start_date": self.start_date.text(),
			"end_date": self.end_date.text(),
			"address": self.address.snapshot(),
			"mobile": self.mobile.snapshot(),
			"email": self.email.snapshot(),
			"payment_amount": self.payment_amount.snapshot(),
			"version": self.version,
		})
	}

	/// Case-insensitive substring match over every readable field.
	/// `needle` must already be lowercase.
	pub(crate) fn matches(&self, needle: &str, plate_needle: &str) -> bool {
		if !plate_needle.is_empty() && self.plate.contains(plate_needle) {
			return true;
		}
		let method = self.payment_method.text();
		let start = self.start_date.text();
		let end = self.end_date.text();
		let hit = [
			Some(self.protocol_id.as_str()),
			Some(self.owner_name.as_str()),
			Some(self.plate.as_str()),
			Some(method.as_str()),
			Some(start.as_str()),
			Some(end.as_str()),
			self.address.as_deref(),
			self.mobile.as_deref(),
			self.email.as_deref(),
			self.payment_amount.as_deref(),
		]
		.into_iter()
		.flatten()
		.any(|value| value.to_lowercase().contains(needle));
		hit
	}
}

/// Result of [`RecordStore::verify_all_integrity`](crate::RecordStore::verify_all_integrity).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
	pub total: usize,
	pub verified: usize,
	pub failed: Vec<String>,
}

impl IntegrityReport {
	pub fn failed_count(&self) -> usize {
		self.failed.len()
	}

	pub fn is_clean(&self) -> bool {
		self.failed.is_empty()
	}
}
