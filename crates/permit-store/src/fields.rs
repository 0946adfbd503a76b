// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Plaintext record fields, their normalization and validation.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{StoreError, StoreResult};

pub const MAX_PLATE_LEN: usize = 20;
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
	#[serde(rename = "POS")]
	Pos,
	#[serde(rename = "BOLLETTINO")]
	Bollettino,
}

impl PaymentMethod {
	pub fn as_str(&self) -> &'static str {
		match self {
			PaymentMethod::Pos => "POS",
			PaymentMethod::Bollettino => "BOLLETTINO",
		}
	}
}

impl fmt::Display for PaymentMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Accepts the spellings the front ends produce: card terminals as POS,
/// anything starting with `BOL` as a postal slip.
impl FromStr for PaymentMethod {
	type Err = StoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let upper = s.trim().to_uppercase();
		match upper.as_str() {
			"POS" | "CARD" | "CARTA" | "CARTE" => Ok(PaymentMethod::Pos),
			_ if upper.starts_with("BOL") => Ok(PaymentMethod::Bollettino),
			"" => Err(StoreError::Validation("payment method is required".into())),
			_ => Err(StoreError::Validation(format!(
				"unknown payment method '{}'",
				s.trim()
			))),
		}
	}
}

/// Uppercase alphanumerics only, so `ab-123 cd` and `AB123CD` are one plate.
pub fn normalize_plate(raw: &str) -> String {
	raw.chars()
		.filter(|c| c.is_alphanumeric())
		.flat_map(char::to_uppercase)
		.collect()
}

pub fn parse_date(raw: &str) -> StoreResult<NaiveDate> {
	NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
		.map_err(|e| StoreError::Validation(format!("invalid date '{raw}': {e}")))
}

/// The encrypted subset of a record. `None` means no value, which is stored
/// as such and never encrypted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveFields {
	pub address: Option<String>,
	pub mobile: Option<String>,
	pub email: Option<String>,
	pub payment_amount: Option<String>,
}

impl SensitiveFields {
	/// Column name and value, in signing order.
	pub fn entries(&self) -> [(&'static str, Option<&str>); 4] {
		[
			("address", self.address.as_deref()),
			("mobile", self.mobile.as_deref()),
			("email", self.email.as_deref()),
			("payment_amount", self.payment_amount.as_deref()),
		]
	}

	fn normalized(self) -> Self {
		Self {
			address: non_blank(self.address),
			mobile: non_blank(self.mobile),
			email: non_blank(self.email),
			payment_amount: non_blank(self.payment_amount),
		}
	}
}

fn non_blank(value: Option<String>) -> Option<String> {
	value
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty())
}

/// A complete subscription in plaintext, as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
	pub owner_name: String,
	pub plate: String,
	pub payment_method: PaymentMethod,
	pub start_date: NaiveDate,
	pub end_date: NaiveDate,
	#[serde(default)]
	pub sensitive: SensitiveFields,
}

impl RecordFields {
	pub fn new(
		owner_name: impl Into<String>,
		plate: impl Into<String>,
		payment_method: PaymentMethod,
		start_date: NaiveDate,
		end_date: NaiveDate,
	) -> Self {
		Self {
			owner_name: owner_name.into(),
			plate: plate.into(),
			payment_method,
			start_date,
			end_date,
			sensitive: SensitiveFields::default(),
		}
	}

	pub fn with_sensitive(mut self, sensitive: SensitiveFields) -> Self {
		self.sensitive = sensitive;
		self
	}

	/// Trims and normalizes every field, then checks the record invariants.
	pub fn normalized(self) -> StoreResult<Self> {
		let owner_name = self.owner_name.trim().to_string();
		if owner_name.is_empty() {
			return Err(StoreError::Validation("owner name is required".into()));
		}

		let plate = normalize_plate(&self.plate);
		if plate.is_empty() {
			return Err(StoreError::Validation("plate is required".into()));
		}
		if plate.chars().count() > MAX_PLATE_LEN {
			return Err(StoreError::Validation(format!(
				"plate '{plate}' exceeds {MAX_PLATE_LEN} characters"
			)));
		}

		if self.end_date <= self.start_date {
			return Err(StoreError::Validation(format!(
				"end date {} must be after start date {}",
				self.end_date, self.start_date
			)));
		}

		Ok(Self {
			owner_name,
			plate,
			payment_method: self.payment_method,
			start_date: self.start_date,
			end_date: self.end_date,
			sensitive: self.sensitive.normalized(),
		})
	}

	/// Plaintext image for audit before/after snapshots.
	pub fn snapshot(&self, protocol_id: &str, version: i64) -> Value {
		json!({
			"protocol_id": protocol_id,
			"owner_name": self.owner_name,
			"plate": self.plate,
			"payment_method": self.payment_method.as_str(),
			"start_date": self.start_date.format(DATE_FORMAT).to_string(),
			"end_date": self.end_date.format(DATE_FORMAT).to_string(),
			"address": self.sensitive.address,
			"mobile": self.sensitive.mobile,
			"email": self.sensitive.email,
			"payment_amount": self.sensitive.payment_amount,
			"version": version,
		})
	}
}

/// One field of a [`RecordPatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
	#[default]
	Keep,
	Set(T),
}

impl<T> Patch<T> {
	pub fn apply(self, current: &mut T) {
		if let Patch::Set(value) = self {
			*current = value;
		}
	}

	pub fn is_set(&self) -> bool {
		matches!(self, Patch::Set(_))
	}
}

/// The changes an update makes. Re-applied to fresh state on every retry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
	pub owner_name: Patch<String>,
	pub plate: Patch<String>,
	pub payment_method: Patch<PaymentMethod>,
	pub start_date: Patch<NaiveDate>,
	pub end_date: Patch<NaiveDate>,
	pub address: Patch<Option<String>>,
	pub mobile: Patch<Option<String>>,
	pub email: Patch<Option<String>>,
	pub payment_amount: Patch<Option<String>>,
}

impl RecordPatch {
	/// A patch that sets every field to `fields`.
	pub fn replace_all(fields: RecordFields) -> Self {
		Self {
			owner_name: Patch::Set(fields.owner_name),
			plate: Patch::Set(fields.plate),
			payment_method: Patch::Set(fields.payment_method),
			start_date: Patch::Set(fields.start_date),
			end_date: Patch::Set(fields.end_date),
			address: Patch::Set(fields.sensitive.address),
			mobile: Patch::Set(fields.sensitive.mobile),
			email: Patch::Set(fields.sensitive.email),
			payment_amount: Patch::Set(fields.sensitive.payment_amount),
		}
	}

	pub fn is_empty(&self) -> bool {
		*self == Self::default()
	}

	pub fn apply(&self, mut fields: RecordFields) -> RecordFields {
		self.owner_name.clone().apply(&mut fields.owner_name);
		self.plate.clone().apply(&mut fields.plate);
		self.payment_method.clone().apply(&mut fields.payment_method);
		self.start_date.clone().apply(&mut fields.start_date);
		self.end_date.clone().apply(&mut fields.end_date);
		self.address.clone().apply(&mut fields.sensitive.address);
		self.mobile.clone().apply(&mut fields.sensitive.mobile);
		self.email.clone().apply(&mut fields.sensitive.email);
		self.payment_amount
			.clone()
			.apply(&mut fields.sensitive.payment_amount);
		fields
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn date(s: &str) -> NaiveDate {
		parse_date(s).unwrap()
	}

	#[test]
	fn default_patch_keeps_every_field() {
		assert_eq!(Patch::<PaymentMethod>::default(), Patch::Keep);
		let patch = RecordPatch::default();
		assert!(patch.is_empty());
		assert!(!patch.payment_method.is_set());
	}

	fn rossi() -> RecordFields {
		RecordFields::new(
			"Rossi",
			"AB123CD",
			PaymentMethod::Pos,
			date("2026-01-01"),
			date("2026-12-31"),
		)
	}

	#[test]
	fn payment_method_spellings() {
		for s in ["POS", "pos", " Carta ", "CARD", "carte"] {
			assert_eq!(s.parse::<PaymentMethod>().unwrap(), PaymentMethod::Pos, "{s}");
		}
		for s in ["BOLLETTINO", "bollettino postale", "Bol."] {
			assert_eq!(
				s.parse::<PaymentMethod>().unwrap(),
				PaymentMethod::Bollettino,
				"{s}"
			);
		}
		assert!(matches!(
			"contanti".parse::<PaymentMethod>(),
			Err(StoreError::Validation(_))
		));
		assert!(matches!(
			"".parse::<PaymentMethod>(),
			Err(StoreError::Validation(_))
		));
	}

	#[test]
	fn plate_normalization() {
		assert_eq!(normalize_plate(" ab-123 cd "), "AB123CD");
		assert_eq!(normalize_plate("ab.123.cd"), "AB123CD");
		assert_eq!(normalize_plate("--"), "");
	}

	#[test]
	fn normalized_trims_and_blanks() {
		let mut fields = rossi();
		fields.owner_name = "  Rossi Mario ".into();
		fields.plate = "ab 123 cd".into();
		fields.sensitive.email = Some("   ".into());
		fields.sensitive.mobile = Some(" 3331234567 ".into());
		let n = fields.normalized().unwrap();
		assert_eq!(n.owner_name, "Rossi Mario");
		assert_eq!(n.plate, "AB123CD");
		assert_eq!(n.sensitive.email, None);
		assert_eq!(n.sensitive.mobile.as_deref(), Some("3331234567"));
	}

	#[test]
	fn end_must_follow_start() {
		let mut same_day = rossi();
		same_day.end_date = same_day.start_date;
		assert!(matches!(same_day.normalized(), Err(StoreError::Validation(_))));

		let mut reversed = rossi();
		reversed.end_date = date("2025-12-31");
		assert!(matches!(reversed.normalized(), Err(StoreError::Validation(_))));
	}

	#[test]
	fn blank_owner_and_plate_rejected() {
		let mut no_owner = rossi();
		no_owner.owner_name = "  ".into();
		assert!(no_owner.normalized().is_err());

		let mut no_plate = rossi();
		no_plate.plate = " - ".into();
		assert!(no_plate.normalized().is_err());

		let mut long_plate = rossi();
		long_plate.plate = "A".repeat(MAX_PLATE_LEN + 1);
		assert!(long_plate.normalized().is_err());
	}

	#[test]
	fn patch_applies_only_set_fields() {
		let patch = RecordPatch {
			end_date: Patch::Set(date("2027-06-30")),
			email: Patch::Set(Some("rossi@example.it".into())),
			..Default::default()
		};
		let patched = patch.apply(rossi());
		assert_eq!(patched.owner_name, "Rossi");
		assert_eq!(patched.end_date, date("2027-06-30"));
		assert_eq!(patched.sensitive.email.as_deref(), Some("rossi@example.it"));
		assert!(!patch.is_empty());
		assert!(RecordPatch::default().is_empty());
	}

	#[test]
	fn patch_can_clear_sensitive_field() {
		let mut fields = rossi();
		fields.sensitive.address = Some("Via Roma 1".into());
		let patch = RecordPatch {
			address: Patch::Set(None),
			..Default::default()
		};
		assert_eq!(patch.apply(fields).sensitive.address, None);
	}

	#[test]
	fn replace_all_reproduces_target() {
		let mut target = rossi();
		target.plate = "ZZ999ZZ".into();
		target.sensitive.payment_amount = Some("35.00".into());
		let patched = RecordPatch::replace_all(target.clone()).apply(rossi());
		assert_eq!(patched, target);
	}

	#[test]
	fn snapshot_contains_plaintext() {
		let mut fields = rossi();
		fields.sensitive.address = Some("Via Roma 1".into());
		let snap = fields.snapshot("2026-0000000001", 3);
		assert_eq!(snap["address"], "Via Roma 1");
		assert_eq!(snap["mobile"], Value::Null);
		assert_eq!(snap["start_date"], "2026-01-01");
		assert_eq!(snap["payment_method"], "POS");
		assert_eq!(snap["version"], 3);
	}

	proptest! {
		#[test]
		fn normalized_plate_is_idempotent(raw in "[a-zA-Z0-9 .-]{0,30}") {
			let once = normalize_plate(&raw);
			prop_assert_eq!(normalize_plate(&once), once.clone());
			prop_assert!(once.chars().all(|c| c.is_alphanumeric() && !c.is_lowercase()));
		}
	}
}
