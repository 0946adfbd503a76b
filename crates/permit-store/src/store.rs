// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The record store: encryption, signing, persistence and auditing of
//! subscriptions behind one API.
//!
//! Every mutation runs in a single SQLite transaction whose first statement
//! is a write, so the database write lock is held from the start and the
//! record change and its audit entry commit together. Updates and deletes
//! are compare-and-swap on the row's `version`.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{Datelike, Utc};
use permit_audit::{format_timestamp, Actor, AuditEntry, AuditOperation, AuditTrail};
use permit_crypto::{Attestation, FieldCipher, KeyMaterial, RecordSigner};
use permit_db::{next_protocol_id, RecordRepository, RecordRow, SqliteConnection, SqlitePool};
use tracing::{debug, info, instrument, warn};

use crate::error::{StoreError, StoreResult};
use crate::fields::{normalize_plate, parse_date, PaymentMethod, RecordFields, RecordPatch, DATE_FORMAT};
use crate::record::{DecryptedField, IntegrityReport, IntegrityStatus, PlainField, Record};

#[derive(Debug, Clone)]
pub struct StoreSettings {
	/// Minimum justification length, in characters, for any mutation.
	pub min_reason_length: usize,
	/// Extra attempts `update` and `delete` make after losing a race.
	pub update_max_retries: u32,
}

impl Default for StoreSettings {
	fn default() -> Self {
		Self {
			min_reason_length: 10,
			update_max_retries: 3,
		}
	}
}

/// Encrypted sensitive columns, in signing order.
struct SealedFields {
	address: Option<String>,
	mobile: Option<String>,
	email: Option<String>,
	payment_amount: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecordStore {
	pool: SqlitePool,
	records: RecordRepository,
	audit: AuditTrail,
	cipher: FieldCipher,
	signer: RecordSigner,
	keys: Arc<KeyMaterial>,
	settings: StoreSettings,
}

impl RecordStore {
	pub fn new(pool: SqlitePool, keys: Arc<KeyMaterial>, settings: StoreSettings) -> Self {
		Self {
			records: RecordRepository::new(pool.clone()),
			audit: AuditTrail::new(pool.clone()),
			cipher: keys.cipher(),
			signer: keys.signer(),
			pool,
			keys,
			settings,
		}
	}

	pub fn audit(&self) -> &AuditTrail {
		&self.audit
	}

	pub fn settings(&self) -> &StoreSettings {
		&self.settings
	}

	pub fn keys(&self) -> &KeyMaterial {
		&self.keys
	}

	// =========================================================================
	// Mutations
	// =========================================================================

	#[instrument(skip(self, input, actor, reason), fields(actor = %actor.user))]
	pub async fn create(
		&self,
		input: RecordFields,
		actor: &Actor,
		reason: &str,
	) -> StoreResult<String> {
		self.check_reason(reason)?;
		let fields = input.normalized()?;
		let sealed = self.seal(&fields)?;

		let mut tx = self.pool.begin().await?;
		let id = self.insert_new(&mut tx, &fields, sealed, actor, reason).await?;
		tx.commit().await?;

		info!(protocol_id = %id, "record created");
		Ok(id)
	}

	/// Validates every item, then inserts all of them with one `create` audit
	/// entry each in a single transaction. Nothing is written if any fails.
	#[instrument(skip(self, items, actor, reason), fields(count = items.len(), actor = %actor.user))]
	pub async fn create_batch(
		&self,
		items: Vec<RecordFields>,
		actor: &Actor,
		reason: &str,
	) -> StoreResult<Vec<String>> {
		self.check_reason(reason)?;

		let mut plates = HashSet::new();
		let mut prepared = Vec::with_capacity(items.len());
		for (index, item) in items.into_iter().enumerate() {
			let fields = item
				.normalized()
				.map_err(|e| StoreError::Validation(format!("item {}: {e}", index + 1)))?;
			if !plates.insert(fields.plate.clone()) {
				return Err(StoreError::Validation(format!(
					"item {}: plate {} appears more than once",
					index + 1,
					fields.plate
				)));
			}
			let sealed = self.seal(&fields)?;
			prepared.push((fields, sealed));
		}

		if prepared.is_empty() {
			return Ok(Vec::new());
		}

		let mut tx = self.pool.begin().await?;
		let mut ids = Vec::with_capacity(prepared.len());
		for (fields, sealed) in prepared {
			ids.push(self.insert_new(&mut tx, &fields, sealed, actor, reason).await?);
		}
		tx.commit().await?;

		info!(count = ids.len(), "batch created");
		Ok(ids)
	}

	/// Applies `patch` to the current state of `protocol_id`, retrying on
	/// concurrent modification up to the configured limit. Returns the new
	/// version.
	#[instrument(skip(self, patch, actor, reason), fields(actor = %actor.user))]
	pub async fn update(
		&self,
		protocol_id: &str,
		patch: &RecordPatch,
		actor: &Actor,
		reason: &str,
	) -> StoreResult<i64> {
		self.check_reason(reason)?;
		self.retrying(protocol_id, move || {
			self.try_update(protocol_id, patch, None, actor, reason)
		})
		.await
	}

	/// Like [`update`](Self::update), but only if the record is still at
	/// `expected_version`. Never retries.
	#[instrument(skip(self, patch, actor, reason), fields(actor = %actor.user))]
	pub async fn update_if_version(
		&self,
		protocol_id: &str,
		expected_version: i64,
		patch: &RecordPatch,
		actor: &Actor,
		reason: &str,
	) -> StoreResult<i64> {
		self.check_reason(reason)?;
		self.try_update(protocol_id, patch, Some(expected_version), actor, reason)
			.await
	}

	/// Records the full pre-image in the audit trail, then removes the row.
	/// Tamper-flagged records may be deleted; unreadable fields appear as
	/// placeholders in the snapshot.
	#[instrument(skip(self, actor, reason), fields(actor = %actor.user))]
	pub async fn delete(&self, protocol_id: &str, actor: &Actor, reason: &str) -> StoreResult<()> {
		self.check_reason(reason)?;
		self.retrying(protocol_id, move || self.try_delete(protocol_id, actor, reason))
			.await
	}

	// =========================================================================
	// Reads
	// =========================================================================

	/// Decrypts and verifies one record. A signature mismatch is reported in
	/// [`Record::integrity`], not as an error.
	#[instrument(skip(self))]
	pub async fn get(&self, protocol_id: &str) -> StoreResult<Record> {
		let row = self
			.records
			.get(protocol_id)
			.await?
			.ok_or_else(|| StoreError::NotFound(protocol_id.to_string()))?;
		Ok(self.open(&row))
	}

	#[instrument(skip(self, plate))]
	pub async fn find_by_plate(&self, plate: &str) -> StoreResult<Option<Record>> {
		let plate = normalize_plate(plate);
		if plate.is_empty() {
			return Ok(None);
		}
		match self.records.find_by_plate(&plate).await? {
			Some(row) => Ok(Some(self.open(&row))),
			None => Ok(None),
		}
	}

	/// Every record ordered by protocol id, decrypted best-effort.
	#[instrument(skip(self))]
	pub async fn list_all(&self) -> StoreResult<Vec<Record>> {
		let rows = self.records.list_all().await?;
		Ok(rows.iter().map(|row| self.open(row)).collect())
	}

	/// Case-insensitive substring search over plain and decrypted fields.
	///
	/// Ciphertext is neither order- nor substring-preserving, so this
	/// decrypts and scans every record: cost is linear in the store size.
	/// An empty query returns every record.
	#[instrument(skip(self, query))]
	pub async fn search(&self, query: &str) -> StoreResult<Vec<Record>> {
		let needle = query.trim().to_lowercase();
		let all = self.list_all().await?;
		if needle.is_empty() {
			return Ok(all);
		}
		let plate_needle = normalize_plate(&needle);
		let hits: Vec<Record> = all
			.into_iter()
			.filter(|r| r.matches(&needle, &plate_needle))
			.collect();
		debug!(hits = hits.len(), "search complete");
		Ok(hits)
	}

	/// Recomputes every stored signature. Read-only; never repairs.
	#[instrument(skip(self))]
	pub async fn verify_all_integrity(&self) -> StoreResult<IntegrityReport> {
		let rows = self.records.list_all().await?;
		let mut report = IntegrityReport {
			total: rows.len(),
			..Default::default()
		};
		for row in &rows {
			if self.signer.verify(&row.stored_fields(), &row.signature) {
				report.verified += 1;
			} else {
				warn!(protocol_id = %row.protocol_id, "integrity check failed");
				report.failed.push(row.protocol_id.clone());
			}
		}
		info!(
			total = report.total,
			failed = report.failed_count(),
			"integrity scan complete"
		);
		Ok(report)
	}

	/// RSA-PSS attestation of a verified record.
	#[instrument(skip(self))]
	pub async fn attest(&self, protocol_id: &str) -> StoreResult<Attestation> {
		let row = self
			.records
			.get(protocol_id)
			.await?
			.ok_or_else(|| StoreError::NotFound(protocol_id.to_string()))?;
		self.verify_row(&row)?;
		Ok(self.signer.attest(&row.stored_fields()))
	}

	pub fn public_key_pem(&self) -> StoreResult<String> {
		Ok(self.keys.public_key_pem()?)
	}

	// =========================================================================
	// Internals
	// =========================================================================

	fn check_reason(&self, reason: &str) -> StoreResult<()> {
		let len = reason.trim().chars().count();
		if len < self.settings.min_reason_length {
			return Err(StoreError::Validation(format!(
				"reason must be at least {} characters (got {len})",
				self.settings.min_reason_length
			)));
		}
		Ok(())
	}

	async fn retrying<T, F, Fut>(&self, protocol_id: &str, mut attempt: F) -> StoreResult<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = StoreResult<T>>,
	{
		let mut retries = 0;
		loop {
			match attempt().await {
				Err(StoreError::ConcurrentModification(_))
					if retries < self.settings.update_max_retries =>
				{
					retries += 1;
					debug!(protocol_id, retries, "lost race, retrying");
				}
				other => return other,
			}
		}
	}

	async fn try_update(
		&self,
		protocol_id: &str,
		patch: &RecordPatch,
		expected_version: Option<i64>,
		actor: &Actor,
		reason: &str,
	) -> StoreResult<i64> {
		let row = self
			.records
			.get(protocol_id)
			.await?
			.ok_or_else(|| StoreError::NotFound(protocol_id.to_string()))?;
		if let Some(expected) = expected_version {
			if row.version != expected {
				return Err(StoreError::ConcurrentModification(protocol_id.to_string()));
			}
		}
		self.verify_row(&row)?;

		let before = self.open(&row).fields()?;
		let after = patch.apply(before.clone()).normalized()?;

		let sealed = SealedFields {
			address: self.reseal(
				&before.sensitive.address,
				&after.sensitive.address,
				&row.address_enc,
			)?,
			mobile: self.reseal(&before.sensitive.mobile, &after.sensitive.mobile, &row.mobile_enc)?,
			email: self.reseal(&before.sensitive.email, &after.sensitive.email, &row.email_enc)?,
			payment_amount: self.reseal(
				&before.sensitive.payment_amount,
				&after.sensitive.payment_amount,
				&row.payment_amount_enc,
			)?,
		};
		let now = Utc::now();
		let version = row.version + 1;
		let new_row = self.signed_row(
			protocol_id,
			&after,
			sealed,
			row.created_at.clone(),
			format_timestamp(&now),
			version,
		)?;

		let entry = AuditEntry::builder(AuditOperation::Update, protocol_id)
			.actor(actor.clone())
			.reason(reason.trim())
			.before(before.snapshot(protocol_id, row.version))
			.after(after.snapshot(protocol_id, version))
			.at(now)
			.build();

		let mut tx = self.pool.begin().await?;
		if !RecordRepository::update_if_version(&mut tx, &new_row, row.version).await? {
			tx.rollback().await?;
			return Err(self.lost_race(protocol_id).await?);
		}
		AuditTrail::append(&mut tx, &entry).await?;
		tx.commit().await?;

		info!(protocol_id, version, "record updated");
		Ok(version)
	}

	async fn try_delete(&self, protocol_id: &str, actor: &Actor, reason: &str) -> StoreResult<()> {
		let row = self
			.records
			.get(protocol_id)
			.await?
			.ok_or_else(|| StoreError::NotFound(protocol_id.to_string()))?;
		let before = self.open(&row);
		if !before.is_verified() {
			warn!(protocol_id, "deleting record that failed integrity verification");
		}

		let entry = AuditEntry::builder(AuditOperation::Delete, protocol_id)
			.actor(actor.clone())
			.reason(reason.trim())
			.before(before.snapshot())
			.build();

		let mut tx = self.pool.begin().await?;
		if !RecordRepository::delete_if_version(&mut tx, protocol_id, row.version).await? {
			tx.rollback().await?;
			return Err(self.lost_race(protocol_id).await?);
		}
		AuditTrail::append(&mut tx, &entry).await?;
		tx.commit().await?;

		info!(protocol_id, "record deleted");
		Ok(())
	}

	/// A CAS write matched no row: either someone else got there first or the
	/// record is gone.
	async fn lost_race(&self, protocol_id: &str) -> StoreResult<StoreError> {
		if self.records.exists(protocol_id).await? {
			Ok(StoreError::ConcurrentModification(protocol_id.to_string()))
		} else {
			Ok(StoreError::NotFound(protocol_id.to_string()))
		}
	}

	async fn insert_new(
		&self,
		conn: &mut SqliteConnection,
		fields: &RecordFields,
		sealed: SealedFields,
		actor: &Actor,
		reason: &str,
	) -> StoreResult<String> {
		let now = Utc::now();
		let id = next_protocol_id(conn, now.year()).await?;
		let timestamp = format_timestamp(&now);
		let row = self.signed_row(&id, fields, sealed, timestamp.clone(), timestamp, 1)?;
		RecordRepository::insert(conn, &row).await?;

		let entry = AuditEntry::builder(AuditOperation::Create, &id)
			.actor(actor.clone())
			.reason(reason.trim())
			.after(fields.snapshot(&id, 1))
			.at(now)
			.build();
		AuditTrail::append(conn, &entry).await?;
		Ok(id)
	}

	fn seal(&self, fields: &RecordFields) -> StoreResult<SealedFields> {
		let s = &fields.sensitive;
		Ok(SealedFields {
			address: self.cipher.encrypt_optional(s.address.as_deref())?,
			mobile: self.cipher.encrypt_optional(s.mobile.as_deref())?,
			email: self.cipher.encrypt_optional(s.email.as_deref())?,
			payment_amount: self.cipher.encrypt_optional(s.payment_amount.as_deref())?,
		})
	}

	/// Unchanged values keep their stored token.
	fn reseal(
		&self,
		before: &Option<String>,
		after: &Option<String>,
		stored: &Option<String>,
	) -> StoreResult<Option<String>> {
		if before == after {
			Ok(stored.clone())
		} else {
			Ok(self.cipher.encrypt_optional(after.as_deref())?)
		}
	}

	fn signed_row(
		&self,
		protocol_id: &str,
		fields: &RecordFields,
		sealed: SealedFields,
		created_at: String,
		updated_at: String,
		version: i64,
	) -> StoreResult<RecordRow> {
		let mut row = RecordRow {
			protocol_id: protocol_id.to_string(),
			owner_name: fields.owner_name.clone(),
			plate: fields.plate.clone(),
			payment_method: fields.payment_method.as_str().to_string(),
			start_date: fields.start_date.format(DATE_FORMAT).to_string(),
			end_date: fields.end_date.format(DATE_FORMAT).to_string(),
			address_enc: sealed.address,
			mobile_enc: sealed.mobile,
			email_enc: sealed.email,
			payment_amount_enc: sealed.payment_amount,
			signature: String::new(),
			version,
			created_at,
			updated_at,
		};
		row.signature = self.signer.sign(&row.stored_fields())?;
		Ok(row)
	}

	fn verify_row(&self, row: &RecordRow) -> StoreResult<()> {
		if self.signer.verify(&row.stored_fields(), &row.signature) {
			Ok(())
		} else {
			warn!(protocol_id = %row.protocol_id, "stored signature mismatch");
			Err(StoreError::IntegrityViolation {
				protocol_id: row.protocol_id.clone(),
			})
		}
	}

	/// Verifies and decrypts a row. Unreadable fields, malformed plain
	/// columns and a failed signature are reported inside the record; this
	/// never fails, so one damaged row cannot hide the rest of the store.
	fn open(&self, row: &RecordRow) -> Record {
		let integrity = if self.signer.verify(&row.stored_fields(), &row.signature) {
			IntegrityStatus::Verified
		} else {
			warn!(protocol_id = %row.protocol_id, "record failed integrity verification");
			IntegrityStatus::Failed
		};

		let payment_method = plain(row.payment_method.parse::<PaymentMethod>(), &row.payment_method);
		let start_date = plain(parse_date(&row.start_date), &row.start_date);
		let end_date = plain(parse_date(&row.end_date), &row.end_date);
		let record = Record {
			protocol_id: row.protocol_id.clone(),
			owner_name: row.owner_name.clone(),
			plate: row.plate.clone(),
			payment_method,
			start_date,
			end_date,
			address: self.decrypt_field(&row.protocol_id, "address", &row.address_enc),
			mobile: self.decrypt_field(&row.protocol_id, "mobile", &row.mobile_enc),
			email: self.decrypt_field(&row.protocol_id, "email", &row.email_enc),
			payment_amount: self.decrypt_field(
				&row.protocol_id,
				"payment_amount",
				&row.payment_amount_enc,
			),
			version: row.version,
			created_at: row.created_at.clone(),
			updated_at: row.updated_at.clone(),
			integrity,
		};

		let malformed = record.malformed_fields();
		if malformed.is_empty() {
			return record;
		}
		warn!(protocol_id = %row.protocol_id, fields = ?malformed, "record has malformed plain columns");
		Record {
			integrity: IntegrityStatus::Failed,
			..record
		}
	}

	fn decrypt_field(&self, protocol_id: &str, field: &str, token: &Option<String>) -> DecryptedField {
		match token {
			None => DecryptedField::Absent,
			Some(token) => match self.cipher.decrypt_str(token) {
				Ok(value) => DecryptedField::Present(value),
				Err(e) => {
					warn!(protocol_id, field, error = %e, "field cannot be decrypted");
					DecryptedField::Unreadable
				}
			},
		}
	}
}

fn plain<T>(parsed: StoreResult<T>, raw: &str) -> PlainField<T> {
	match parsed {
		Ok(v) => PlainField::Valid(v),
		Err(_) => PlainField::Malformed(raw.to_string()),
	}
}
