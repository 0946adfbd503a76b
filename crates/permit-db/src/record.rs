// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stored subscription rows.
//!
//! Writes take a `&mut SqliteConnection` so the caller decides the
//! transaction boundary; updates and deletes are compare-and-swap on
//! `version`.

use permit_crypto::StoredFields;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::Result;

const SELECT_COLUMNS: &str = "protocol_id, owner_name, plate, payment_method, start_date, \
	end_date, address_enc, mobile_enc, email_enc, payment_amount_enc, signature, version, \
	created_at, updated_at";

/// One row of `subscriptions`, exactly as persisted.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RecordRow {
	pub protocol_id: String,
	pub owner_name: String,
	pub plate: String,
	pub payment_method: String,
	pub start_date: String,
	pub end_date: String,
	pub address_enc: Option<String>,
	pub mobile_enc: Option<String>,
	pub email_enc: Option<String>,
	pub payment_amount_enc: Option<String>,
	pub signature: String,
	pub version: i64,
	pub created_at: String,
	pub updated_at: String,
}

impl RecordRow {
	/// The signed view of this row (everything except the signature itself).
	pub fn stored_fields(&self) -> StoredFields<'_> {
		StoredFields {
			protocol_id: &self.protocol_id,
			owner_name: &self.owner_name,
			plate: &self.plate,
			payment_method: &self.payment_method,
			start_date: &self.start_date,
			end_date: &self.end_date,
			address: self.address_enc.as_deref(),
			mobile: self.mobile_enc.as_deref(),
			email: self.email_enc.as_deref(),
			payment_amount: self.payment_amount_enc.as_deref(),
			created_at: &self.created_at,
			updated_at: &self.updated_at,
			version: self.version,
		}
	}
}

#[derive(Debug, Clone)]
pub struct RecordRepository {
	pool: SqlitePool,
}

impl RecordRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	#[tracing::instrument(skip(self))]
	pub async fn get(&self, protocol_id: &str) -> Result<Option<RecordRow>> {
		let sql = format!("SELECT {SELECT_COLUMNS} FROM subscriptions WHERE protocol_id = ?");
		let row = sqlx::query_as::<_, RecordRow>(&sql)
			.bind(protocol_id)
			.fetch_optional(&self.pool)
			.await?;
		Ok(row)
	}

	#[tracing::instrument(skip(self))]
	pub async fn find_by_plate(&self, plate: &str) -> Result<Option<RecordRow>> {
		let sql = format!("SELECT {SELECT_COLUMNS} FROM subscriptions WHERE plate = ?");
		let row = sqlx::query_as::<_, RecordRow>(&sql)
			.bind(plate)
			.fetch_optional(&self.pool)
			.await?;
		Ok(row)
	}

	/// Every row, ordered by protocol id.
	#[tracing::instrument(skip(self))]
	pub async fn list_all(&self) -> Result<Vec<RecordRow>> {
		let sql = format!("SELECT {SELECT_COLUMNS} FROM subscriptions ORDER BY protocol_id");
		let rows = sqlx::query_as::<_, RecordRow>(&sql)
			.fetch_all(&self.pool)
			.await?;
		Ok(rows)
	}

	pub async fn count(&self) -> Result<i64> {
		let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions")
			.fetch_one(&self.pool)
			.await?;
		Ok(count)
	}

	pub async fn exists(&self, protocol_id: &str) -> Result<bool> {
		let found: Option<i64> =
			sqlx::query_scalar("SELECT 1 FROM subscriptions WHERE protocol_id = ?")
				.bind(protocol_id)
				.fetch_optional(&self.pool)
				.await?;
		Ok(found.is_some())
	}

	pub async fn insert(conn: &mut SqliteConnection, row: &RecordRow) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO subscriptions (
				protocol_id, owner_name, plate, payment_method, start_date, end_date,
				address_enc, mobile_enc, email_enc, payment_amount_enc,
				signature, version, created_at, updated_at
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&row.protocol_id)
		.bind(&row.owner_name)
		.bind(&row.plate)
		.bind(&row.payment_method)
		.bind(&row.start_date)
		.bind(&row.end_date)
		.bind(&row.address_enc)
		.bind(&row.mobile_enc)
		.bind(&row.email_enc)
		.bind(&row.payment_amount_enc)
		.bind(&row.signature)
		.bind(row.version)
		.bind(&row.created_at)
		.bind(&row.updated_at)
		.execute(conn)
		.await?;
		Ok(())
	}

	/// Replaces the row only if its stored version is still
	/// `expected_version`. Returns whether a row was written.
	pub async fn update_if_version(
		conn: &mut SqliteConnection,
		row: &RecordRow,
		expected_version: i64,
	) -> Result<bool> {
		let result = sqlx::query(
			r#"
			UPDATE subscriptions SET
				owner_name = ?, plate = ?, payment_method = ?, start_date = ?, end_date = ?,
				address_enc = ?, mobile_enc = ?, email_enc = ?, payment_amount_enc = ?,
				signature = ?, version = ?, updated_at = ?
			WHERE protocol_id = ? AND version = ?
			"#,
		)
		.bind(&row.owner_name)
		.bind(&row.plate)
		.bind(&row.payment_method)
		.bind(&row.start_date)
		.bind(&row.end_date)
		.bind(&row.address_enc)
		.bind(&row.mobile_enc)
		.bind(&row.email_enc)
		.bind(&row.payment_amount_enc)
		.bind(&row.signature)
		.bind(row.version)
		.bind(&row.updated_at)
		.bind(&row.protocol_id)
		.bind(expected_version)
		.execute(conn)
		.await?;
		Ok(result.rows_affected() == 1)
	}

	pub async fn delete_if_version(
		conn: &mut SqliteConnection,
		protocol_id: &str,
		expected_version: i64,
	) -> Result<bool> {
		let result = sqlx::query("DELETE FROM subscriptions WHERE protocol_id = ? AND version = ?")
			.bind(protocol_id)
			.bind(expected_version)
			.execute(conn)
			.await?;
		Ok(result.rows_affected() == 1)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_test_pool, sample_row};

	#[tokio::test]
	async fn insert_then_get() {
		let pool = create_test_pool().await;
		let repo = RecordRepository::new(pool.clone());
		let row = sample_row("2026-0000000001", "AB123CD");

		let mut conn = pool.acquire().await.unwrap();
		RecordRepository::insert(&mut conn, &row).await.unwrap();
		drop(conn);

		assert_eq!(repo.get("2026-0000000001").await.unwrap(), Some(row.clone()));
		assert_eq!(repo.find_by_plate("AB123CD").await.unwrap(), Some(row));
		assert!(repo.exists("2026-0000000001").await.unwrap());
		assert!(repo.get("2026-0000000002").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn duplicate_plate_is_unique_violation() {
		let pool = create_test_pool().await;
		let mut conn = pool.acquire().await.unwrap();
		RecordRepository::insert(&mut conn, &sample_row("2026-0000000001", "AB123CD"))
			.await
			.unwrap();
		let err = RecordRepository::insert(&mut conn, &sample_row("2026-0000000002", "AB123CD"))
			.await
			.unwrap_err();
		assert!(err.is_unique_violation());
	}

	#[tokio::test]
	async fn stale_version_does_not_update() {
		let pool = create_test_pool().await;
		let repo = RecordRepository::new(pool.clone());
		let row = sample_row("2026-0000000001", "AB123CD");
		let mut conn = pool.acquire().await.unwrap();
		RecordRepository::insert(&mut conn, &row).await.unwrap();

		let mut next = row.clone();
		next.owner_name = "Bianchi".into();
		next.version = 2;
		assert!(RecordRepository::update_if_version(&mut conn, &next, 1)
			.await
			.unwrap());

		let mut stale = row.clone();
		stale.owner_name = "Verdi".into();
		stale.version = 2;
		assert!(!RecordRepository::update_if_version(&mut conn, &stale, 1)
			.await
			.unwrap());
		drop(conn);

		let stored = repo.get("2026-0000000001").await.unwrap().unwrap();
		assert_eq!(stored.owner_name, "Bianchi");
		assert_eq!(stored.version, 2);
	}

	#[tokio::test]
	async fn delete_requires_matching_version() {
		let pool = create_test_pool().await;
		let repo = RecordRepository::new(pool.clone());
		let mut conn = pool.acquire().await.unwrap();
		RecordRepository::insert(&mut conn, &sample_row("2026-0000000001", "AB123CD"))
			.await
			.unwrap();

		assert!(!RecordRepository::delete_if_version(&mut conn, "2026-0000000001", 7)
			.await
			.unwrap());
		assert!(RecordRepository::delete_if_version(&mut conn, "2026-0000000001", 1)
			.await
			.unwrap());
		drop(conn);
		assert_eq!(repo.count().await.unwrap(), 0);
	}

	#[tokio::test]
	async fn list_all_is_ordered_by_protocol_id() {
		let pool = create_test_pool().await;
		let repo = RecordRepository::new(pool.clone());
		let mut conn = pool.acquire().await.unwrap();
		for (id, plate) in [
			("2026-0000000003", "CC333CC"),
			("2025-0000000009", "AA111AA"),
			("2026-0000000001", "BB222BB"),
		] {
			RecordRepository::insert(&mut conn, &sample_row(id, plate))
				.await
				.unwrap();
		}
		drop(conn);

		let ids: Vec<_> = repo
			.list_all()
			.await
			.unwrap()
			.into_iter()
			.map(|r| r.protocol_id)
			.collect();
		assert_eq!(
			ids,
			vec!["2025-0000000009", "2026-0000000001", "2026-0000000003"]
		);
	}

	#[test]
	fn stored_fields_mirror_row() {
		let row = sample_row("2026-0000000001", "AB123CD");
		let fields = row.stored_fields();
		assert_eq!(fields.protocol_id, "2026-0000000001");
		assert_eq!(fields.plate, "AB123CD");
		assert_eq!(fields.address, None);
		assert_eq!(fields.version, 1);
	}
}
