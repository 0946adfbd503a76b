// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Protocol identifier allocation: `YYYY-NNNNNNNNNN`.

use sqlx::SqliteConnection;

use crate::error::{DbError, Result};

/// Width of the zero-padded sequence part.
pub const SEQUENCE_DIGITS: usize = 10;

pub fn format_protocol_id(year: i32, sequence: i64) -> String {
	format!("{year:04}-{sequence:0width$}", width = SEQUENCE_DIGITS)
}

/// Splits a protocol id into `(year, sequence)`.
pub fn parse_protocol_id(id: &str) -> Option<(i32, i64)> {
	let (year, sequence) = id.split_once('-')?;
	if year.len() != 4 || sequence.len() != SEQUENCE_DIGITS {
		return None;
	}
	if !year.bytes().chain(sequence.bytes()).all(|b| b.is_ascii_digit()) {
		return None;
	}
	Some((year.parse().ok()?, sequence.parse().ok()?))
}

/// Reserves the next protocol id for `year`.
///
/// This is a write, so issued as the first statement of a transaction it also
/// takes the database write lock before anything is read. The first
/// allocation of a year continues after the highest id already stored.
#[tracing::instrument(skip(conn))]
pub async fn next_protocol_id(conn: &mut SqliteConnection, year: i32) -> Result<String> {
	let prefix = format!("{year:04}-%");
	let next: i64 = sqlx::query_scalar(
		r#"
		INSERT INTO protocol_sequence (year, last_value)
		VALUES (
			?,
			(SELECT COALESCE(MAX(CAST(substr(protocol_id, 6) AS INTEGER)), 0) + 1
			 FROM subscriptions WHERE protocol_id LIKE ?)
		)
		ON CONFLICT(year) DO UPDATE SET last_value = last_value + 1
		RETURNING last_value
		"#,
	)
	.bind(year)
	.bind(prefix)
	.fetch_one(conn)
	.await?;

	if next >= 10_i64.pow(SEQUENCE_DIGITS as u32) {
		return Err(DbError::Internal(format!(
			"protocol sequence for {year} exhausted"
		)));
	}

	Ok(format_protocol_id(year, next))
}
