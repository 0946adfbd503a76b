// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
	SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::error::DbError;

/// Create a SqlitePool with WAL mode and bounded lock waits.
///
/// WAL lets the operator tools keep reading while the lookup service writes
/// (and vice versa). `busy_timeout` caps both how long a statement waits for
/// a SQLite lock and how long callers wait for a pooled connection; past it
/// the operation fails instead of hanging.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./data/registry.db")
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(
	database_url: &str,
	busy_timeout: Duration,
	max_connections: u32,
) -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.foreign_keys(true)
		.busy_timeout(busy_timeout)
		.create_if_missing(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(max_connections)
		.acquire_timeout(busy_timeout)
		.connect_with(options)
		.await?;

	tracing::debug!("database pool created");
	Ok(pool)
}
