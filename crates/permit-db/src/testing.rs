// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;
use std::time::Duration;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tempfile::TempDir;

use crate::migrations::run_migrations;
use crate::pool::create_pool;
use crate::record::RecordRow;

/// Single-connection in-memory database with the schema applied.
pub async fn create_test_pool() -> SqlitePool {
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.connect(":memory:")
		.await
		.unwrap();
	run_migrations(&pool).await.unwrap();
	pool
}

/// File-backed database so several connections (or pools, standing in for
/// separate processes) share one store.
pub struct TestDb {
	pub pool: SqlitePool,
	pub path: PathBuf,
	_dir: TempDir,
}

impl TestDb {
	pub fn url(&self) -> String {
		format!("sqlite:{}", self.path.display())
	}

	/// A second, independent pool on the same file.
	pub async fn second_pool(&self) -> SqlitePool {
		create_pool(&self.url(), Duration::from_secs(5), 4)
			.await
			.unwrap()
	}
}

pub async fn create_test_db() -> TestDb {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("registry.db");
	let pool = create_pool(
		&format!("sqlite:{}", path.display()),
		Duration::from_secs(5),
		4,
	)
	.await
	.unwrap();
	run_migrations(&pool).await.unwrap();
	TestDb {
		pool,
		path,
		_dir: dir,
	}
}

/// A structurally valid row with a placeholder signature.
pub fn sample_row(protocol_id: &str, plate: &str) -> RecordRow {
	RecordRow {
		protocol_id: protocol_id.to_string(),
		owner_name: "Rossi".to_string(),
		plate: plate.to_string(),
		payment_method: "POS".to_string(),
		start_date: "2026-01-01".to_string(),
		end_date: "2026-12-31".to_string(),
		address_enc: None,
		mobile_enc: None,
		email_enc: None,
		payment_amount_enc: None,
		signature: "00".to_string(),
		version: 1,
		created_at: "2026-01-01T09:00:00.000000Z".to_string(),
		updated_at: "2026-01-01T09:00:00.000000Z".to_string(),
	}
}
