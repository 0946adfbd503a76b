// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::SqlitePool;

use crate::error::DbError;

const MIGRATIONS: [(&str, &str); 3] = [
	(
		"001_subscriptions",
		include_str!("../migrations/001_subscriptions.sql"),
	),
	("002_audit_log", include_str!("../migrations/002_audit_log.sql")),
	(
		"003_protocol_sequence",
		include_str!("../migrations/003_protocol_sequence.sql"),
	),
];

/// Applies every migration. Each one is idempotent, so this runs on every
/// start of both front ends.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
	for (name, sql) in MIGRATIONS {
		if let Err(e) = sqlx::raw_sql(sql).execute(pool).await {
			let msg = e.to_string();
			if !msg.contains("already exists") {
				tracing::error!(migration = name, error = %e, "migration failed");
				return Err(e.into());
			}
		}
		tracing::debug!(migration = name, "migration applied");
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	#[tokio::test]
	async fn migrations_are_idempotent() {
		let pool = create_test_pool().await;
		run_migrations(&pool).await.unwrap();
		run_migrations(&pool).await.unwrap();
	}

	#[tokio::test]
	async fn audit_log_rejects_update_and_delete() {
		let pool = create_test_pool().await;
		sqlx::query(
			"INSERT INTO audit_log (id, operation, protocol_id, timestamp, actor_user, reason) \
			 VALUES ('a', 'create', '2026-0000000001', '2026-01-01T00:00:00.000000Z', 'op', 'initial load')",
		)
		.execute(&pool)
		.await
		.unwrap();

		let update = sqlx::query("UPDATE audit_log SET reason = 'rewritten'")
			.execute(&pool)
			.await;
		assert!(update.unwrap_err().to_string().contains("append-only"));

		let delete = sqlx::query("DELETE FROM audit_log").execute(&pool).await;
		assert!(delete.unwrap_err().to_string().contains("append-only"));
	}

	#[tokio::test]
	async fn subscriptions_enforce_date_order_and_payment_set() {
		let pool = create_test_pool().await;
		let insert = |start: &'static str, end: &'static str, method: &'static str| {
			sqlx::query(
				"INSERT INTO subscriptions (protocol_id, owner_name, plate, payment_method, \
				 start_date, end_date, signature, created_at, updated_at) \
				 VALUES (?, 'Rossi', ?, ?, ?, ?, 'sig', 'now', 'now')",
			)
			.bind(format!("{start}-{end}-{method}"))
			.bind(format!("P{start}{end}{method}"))
			.bind(method)
			.bind(start)
			.bind(end)
		};

		assert!(insert("2026-12-31", "2026-01-01", "POS")
			.execute(&pool)
			.await
			.is_err());
		assert!(insert("2026-01-01", "2026-12-31", "CASH")
			.execute(&pool)
			.await
			.is_err());
		assert!(insert("2026-01-01", "2026-12-31", "BOLLETTINO")
			.execute(&pool)
			.await
			.is_ok());
	}
}
