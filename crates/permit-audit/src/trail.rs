// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite-backed audit trail.
//!
//! Entries are appended on the caller's connection so that a mutation and
//! its audit entry commit or roll back together. The table carries triggers
//! that abort any UPDATE or DELETE, and this type exposes no way to issue one.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{AuditError, AuditResult};
use crate::event::{Actor, AuditEntry, AuditOperation};

/// Filters for [`AuditTrail::query`]. All are optional and combine with AND.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
	pub operation: Option<AuditOperation>,
	/// Case-insensitive substring over id, actor, reason and both snapshots.
	pub text: Option<String>,
	pub protocol_id: Option<String>,
	/// Oldest `limit` matches only. `None` returns every match.
	pub limit: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct AuditRow {
	id: String,
	operation: String,
	protocol_id: String,
	timestamp: String,
	actor_user: String,
	actor_host: Option<String>,
	actor_process: Option<String>,
	remote_address: Option<String>,
	reason: String,
	before_data: Option<String>,
	after_data: Option<String>,
}

impl TryFrom<AuditRow> for AuditEntry {
	type Error = AuditError;

	fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
		let malformed = |reason: String| AuditError::Malformed {
			id: row.id.clone(),
			reason,
		};
		let id = Uuid::parse_str(&row.id).map_err(|e| malformed(format!("id: {e}")))?;
		let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
			.map_err(|e| malformed(format!("timestamp: {e}")))?
			.with_timezone(&Utc);
		let operation = row.operation.parse::<AuditOperation>().map_err(malformed)?;
		let before = row
			.before_data
			.as_deref()
			.map(serde_json::from_str)
			.transpose()?;
		let after = row
			.after_data
			.as_deref()
			.map(serde_json::from_str)
			.transpose()?;

		Ok(AuditEntry {
			id,
			timestamp,
			operation,
			protocol_id: row.protocol_id,
			actor: Actor {
				user: row.actor_user,
				host: row.actor_host,
				process: row.actor_process,
				remote_address: row.remote_address,
			},
			reason: row.reason,
			before,
			after,
		})
	}
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone)]
pub struct AuditTrail {
	pool: SqlitePool,
}

impl AuditTrail {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Appends `entry` on `conn`, normally inside the mutation's transaction.
	/// Any failure is returned so the caller rolls the mutation back.
	#[instrument(skip(conn, entry), fields(operation = %entry.operation, protocol_id = %entry.protocol_id))]
	pub async fn append(conn: &mut SqliteConnection, entry: &AuditEntry) -> AuditResult<()> {
		let before = entry
			.before
			.as_ref()
			.map(serde_json::to_string)
			.transpose()?;
		let after = entry.after.as_ref().map(serde_json::to_string).transpose()?;

		sqlx::query(
			r#"
			INSERT INTO audit_log (
				id, operation, protocol_id, timestamp, actor_user, actor_host,
				actor_process, remote_address, reason, before_data, after_data
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(entry.id.to_string())
		.bind(entry.operation.as_str())
		.bind(&entry.protocol_id)
		.bind(format_timestamp(&entry.timestamp))
		.bind(&entry.actor.user)
		.bind(&entry.actor.host)
		.bind(&entry.actor.process)
		.bind(&entry.actor.remote_address)
		.bind(&entry.reason)
		.bind(before)
		.bind(after)
		.execute(conn)
		.await?;

		debug!("audit entry appended");
		Ok(())
	}

	/// All entries matching the optional filters, oldest first.
	pub async fn list(
		&self,
		operation: Option<AuditOperation>,
		text: Option<&str>,
	) -> AuditResult<Vec<AuditEntry>> {
		self.query(&AuditQuery {
			operation,
			text: text.map(str::to_string),
			..Default::default()
		})
		.await
	}

	/// Entries for one record, oldest first.
	pub async fn history(&self, protocol_id: &str) -> AuditResult<Vec<AuditEntry>> {
		self.query(&AuditQuery {
			protocol_id: Some(protocol_id.to_string()),
			..Default::default()
		})
		.await
	}

	#[instrument(skip(self))]
	pub async fn query(&self, query: &AuditQuery) -> AuditResult<Vec<AuditEntry>> {
		let mut conditions = vec!["1=1"];
		if query.operation.is_some() {
			conditions.push("operation = ?");
		}
		if query.protocol_id.is_some() {
			conditions.push("protocol_id = ?");
		}
		if query.text.is_some() {
			conditions.push(
				"instr(lower(protocol_id || ' ' || actor_user || ' ' || reason || ' ' || \
				 coalesce(before_data, '') || ' ' || coalesce(after_data, '')), lower(?)) > 0",
			);
		}

		let sql = format!(
			"SELECT id, operation, protocol_id, timestamp, actor_user, actor_host, actor_process, \
			 remote_address, reason, before_data, after_data \
			 FROM audit_log WHERE {} ORDER BY timestamp ASC, seq ASC{}",
			conditions.join(" AND "),
			if query.limit.is_some() { " LIMIT ?" } else { "" }
		);

		let mut q = sqlx::query_as::<_, AuditRow>(&sql);
		if let Some(op) = query.operation {
			q = q.bind(op.as_str());
		}
		if let Some(id) = &query.protocol_id {
			q = q.bind(id);
		}
		if let Some(text) = &query.text {
			q = q.bind(text);
		}
		if let Some(limit) = query.limit {
			q = q.bind(limit.max(1));
		}

		let rows = q.fetch_all(&self.pool).await?;
		rows.into_iter().map(AuditEntry::try_from).collect()
	}

	pub async fn count(&self) -> AuditResult<i64> {
		let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
			.fetch_one(&self.pool)
			.await?;
		Ok(count)
	}
}
