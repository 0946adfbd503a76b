// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of mutation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
	Create,
	Update,
	Delete,
}

impl AuditOperation {
	pub fn as_str(&self) -> &'static str {
		match self {
			AuditOperation::Create => "create",
			AuditOperation::Update => "update",
			AuditOperation::Delete => "delete",
		}
	}
}

impl fmt::Display for AuditOperation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for AuditOperation {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"create" | "insert" => Ok(AuditOperation::Create),
			"update" => Ok(AuditOperation::Update),
			"delete" => Ok(AuditOperation::Delete),
			other => Err(format!("unknown audit operation '{other}'")),
		}
	}
}

/// Who performed a mutation, and from where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
	pub user: String,
	pub host: Option<String>,
	pub process: Option<String>,
	pub remote_address: Option<String>,
}

impl Actor {
	pub fn new(user: impl Into<String>) -> Self {
		Self {
			user: user.into(),
			host: None,
			process: None,
			remote_address: None,
		}
	}

	/// The local operator: OS user, host name and this process.
	pub fn current() -> Self {
		let user = std::env::var("USER")
			.or_else(|_| std::env::var("USERNAME"))
			.unwrap_or_else(|_| "unknown".to_string());
		let host = hostname::get()
			.ok()
			.map(|h| h.to_string_lossy().into_owned());
		let process = std::env::current_exe()
			.ok()
			.and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
			.map(|name| format!("{name}[{}]", std::process::id()));
		Self {
			user,
			host,
			process,
			remote_address: None,
		}
	}

	/// A caller reaching the store through a remote front end.
	pub fn remote(user: impl Into<String>, remote_address: impl Into<String>) -> Self {
		Self {
			remote_address: Some(remote_address.into()),
			..Self::new(user)
		}
	}

	pub fn with_host(mut self, host: impl Into<String>) -> Self {
		self.host = Some(host.into());
		self
	}

	pub fn with_process(mut self, process: impl Into<String>) -> Self {
		self.process = Some(process.into());
		self
	}
}

/// One immutable audit fact. Snapshots are plaintext field maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
	pub id: Uuid,
	pub timestamp: DateTime<Utc>,
	pub operation: AuditOperation,
	pub protocol_id: String,
	pub actor: Actor,
	pub reason: String,
	pub before: Option<serde_json::Value>,
	pub after: Option<serde_json::Value>,
}

impl AuditEntry {
	pub fn builder(operation: AuditOperation, protocol_id: impl Into<String>) -> AuditEntryBuilder {
		AuditEntryBuilder::new(operation, protocol_id)
	}
}

#[derive(Debug, Clone)]
pub struct AuditEntryBuilder {
	operation: AuditOperation,
	protocol_id: String,
	actor: Option<Actor>,
	reason: String,
	before: Option<serde_json::Value>,
	after: Option<serde_json::Value>,
	timestamp: Option<DateTime<Utc>>,
}

impl AuditEntryBuilder {
	pub fn new(operation: AuditOperation, protocol_id: impl Into<String>) -> Self {
		Self {
			operation,
			protocol_id: protocol_id.into(),
			actor: None,
			reason: String::new(),
			before: None,
			after: None,
			timestamp: None,
		}
	}

	pub fn actor(mut self, actor: Actor) -> Self {
		self.actor = Some(actor);
		self
	}

	pub fn reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = reason.into();
		self
	}

	pub fn before(mut self, snapshot: serde_json::Value) -> Self {
		self.before = Some(snapshot);
		self
	}

	pub fn after(mut self, snapshot: serde_json::Value) -> Self {
		self.after = Some(snapshot);
		self
	}

	/// Pins the timestamp, e.g. to match the record's `updated_at`.
	pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
		self.timestamp = Some(timestamp);
		self
	}

	/// An entry without an explicit actor is attributed to the local operator.
	pub fn build(self) -> AuditEntry {
		AuditEntry {
			id: Uuid::new_v4(),
			timestamp: self.timestamp.unwrap_or_else(Utc::now),
			operation: self.operation,
			protocol_id: self.protocol_id,
			actor: self.actor.unwrap_or_else(Actor::current),
			reason: self.reason,
			before: self.before,
			after: self.after,
		}
	}
}
