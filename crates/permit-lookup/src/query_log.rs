// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Append-only JSON Lines log of remote read queries.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::QueryLogError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryLogEntry {
	pub timestamp: DateTime<Utc>,
	pub caller_id: String,
	pub caller_label: Option<String>,
	pub query_subject: String,
	pub result_status: String,
	pub latency_ms: u64,
}

#[derive(Debug)]
pub struct QueryLog {
	path: PathBuf,
	file: Mutex<Option<File>>,
}

impl QueryLog {
	/// The file is opened lazily on the first write.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			file: Mutex::new(None),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub async fn log_query(
		&self,
		caller_id: &str,
		caller_label: Option<&str>,
		query_subject: &str,
		result_status: &str,
		latency: Duration,
	) -> Result<(), QueryLogError> {
		let entry = QueryLogEntry {
			timestamp: Utc::now(),
			caller_id: caller_id.to_string(),
			caller_label: caller_label.map(str::to_string),
			query_subject: query_subject.to_string(),
			result_status: result_status.to_string(),
			latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
		};
		self.append(&entry).await
	}

	pub async fn append(&self, entry: &QueryLogEntry) -> Result<(), QueryLogError> {
		let mut line = serde_json::to_string(entry)?;
		line.push('\n');

		let mut guard = self.file.lock().await;
		if guard.is_none() {
			*guard = Some(self.open().await?);
		}
		let Some(file) = guard.as_mut() else {
			return Err(QueryLogError::Io {
				path: self.path.clone(),
				source: std::io::Error::other("query log not open"),
			});
		};

		let io = |source| QueryLogError::Io {
			path: self.path.clone(),
			source,
		};
		file.write_all(line.as_bytes()).await.map_err(io)?;
		file.flush().await.map_err(io)?;
		Ok(())
	}

	async fn open(&self) -> Result<File, QueryLogError> {
		let io = |source| QueryLogError::Io {
			path: self.path.clone(),
			source,
		};
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			tokio::fs::create_dir_all(parent).await.map_err(io)?;
		}
		let mut options = OpenOptions::new();
		options.create(true).append(true);
		#[cfg(unix)]
		options.mode(0o600);
		options.open(&self.path).await.map_err(io)
	}

	/// Reads back every entry, oldest first.
	pub async fn read_entries(path: &Path) -> Result<Vec<QueryLogEntry>, QueryLogError> {
		let text = match tokio::fs::read_to_string(path).await {
			Ok(text) => text,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(source) => {
				return Err(QueryLogError::Io {
					path: path.to_path_buf(),
					source,
				})
			}
		};
		text.lines()
			.filter(|l| !l.trim().is_empty())
			.map(|l| serde_json::from_str(l).map_err(QueryLogError::from))
			.collect()
	}
}
