// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Plate status lookups for the remote query service.
//!
//! Each call passes through the caller guard and the rate limiter before
//! touching the store, and every call (refusals included) is written to the
//! query log.

use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use permit_store::{normalize_plate, RecordStore};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::LookupError;
use crate::guard::{AllowList, Caller, CallerGuard};
use crate::query_log::QueryLog;
use crate::rate_limit::RateLimiter;

#[derive(Debug, Clone)]
pub struct LookupSettings {
	pub max_requests: usize,
	pub window: Duration,
	/// A subscription with this many days or fewer left is expiring soon.
	pub expiring_threshold_days: i64,
	pub allowed_callers: Vec<String>,
}

impl Default for LookupSettings {
	fn default() -> Self {
		Self {
			max_requests: 20,
			window: Duration::from_secs(60),
			expiring_threshold_days: 7,
			allowed_callers: Vec::new(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlateStatus {
	Valid { expires_on: NaiveDate },
	ExpiringSoon { expires_on: NaiveDate, days_left: i64 },
	Expired { expired_on: NaiveDate },
	NotFound,
}

impl PlateStatus {
	/// Classifies a subscription running from `start` to `end` on `today`.
	/// One that has not started yet counts as not found.
	pub fn classify(
		start: NaiveDate,
		end: NaiveDate,
		today: NaiveDate,
		expiring_threshold_days: i64,
	) -> Self {
		if start > today {
			return PlateStatus::NotFound;
		}
		if end < today {
			return PlateStatus::Expired { expired_on: end };
		}
		let days_left = (end - today).num_days();
		if days_left <= expiring_threshold_days {
			PlateStatus::ExpiringSoon {
				expires_on: end,
				days_left,
			}
		} else {
			PlateStatus::Valid { expires_on: end }
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			PlateStatus::Valid { .. } => "valid",
			PlateStatus::ExpiringSoon { .. } => "expiring_soon",
			PlateStatus::Expired { .. } => "expired",
			PlateStatus::NotFound => "not_found",
		}
	}

	pub fn expiry(&self) -> Option<NaiveDate> {
		match self {
			PlateStatus::Valid { expires_on } | PlateStatus::ExpiringSoon { expires_on, .. } => {
				Some(*expires_on)
			}
			PlateStatus::Expired { expired_on } => Some(*expired_on),
			PlateStatus::NotFound => None,
		}
	}
}

pub struct LookupService {
	store: RecordStore,
	guard: Box<dyn CallerGuard>,
	limiter: RateLimiter,
	query_log: QueryLog,
	expiring_threshold_days: i64,
}

impl LookupService {
	/// Guards callers with an [`AllowList`] built from `settings`.
	pub fn new(store: RecordStore, query_log: QueryLog, settings: LookupSettings) -> Self {
		Self {
			store,
			guard: Box::new(AllowList::new(settings.allowed_callers)),
			limiter: RateLimiter::new(settings.max_requests, settings.window),
			query_log,
			expiring_threshold_days: settings.expiring_threshold_days,
		}
	}

	pub fn with_guard(mut self, guard: impl CallerGuard + 'static) -> Self {
		self.guard = Box::new(guard);
		self
	}

	pub fn limiter(&self) -> &RateLimiter {
		&self.limiter
	}

	pub fn query_log(&self) -> &QueryLog {
		&self.query_log
	}

	pub async fn check_plate(&self, caller: &Caller, plate: &str) -> Result<PlateStatus, LookupError> {
		self.check_plate_on(caller, plate, Local::now().date_naive())
			.await
	}

	#[instrument(skip(self, caller, plate), fields(caller_id = %caller.id))]
	pub async fn check_plate_on(
		&self,
		caller: &Caller,
		plate: &str,
		today: NaiveDate,
	) -> Result<PlateStatus, LookupError> {
		let started = Instant::now();
		let subject = normalize_plate(plate);
		let outcome = self.evaluate(caller, &subject, today).await;

		let status = match &outcome {
			Ok(status) => status.as_str(),
			Err(e) => e.status(),
		};
		let logged_subject = if subject.is_empty() { plate.trim() } else { subject.as_str() };
		if let Err(e) = self
			.query_log
			.log_query(
				&caller.id,
				caller.label.as_deref(),
				logged_subject,
				status,
				started.elapsed(),
			)
			.await
		{
			warn!(error = %e, "failed to write query log entry");
		}

		info!(status, "plate lookup");
		outcome
	}

	async fn evaluate(
		&self,
		caller: &Caller,
		plate: &str,
		today: NaiveDate,
	) -> Result<PlateStatus, LookupError> {
		self.guard
			.authorize(caller)
			.map_err(|reason| LookupError::Denied {
				caller_id: caller.id.clone(),
				reason,
			})?;

		if !self.limiter.is_allowed(&caller.id).await {
			return Err(LookupError::RateLimited {
				retry_after: self.limiter.time_until_next_allowed(&caller.id).await,
			});
		}

		if plate.is_empty() {
			return Err(LookupError::InvalidQuery("plate is required".into()));
		}

		let Some(record) = self.store.find_by_plate(plate).await? else {
			return Ok(PlateStatus::NotFound);
		};
		let period = record.period().filter(|_| record.is_verified());
		let Some((start, end)) = period else {
			warn!(protocol_id = %record.protocol_id, "lookup hit a record that failed integrity verification");
			return Err(LookupError::Integrity {
				protocol_id: record.protocol_id,
			});
		};
		Ok(PlateStatus::classify(
			start,
			end,
			today,
			self.expiring_threshold_days,
		))
	}
}
