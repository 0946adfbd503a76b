// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use permit_audit::Actor;
use permit_crypto::testing::shared_key_material;
use permit_db::testing::create_test_pool;
use permit_db::SqlitePool;
use permit_lookup::{
	Caller, CallerGuardExt, AllowList, LookupError, LookupService, LookupSettings, PlateStatus, QueryLog,
};
use permit_store::{PaymentMethod, RecordFields, RecordStore, StoreSettings};
use tempfile::TempDir;

struct Fixture {
	service: LookupService,
	pool: SqlitePool,
	protocol_id: String,
	_dir: TempDir,
}

impl Fixture {
	fn log_path(&self) -> std::path::PathBuf {
		self.service.query_log().path().to_path_buf()
	}
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
	NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn fixture(max_requests: usize) -> Fixture {
	let pool = create_test_pool().await;
	let store = RecordStore::new(
		pool.clone(),
		Arc::new(shared_key_material()),
		StoreSettings::default(),
	);
	let protocol_id = store
		.create(
			RecordFields::new(
				"Rossi",
				"AB123CD",
				PaymentMethod::Pos,
				date(2026, 1, 1),
				date(2026, 12, 31),
			),
			&Actor::new("operatore"),
			"Inserimento nuovo abbonamento",
		)
		.await
		.unwrap();

	let dir = tempfile::tempdir().unwrap();
	let settings = LookupSettings {
		max_requests,
		window: Duration::from_secs(60),
		expiring_threshold_days: 7,
		allowed_callers: vec!["bot:1".into(), "bot:2".into()],
	};
	let service = LookupService::new(store, QueryLog::new(dir.path().join("queries.jsonl")), settings);
	Fixture {
		service,
		pool,
		protocol_id,
		_dir: dir,
	}
}

fn bot() -> Caller {
	Caller::new("bot:1").with_label("Vigile Bianchi")
}

#[tokio::test]
async fn valid_expiring_and_expired() {
	let f = fixture(10).await;
	assert_eq!(
		f.service
			.check_plate_on(&bot(), "ab 123 cd", date(2026, 3, 15))
			.await
			.unwrap(),
		PlateStatus::Valid {
			expires_on: date(2026, 12, 31)
		}
	);
	assert!(matches!(
		f.service
			.check_plate_on(&bot(), "AB123CD", date(2026, 12, 28))
			.await
			.unwrap(),
		PlateStatus::ExpiringSoon { days_left: 3, .. }
	));
	assert!(matches!(
		f.service
			.check_plate_on(&bot(), "AB123CD", date(2027, 1, 2))
			.await
			.unwrap(),
		PlateStatus::Expired { .. }
	));
	assert_eq!(
		f.service
			.check_plate_on(&bot(), "XY999ZZ", date(2026, 3, 15))
			.await
			.unwrap(),
		PlateStatus::NotFound
	);
}

#[tokio::test]
async fn unknown_caller_is_denied_and_logged() {
	let f = fixture(10).await;
	let err = f
		.service
		.check_plate(&Caller::new("intruder"), "AB123CD")
		.await
		.unwrap_err();
	assert!(matches!(err, LookupError::Denied { .. }));

	let entries = QueryLog::read_entries(&f.log_path()).await.unwrap();
	assert_eq!(entries.len(), 1);
	assert_eq!(entries[0].caller_id, "intruder");
	assert_eq!(entries[0].result_status, "denied");
	assert_eq!(entries[0].query_subject, "AB123CD");
}

#[tokio::test]
async fn rate_limit_rejects_extra_calls_per_caller() {
	let f = fixture(2).await;
	let today = date(2026, 3, 15);
	for _ in 0..2 {
		f.service.check_plate_on(&bot(), "AB123CD", today).await.unwrap();
	}
	match f.service.check_plate_on(&bot(), "AB123CD", today).await {
		Err(LookupError::RateLimited { retry_after }) => {
			assert!(retry_after > Duration::ZERO);
			assert!(retry_after <= Duration::from_secs(60));
		}
		other => panic!("expected rate limit, got {other:?}"),
	}
	// A different caller has its own window.
	assert!(f
		.service
		.check_plate_on(&Caller::new("bot:2"), "AB123CD", today)
		.await
		.is_ok());

	let statuses: Vec<String> = QueryLog::read_entries(&f.log_path())
		.await
		.unwrap()
		.into_iter()
		.map(|e| e.result_status)
		.collect();
	assert_eq!(statuses, vec!["valid", "valid", "rate_limited", "valid"]);
}

#[tokio::test]
async fn tampered_record_is_never_valid() {
	let f = fixture(10).await;
	sqlx::query("UPDATE subscriptions SET end_date = '2099-12-31' WHERE protocol_id = ?")
		.bind(&f.protocol_id)
		.execute(&f.pool)
		.await
		.unwrap();

	let err = f
		.service
		.check_plate_on(&bot(), "AB123CD", date(2026, 3, 15))
		.await
		.unwrap_err();
	assert!(matches!(err, LookupError::Integrity { protocol_id } if protocol_id == f.protocol_id));
	let entries = QueryLog::read_entries(&f.log_path()).await.unwrap();
	assert_eq!(entries[0].result_status, "integrity_failed");
}

#[tokio::test]
async fn unparseable_date_is_reported_as_integrity_failure() {
	let f = fixture(10).await;
	sqlx::query("UPDATE subscriptions SET end_date = '2026-12-32' WHERE protocol_id = ?")
		.bind(&f.protocol_id)
		.execute(&f.pool)
		.await
		.unwrap();

	let err = f
		.service
		.check_plate_on(&bot(), "AB123CD", date(2026, 3, 15))
		.await
		.unwrap_err();
	assert!(matches!(err, LookupError::Integrity { .. }));
}

#[tokio::test]
async fn blank_plate_is_invalid() {
	let f = fixture(10).await;
	assert!(matches!(
		f.service.check_plate(&bot(), " -- ").await,
		Err(LookupError::InvalidQuery(_))
	));
}

#[tokio::test]
async fn custom_guard_composes_with_allow_list() {
	let f = fixture(10).await;
	let labelled = |c: &Caller| {
		if c.label.is_some() {
			Ok(())
		} else {
			Err("label required".to_string())
		}
	};
	let service = f
		.service
		.with_guard(AllowList::new(["bot:1"]).and(labelled));
	let today = date(2026, 3, 15);

	assert!(service.check_plate_on(&bot(), "AB123CD", today).await.is_ok());
	assert!(matches!(
		service
			.check_plate_on(&Caller::new("bot:1"), "AB123CD", today)
			.await,
		Err(LookupError::Denied { reason, .. }) if reason == "label required"
	));
}
