// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end behaviour of the store against a real schema: round trips,
//! audit accounting and out-of-band tampering.

use std::sync::Arc;

use chrono::NaiveDate;
use permit_audit::{Actor, AuditOperation};
use permit_crypto::testing::shared_key_material;
use permit_crypto::KeyMaterial;
use permit_db::testing::create_test_pool;
use permit_db::SqlitePool;
use permit_store::{
	DecryptedField, IntegrityStatus, Patch, PaymentMethod, PlainField, RecordFields,
	RecordPatch, RecordStore, SensitiveFields, StoreError, StoreSettings, UNREADABLE,
};

async fn setup() -> (RecordStore, SqlitePool) {
	let pool = create_test_pool().await;
	let store = RecordStore::new(
		pool.clone(),
		Arc::new(shared_key_material()),
		StoreSettings::default(),
	);
	(store, pool)
}

fn date(s: &str) -> NaiveDate {
	NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn operator() -> Actor {
	Actor::new("operatore").with_host("ufficio-01")
}

fn rossi() -> RecordFields {
	RecordFields::new(
		"Rossi",
		"AB123CD",
		"POS".parse::<PaymentMethod>().unwrap(),
		date("2026-01-01"),
		date("2026-12-31"),
	)
}

async fn tamper(pool: &SqlitePool, sql: &str, id: &str) {
	sqlx::query(sql).bind(id).execute(pool).await.unwrap();
}

#[tokio::test]
async fn rossi_scenario() {
	let (store, _pool) = setup().await;
	let id = store
		.create(rossi(), &operator(), "Inserimento nuovo abbonamento")
		.await
		.unwrap();
	assert!(id.ends_with("-0000000001"));

	let record = store.get(&id).await.unwrap();
	assert_eq!(record.integrity, IntegrityStatus::Verified);
	assert_eq!(record.fields().unwrap(), rossi());

	let report = store.verify_all_integrity().await.unwrap();
	assert_eq!(report.total, 1);
	assert!(report.is_clean());

	let entries = store.audit().history(&id).await.unwrap();
	assert_eq!(entries.len(), 1);
	assert_eq!(entries[0].operation, AuditOperation::Create);
	assert_eq!(entries[0].protocol_id, id);
	assert_eq!(entries[0].reason, "Inserimento nuovo abbonamento");
	assert_eq!(entries[0].after.as_ref().unwrap()["plate"], "AB123CD");
}

#[tokio::test]
async fn round_trip_with_all_sensitive_fields() {
	let (store, _pool) = setup().await;
	let input = rossi().with_sensitive(SensitiveFields {
		address: Some("Via Roma 1, Chioggia".into()),
		mobile: Some("+39 333 1234567".into()),
		email: Some("mario.rossi@example.it".into()),
		payment_amount: Some("35,00".into()),
	});
	let id = store
		.create(input.clone(), &operator(), "Inserimento nuovo abbonamento")
		.await
		.unwrap();
	assert_eq!(store.get(&id).await.unwrap().fields().unwrap(), input);
}

#[tokio::test]
async fn every_mutation_writes_exactly_one_entry() {
	let (store, _pool) = setup().await;
	let actor = operator();
	let id = store
		.create(rossi(), &actor, "Inserimento nuovo abbonamento")
		.await
		.unwrap();
	for i in 0..3 {
		let patch = RecordPatch {
			payment_amount: Patch::Set(Some(format!("{}.00", 30 + i))),
			..Default::default()
		};
		store
			.update(&id, &patch, &actor, "Aggiornamento importo pagato")
			.await
			.unwrap();
	}
	store
		.delete(&id, &actor, "Richiesta di cancellazione")
		.await
		.unwrap();

	let ops: Vec<_> = store
		.audit()
		.history(&id)
		.await
		.unwrap()
		.into_iter()
		.map(|e| e.operation)
		.collect();
	assert_eq!(
		ops,
		vec![
			AuditOperation::Create,
			AuditOperation::Update,
			AuditOperation::Update,
			AuditOperation::Update,
			AuditOperation::Delete,
		]
	);
	assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn update_entry_carries_both_images() {
	let (store, _pool) = setup().await;
	let id = store
		.create(rossi(), &operator(), "Inserimento nuovo abbonamento")
		.await
		.unwrap();
	let patch = RecordPatch {
		end_date: Patch::Set(date("2027-12-31")),
		..Default::default()
	};
	store
		.update(&id, &patch, &operator(), "Rinnovo annuale abbonamento")
		.await
		.unwrap();

	let entries = store
		.audit()
		.list(Some(AuditOperation::Update), None)
		.await
		.unwrap();
	assert_eq!(entries.len(), 1);
	let entry = &entries[0];
	assert_eq!(entry.before.as_ref().unwrap()["end_date"], "2026-12-31");
	assert_eq!(entry.after.as_ref().unwrap()["end_date"], "2027-12-31");
	assert_eq!(entry.after.as_ref().unwrap()["version"], 2);
}

#[tokio::test]
async fn integrity_holds_after_many_mutations() {
	let (store, _pool) = setup().await;
	let actor = operator();
	let mut ids = Vec::new();
	for plate in ["AA111AA", "BB222BB", "CC333CC", "DD444DD"] {
		let mut f = rossi();
		f.plate = plate.into();
		ids.push(
			store
				.create(f, &actor, "Inserimento nuovo abbonamento")
				.await
				.unwrap(),
		);
	}
	for id in &ids[..2] {
		let patch = RecordPatch {
			email: Patch::Set(Some("nuova@example.it".into())),
			owner_name: Patch::Set("Rossi Maria".into()),
			..Default::default()
		};
		store
			.update(id, &patch, &actor, "Aggiornamento recapiti")
			.await
			.unwrap();
	}

	let report = store.verify_all_integrity().await.unwrap();
	assert_eq!(report.total, 4);
	assert_eq!(report.verified, 4);
	assert!(report.is_clean());
}

#[tokio::test]
async fn tampered_ciphertext_is_flagged() {
	let (store, pool) = setup().await;
	let input = rossi().with_sensitive(SensitiveFields {
		address: Some("Via Roma 1".into()),
		..Default::default()
	});
	let id = store
		.create(input, &operator(), "Inserimento nuovo abbonamento")
		.await
		.unwrap();

	tamper(
		&pool,
		"UPDATE subscriptions SET address_enc = 'AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA' WHERE protocol_id = ?",
		&id,
	)
	.await;

	let record = store.get(&id).await.unwrap();
	assert_eq!(record.integrity, IntegrityStatus::Failed);
	assert_eq!(record.address, DecryptedField::Unreadable);
	assert_eq!(record.owner_name, "Rossi");

	let report = store.verify_all_integrity().await.unwrap();
	assert_eq!(report.failed, vec![id]);
}

#[tokio::test]
async fn tampered_plain_column_is_flagged_but_visible() {
	let (store, pool) = setup().await;
	let id = store
		.create(rossi(), &operator(), "Inserimento nuovo abbonamento")
		.await
		.unwrap();
	tamper(
		&pool,
		"UPDATE subscriptions SET end_date = '2030-12-31' WHERE protocol_id = ?",
		&id,
	)
	.await;

	let record = store.get(&id).await.unwrap();
	assert!(!record.is_verified());
	assert_eq!(record.end_date, PlainField::Valid(date("2030-12-31")));
	assert!(matches!(
		record.ensure_verified(),
		Err(StoreError::IntegrityViolation { .. })
	));
}

#[tokio::test]
async fn unparseable_plain_column_does_not_hide_the_store() {
	let (store, pool) = setup().await;
	let id = store
		.create(rossi(), &operator(), "Inserimento nuovo abbonamento")
		.await
		.unwrap();
	let mut other = rossi();
	other.plate = "ZZ999ZZ".into();
	other.owner_name = "Bianchi".into();
	let other_id = store
		.create(other, &operator(), "Inserimento nuovo abbonamento")
		.await
		.unwrap();
	tamper(
		&pool,
		"UPDATE subscriptions SET end_date = '2026-12-32' WHERE protocol_id = ?",
		&id,
	)
	.await;

	let record = store.get(&id).await.unwrap();
	assert_eq!(record.integrity, IntegrityStatus::Failed);
	assert_eq!(record.end_date, PlainField::Malformed("2026-12-32".into()));
	assert_eq!(record.malformed_fields(), vec!["end_date"]);
	assert_eq!(record.owner_name, "Rossi");

	let all = store.list_all().await.unwrap();
	assert_eq!(all.len(), 2);
	assert!(all.iter().any(|r| r.protocol_id == other_id && r.is_verified()));

	let hits = store.search("ZZ999").await.unwrap();
	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].protocol_id, other_id);
	assert!(!store.find_by_plate("AB123CD").await.unwrap().unwrap().is_verified());

	assert!(matches!(
		store
			.update(&id, &RecordPatch::default(), &operator(), "Correzione della scadenza")
			.await,
		Err(StoreError::IntegrityViolation { .. })
	));
	assert_eq!(store.verify_all_integrity().await.unwrap().failed, vec![id.clone()]);

	store
		.delete(&id, &operator(), "Rimozione record danneggiato")
		.await
		.unwrap();
	let entries = store.audit().history(&id).await.unwrap();
	let before = entries.last().unwrap().before.as_ref().unwrap();
	assert_eq!(before["end_date"], "2026-12-32");
}

#[tokio::test]
async fn tampered_signature_is_flagged() {
	let (store, pool) = setup().await;
	let id = store
		.create(rossi(), &operator(), "Inserimento nuovo abbonamento")
		.await
		.unwrap();
	tamper(
		&pool,
		"UPDATE subscriptions SET signature = 'deadbeef' WHERE protocol_id = ?",
		&id,
	)
	.await;
	assert_eq!(store.verify_all_integrity().await.unwrap().failed_count(), 1);
}

#[tokio::test]
async fn update_of_tampered_record_is_refused() {
	let (store, pool) = setup().await;
	let id = store
		.create(rossi(), &operator(), "Inserimento nuovo abbonamento")
		.await
		.unwrap();
	tamper(
		&pool,
		"UPDATE subscriptions SET owner_name = 'Verdi' WHERE protocol_id = ?",
		&id,
	)
	.await;

	let patch = RecordPatch {
		end_date: Patch::Set(date("2027-12-31")),
		..Default::default()
	};
	let err = store
		.update(&id, &patch, &operator(), "Rinnovo annuale abbonamento")
		.await
		.unwrap_err();
	assert!(matches!(err, StoreError::IntegrityViolation { protocol_id } if protocol_id == id));

	let record = store.get(&id).await.unwrap();
	assert_eq!(record.end_date, PlainField::Valid(date("2026-12-31")));
	assert_eq!(record.version, 1);
	assert_eq!(store.audit().count().await.unwrap(), 1);
	assert!(store.attest(&id).await.is_err());
}

#[tokio::test]
async fn tampered_record_can_be_deleted_with_placeholder_snapshot() {
	let (store, pool) = setup().await;
	let input = rossi().with_sensitive(SensitiveFields {
		email: Some("rossi@example.it".into()),
		..Default::default()
	});
	let id = store
		.create(input, &operator(), "Inserimento nuovo abbonamento")
		.await
		.unwrap();
	tamper(
		&pool,
		"UPDATE subscriptions SET email_enc = 'bm90IGEgcmVhbCB0b2tlbg==' WHERE protocol_id = ?",
		&id,
	)
	.await;

	store
		.delete(&id, &operator(), "Rimozione record manomesso")
		.await
		.unwrap();
	let deletes = store
		.audit()
		.list(Some(AuditOperation::Delete), None)
		.await
		.unwrap();
	assert_eq!(deletes.len(), 1);
	assert_eq!(deletes[0].before.as_ref().unwrap()["email"], UNREADABLE);
}

#[tokio::test]
async fn listing_survives_undecryptable_field() {
	let (store, pool) = setup().await;
	let mut a = rossi();
	a.sensitive.mobile = Some("3331234567".into());
	let first = store
		.create(a, &operator(), "Inserimento nuovo abbonamento")
		.await
		.unwrap();
	let mut b = rossi();
	b.plate = "ZZ999ZZ".into();
	store
		.create(b, &operator(), "Inserimento nuovo abbonamento")
		.await
		.unwrap();

	tamper(
		&pool,
		"UPDATE subscriptions SET mobile_enc = 'Zm9v' WHERE protocol_id = ?",
		&first,
	)
	.await;

	let all = store.list_all().await.unwrap();
	assert_eq!(all.len(), 2);
	assert!(all[0].mobile.is_unreadable());
	assert!(all[1].is_verified());
}

#[tokio::test]
async fn records_from_other_key_set_are_unreadable_and_unverified() {
	let (store, pool) = setup().await;
	let id = store
		.create(
			rossi().with_sensitive(SensitiveFields {
				address: Some("Via Roma 1".into()),
				..Default::default()
			}),
			&operator(),
			"Inserimento nuovo abbonamento",
		)
		.await
		.unwrap();

	let other_keys = KeyMaterial::generate(permit_crypto::testing::TEST_RSA_BITS).unwrap();
	let other = RecordStore::new(pool, Arc::new(other_keys), StoreSettings::default());
	let record = other.get(&id).await.unwrap();
	assert_eq!(record.integrity, IntegrityStatus::Failed);
	assert_eq!(record.address, DecryptedField::Unreadable);
}
