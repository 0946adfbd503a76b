// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use permit_audit::Actor;
use permit_backup::{create_backup, restore_backup, BackupError, RestoreTarget};
use permit_common_secret::SecretString;
use permit_crypto::testing::TEST_RSA_BITS;
use permit_crypto::KeyVault;
use permit_db::testing::create_test_db;
use permit_db::{create_pool, run_migrations};
use permit_store::{PaymentMethod, RecordFields, RecordStore, SensitiveFields, StoreSettings};

fn passphrase() -> SecretString {
	SecretString::new("una frase segreta abbastanza lunga".to_string())
}

fn rossi() -> RecordFields {
	RecordFields::new(
		"Rossi",
		"AB123CD",
		PaymentMethod::Pos,
		NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
		NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
	)
	.with_sensitive(SensitiveFields {
		address: Some("Via Roma 1".into()),
		email: Some("rossi@example.it".into()),
		..Default::default()
	})
}

#[tokio::test]
async fn backup_restores_readable_verified_records() {
	let db = create_test_db().await;
	let keys_dir = tempfile::tempdir().unwrap();
	let keys = KeyVault::new(keys_dir.path())
		.with_rsa_bits(TEST_RSA_BITS)
		.load_or_create()
		.unwrap();
	let store = RecordStore::new(db.pool.clone(), Arc::new(keys), StoreSettings::default());
	let id = store
		.create(rossi(), &Actor::new("operatore"), "Inserimento nuovo abbonamento")
		.await
		.unwrap();

	let out_dir = tempfile::tempdir().unwrap();
	let out = out_dir.path().join("registry.permitbk");
	let summary = create_backup(&db.pool, keys_dir.path(), &out, &passphrase())
		.await
		.unwrap();
	assert!(summary.database_bytes > 0);

	let restore_dir = tempfile::tempdir().unwrap();
	let target = RestoreTarget {
		database_path: restore_dir.path().join("restored.db"),
		keys_dir: restore_dir.path().join("keys"),
		overwrite: false,
	};
	let restored = restore_backup(&out, &passphrase(), &target).unwrap();
	assert_eq!(restored.key_fingerprint, summary.key_fingerprint);

	let pool = create_pool(
		&format!("sqlite:{}", target.database_path.display()),
		Duration::from_secs(5),
		2,
	)
	.await
	.unwrap();
	run_migrations(&pool).await.unwrap();
	let restored_keys = KeyVault::new(&target.keys_dir).load().unwrap();
	let restored_store = RecordStore::new(pool, Arc::new(restored_keys), StoreSettings::default());

	let record = restored_store.get(&id).await.unwrap();
	assert!(record.is_verified());
	assert_eq!(record.fields().unwrap(), rossi());
	assert_eq!(restored_store.audit().history(&id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn restore_refuses_to_overwrite_without_flag() {
	let db = create_test_db().await;
	let keys_dir = tempfile::tempdir().unwrap();
	KeyVault::new(keys_dir.path())
		.with_rsa_bits(TEST_RSA_BITS)
		.load_or_create()
		.unwrap();

	let out_dir = tempfile::tempdir().unwrap();
	let out = out_dir.path().join("registry.permitbk");
	create_backup(&db.pool, keys_dir.path(), &out, &passphrase())
		.await
		.unwrap();

	let target = RestoreTarget {
		database_path: out_dir.path().join("existing.db"),
		keys_dir: out_dir.path().join("keys"),
		overwrite: false,
	};
	std::fs::write(&target.database_path, b"live data").unwrap();
	assert!(matches!(
		restore_backup(&out, &passphrase(), &target),
		Err(BackupError::Exists(p)) if p == target.database_path
	));
	assert_eq!(std::fs::read(&target.database_path).unwrap(), b"live data");

	let forced = RestoreTarget {
		overwrite: true,
		..target.clone()
	};
	restore_backup(&out, &passphrase(), &forced).unwrap();
	assert_ne!(std::fs::read(&forced.database_path).unwrap(), b"live data");
}

#[tokio::test]
async fn wrong_passphrase_writes_nothing() {
	let db = create_test_db().await;
	let keys_dir = tempfile::tempdir().unwrap();
	KeyVault::new(keys_dir.path())
		.with_rsa_bits(TEST_RSA_BITS)
		.load_or_create()
		.unwrap();
	let out_dir = tempfile::tempdir().unwrap();
	let out = out_dir.path().join("registry.permitbk");
	create_backup(&db.pool, keys_dir.path(), &out, &passphrase())
		.await
		.unwrap();

	let target = RestoreTarget {
		database_path: out_dir.path().join("restored.db"),
		keys_dir: out_dir.path().join("keys"),
		overwrite: false,
	};
	let wrong = SecretString::new("un'altra frase piuttosto lunga".to_string());
	assert!(matches!(
		restore_backup(&out, &wrong, &target),
		Err(BackupError::Decryption)
	));
	assert!(!target.database_path.exists());
	assert!(!target.keys_dir.exists());
}

#[tokio::test]
async fn backup_requires_complete_key_set() {
	let db = create_test_db().await;
	let empty_keys = tempfile::tempdir().unwrap();
	let out_dir = tempfile::tempdir().unwrap();
	let result = create_backup(
		&db.pool,
		empty_keys.path(),
		&out_dir.path().join("x.permitbk"),
		&passphrase(),
	)
	.await;
	assert!(matches!(result, Err(BackupError::Keys(_))));
}
