// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-wide context, built once at startup and handed to every command.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use permit_config::PermitConfig;
use permit_crypto::{KeyMaterial, KeyVault};
use permit_db::SqlitePool;
use permit_lookup::{LookupService, LookupSettings, QueryLog};
use permit_store::{RecordStore, StoreSettings};
use tracing::{error, info};

pub struct AppContext {
	pub config: PermitConfig,
	pub keys: Arc<KeyMaterial>,
	pub pool: SqlitePool,
	pub store: RecordStore,
}

impl AppContext {
	/// Loads (or on first run generates) the key set, then opens and migrates
	/// the database. Key problems stop here, before any record is read.
	pub async fn open(config: PermitConfig) -> Result<Self> {
		let vault = KeyVault::new(&config.paths.keys_dir);
		let keys = match vault.load_or_create() {
			Ok(keys) => keys,
			Err(e) => {
				error!(error = %e, dir = %vault.dir().display(), "cannot load key material");
				return Err(e).context("key material is unusable; refusing to open the registry");
			}
		};
		info!(fingerprint = %keys.fingerprint()?, "key material ready");

		std::fs::create_dir_all(&config.paths.data_dir).with_context(|| {
			format!(
				"cannot create data directory {}",
				config.paths.data_dir.display()
			)
		})?;
		let pool = permit_db::create_pool(
			&config.database.url,
			config.database.busy_timeout(),
			config.database.max_connections,
		)
		.await
		.context("cannot open registry database")?;
		permit_db::run_migrations(&pool)
			.await
			.context("cannot apply schema migrations")?;

		let keys = Arc::new(keys);
		let store = RecordStore::new(pool.clone(), keys.clone(), store_settings(&config));
		Ok(Self {
			config,
			keys,
			pool,
			store,
		})
	}

	pub fn lookup_service(&self) -> LookupService {
		let lookup = &self.config.lookup;
		let settings = LookupSettings {
			max_requests: lookup.max_requests as usize,
			window: lookup.window(),
			expiring_threshold_days: i64::from(lookup.expiring_threshold_days),
			allowed_callers: lookup.allowed_callers.clone(),
		};
		LookupService::new(
			self.store.clone(),
			QueryLog::new(&self.config.paths.query_log_path),
			settings,
		)
	}
}

pub fn store_settings(config: &PermitConfig) -> StoreSettings {
	StoreSettings {
		min_reason_length: config.store.min_reason_length,
		update_max_retries: config.store.update_max_retries,
	}
}
