// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the permit registry.
//!
//! Values are layered from built-in defaults, an optional TOML file and
//! `PERMIT_*` environment variables, in increasing order of precedence.
//!
//! ```ignore
//! use permit_config::load_config;
//!
//! let config = load_config()?;
//! println!("keys live in {}", config.paths.keys_dir.display());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod secret_env;
pub mod sources;

pub use error::ConfigError;
pub use layer::PermitConfigLayer;
pub use sections::*;
pub use secret_env::{load_secret_env, require_secret_env, SecretEnvError};
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved registry configuration.
#[derive(Debug, Clone, Default)]
pub struct PermitConfig {
	pub paths: PathsConfig,
	pub database: DatabaseConfig,
	pub store: StoreConfig,
	pub lookup: LookupConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`PERMIT_*`)
/// 2. Config file (`/etc/permit/permit.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<PermitConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<PermitConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<PermitConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = PermitConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: PermitConfigLayer) -> Result<PermitConfig, ConfigError> {
	let paths = layer.paths.unwrap_or_default().finalize();
	let database = layer.database.unwrap_or_default().finalize(&paths.data_dir);
	let store = layer.store.unwrap_or_default().finalize();
	let lookup = layer.lookup.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&database, &store, &lookup)?;

	info!(
		data_dir = %paths.data_dir.display(),
		keys_dir = %paths.keys_dir.display(),
		database = %database.url,
		busy_timeout_ms = database.busy_timeout_ms,
		min_reason_length = store.min_reason_length,
		lookup_max_requests = lookup.max_requests,
		lookup_window_secs = lookup.window_secs,
		allowed_callers = lookup.allowed_callers.len(),
		"Registry configuration loaded"
	);

	Ok(PermitConfig {
		paths,
		database,
		store,
		lookup,
		logging,
	})
}

/// Validate cross-field configuration rules.
fn validate_config(
	database: &DatabaseConfig,
	store: &StoreConfig,
	lookup: &LookupConfig,
) -> Result<(), ConfigError> {
	if database.max_connections == 0 {
		return Err(ConfigError::Validation(
			"database.max_connections must be at least 1".to_string(),
		));
	}
	if store.min_reason_length == 0 {
		return Err(ConfigError::Validation(
			"store.min_reason_length must be at least 1; every mutation needs a justification"
				.to_string(),
		));
	}
	if lookup.max_requests == 0 || lookup.window_secs == 0 {
		return Err(ConfigError::Validation(
			"lookup.max_requests and lookup.window_secs must both be at least 1".to_string(),
		));
	}
	Ok(())
}
