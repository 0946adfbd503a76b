// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, TOML file, environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::PermitConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, LoggingConfigLayer, LookupConfigLayer, PathsConfigLayer,
	StoreConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<PermitConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<PermitConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(PermitConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file is not an error.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/permit/permit.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<PermitConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(PermitConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: PermitConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: PERMIT_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<PermitConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(PermitConfigLayer {
			paths: Some(load_paths_from_env()),
			database: Some(load_database_from_env()?),
			store: Some(load_store_from_env()?),
			lookup: Some(load_lookup_from_env()?),
			logging: Some(load_logging_from_env()),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_parse<T: FromStr>(name: &str, kind: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {kind} value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_list(name: &str) -> Option<Vec<String>> {
	env_var(name).map(|s| {
		s.split(',')
			.map(|s| s.trim().to_string())
			.filter(|s| !s.is_empty())
			.collect()
	})
}

fn load_paths_from_env() -> PathsConfigLayer {
	PathsConfigLayer {
		data_dir: env_var("PERMIT_DATA_DIR").map(PathBuf::from),
		keys_dir: env_var("PERMIT_KEYS_DIR").map(PathBuf::from),
		query_log_path: env_var("PERMIT_QUERY_LOG_PATH").map(PathBuf::from),
	}
}

fn load_database_from_env() -> Result<DatabaseConfigLayer, ConfigError> {
	Ok(DatabaseConfigLayer {
		url: env_var("PERMIT_DATABASE_URL"),
		busy_timeout_ms: env_parse("PERMIT_DATABASE_BUSY_TIMEOUT_MS", "u64")?,
		max_connections: env_parse("PERMIT_DATABASE_MAX_CONNECTIONS", "u32")?,
	})
}

fn load_store_from_env() -> Result<StoreConfigLayer, ConfigError> {
	Ok(StoreConfigLayer {
		min_reason_length: env_parse("PERMIT_STORE_MIN_REASON_LENGTH", "usize")?,
		update_max_retries: env_parse("PERMIT_STORE_UPDATE_MAX_RETRIES", "u32")?,
	})
}

fn load_lookup_from_env() -> Result<LookupConfigLayer, ConfigError> {
	Ok(LookupConfigLayer {
		max_requests: env_parse("PERMIT_LOOKUP_MAX_REQUESTS", "u32")?,
		window_secs: env_parse("PERMIT_LOOKUP_WINDOW_SECS", "u64")?,
		expiring_threshold_days: env_parse("PERMIT_LOOKUP_EXPIRING_THRESHOLD_DAYS", "u32")?,
		allowed_callers: env_list("PERMIT_LOOKUP_ALLOWED_CALLERS"),
	})
}

fn load_logging_from_env() -> LoggingConfigLayer {
	LoggingConfigLayer {
		level: env_var("PERMIT_LOG_LEVEL"),
		json: env_bool("PERMIT_LOG_JSON"),
	}
}
