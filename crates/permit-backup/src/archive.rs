// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Backup creation and restore.
//!
//! A backup bundles a consistent snapshot of the database (taken with
//! `VACUUM INTO`, which is safe while other connections are writing under
//! WAL) together with the four key files. Records are useless without the
//! keys, so the two travel together and the whole bundle is encrypted under
//! a passphrase.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use permit_common_secret::SecretString;
use permit_crypto::{KeyVault, KEY_FILES};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, instrument};
use zeroize::Zeroizing;

use crate::envelope;
use crate::error::{BackupError, BackupResult};

pub const BUNDLE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Bundle {
	version: u32,
	created_at: DateTime<Utc>,
	key_fingerprint: String,
	/// Base64 SQLite database image.
	database: String,
	/// Key file name to file contents.
	keys: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSummary {
	pub path: PathBuf,
	pub created_at: DateTime<Utc>,
	pub database_bytes: usize,
	pub key_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSummary {
	pub created_at: DateTime<Utc>,
	pub database_path: PathBuf,
	pub keys_dir: PathBuf,
	pub key_fingerprint: String,
}

/// Where a restore writes its files.
#[derive(Debug, Clone)]
pub struct RestoreTarget {
	pub database_path: PathBuf,
	pub keys_dir: PathBuf,
	pub overwrite: bool,
}

/// Path of the database file behind a `sqlite:` URL, if it names one.
pub fn sqlite_path(url: &str) -> Option<PathBuf> {
	let rest = url
		.strip_prefix("sqlite://")
		.or_else(|| url.strip_prefix("sqlite:"))?;
	let path = rest.split('?').next().unwrap_or_default();
	if path.is_empty() || path == ":memory:" {
		None
	} else {
		Some(PathBuf::from(path))
	}
}

#[instrument(skip(pool, passphrase), fields(keys_dir = %keys_dir.display(), out = %out.display()))]
pub async fn create_backup(
	pool: &SqlitePool,
	keys_dir: &Path,
	out: &Path,
	passphrase: &SecretString,
) -> BackupResult<BackupSummary> {
	envelope::check_passphrase(passphrase)?;
	let keys = KeyVault::new(keys_dir).load()?;

	let staging = tempfile::tempdir().map_err(|e| BackupError::io(std::env::temp_dir(), e))?;
	let snapshot_path = staging.path().join("snapshot.db");
	sqlx::query("VACUUM INTO ?")
		.bind(snapshot_path.to_string_lossy().into_owned())
		.execute(pool)
		.await?;
	let database = fs::read(&snapshot_path).map_err(|e| BackupError::io(&snapshot_path, e))?;

	let mut key_files = BTreeMap::new();
	for file in KEY_FILES {
		let path = keys_dir.join(file);
		let contents = fs::read_to_string(&path).map_err(|e| BackupError::io(&path, e))?;
		key_files.insert(file.to_string(), contents);
	}

	let created_at = Utc::now();
	let bundle = Bundle {
		version: BUNDLE_VERSION,
		created_at,
		key_fingerprint: keys.fingerprint()?,
		database: BASE64.encode(&database),
		keys: key_files,
	};
	let payload = Zeroizing::new(serde_json::to_vec(&bundle)?);
	let sealed = envelope::seal(passphrase, &payload)?;
	write_private(out, &sealed)?;

	info!(bytes = sealed.len(), "backup written");
	Ok(BackupSummary {
		path: out.to_path_buf(),
		created_at,
		database_bytes: database.len(),
		key_fingerprint: bundle.key_fingerprint,
	})
}

/// Decrypts `input` and writes the database and key files back.
///
/// The key set is loaded from a staging directory before anything at the
/// target is touched, so a damaged bundle never replaces working keys.
#[instrument(skip(passphrase, target), fields(input = %input.display()))]
pub fn restore_backup(
	input: &Path,
	passphrase: &SecretString,
	target: &RestoreTarget,
) -> BackupResult<RestoreSummary> {
	let data = fs::read(input).map_err(|e| BackupError::io(input, e))?;
	let payload = envelope::open(passphrase, &data)?;
	let bundle: Bundle = serde_json::from_slice(&payload)?;
	if bundle.version != BUNDLE_VERSION {
		return Err(BackupError::InvalidFormat(format!(
			"unsupported bundle version {}",
			bundle.version
		)));
	}
	let database = Zeroizing::new(
		BASE64
			.decode(bundle.database.as_bytes())
			.map_err(|e| BackupError::InvalidFormat(format!("database image: {e}")))?,
	);

	let staging = tempfile::tempdir().map_err(|e| BackupError::io(std::env::temp_dir(), e))?;
	for file in KEY_FILES {
		let contents = bundle
			.keys
			.get(file)
			.ok_or_else(|| BackupError::InvalidFormat(format!("bundle lacks {file}")))?;
		write_private(&staging.path().join(file), contents.as_bytes())?;
	}
	let keys = KeyVault::new(staging.path()).load()?;
	let fingerprint = keys.fingerprint()?;

	if !target.overwrite {
		let existing = std::iter::once(target.database_path.clone())
			.chain(KEY_FILES.iter().map(|f| target.keys_dir.join(f)))
			.find(|p| p.exists());
		if let Some(path) = existing {
			return Err(BackupError::Exists(path));
		}
	}

	create_private_dir(&target.keys_dir)?;
	for file in KEY_FILES {
		if let Some(contents) = bundle.keys.get(file) {
			write_private(&target.keys_dir.join(file), contents.as_bytes())?;
		}
	}

	if let Some(parent) = target.database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| BackupError::io(parent, e))?;
	}
	// A leftover WAL would be replayed on top of the restored image.
	for suffix in ["-wal", "-shm"] {
		let mut side = target.database_path.clone().into_os_string();
		side.push(suffix);
		let side = PathBuf::from(side);
		if side.exists() {
			fs::remove_file(&side).map_err(|e| BackupError::io(&side, e))?;
		}
	}
	write_private(&target.database_path, &database)?;

	info!(fingerprint = %fingerprint, "backup restored");
	Ok(RestoreSummary {
		created_at: bundle.created_at,
		database_path: target.database_path.clone(),
		keys_dir: target.keys_dir.clone(),
		key_fingerprint: fingerprint,
	})
}

fn create_private_dir(dir: &Path) -> BackupResult<()> {
	#[cfg(unix)]
	{
		use std::os::unix::fs::DirBuilderExt;
		fs::DirBuilder::new()
			.recursive(true)
			.mode(0o700)
			.create(dir)
			.map_err(|e| BackupError::io(dir, e))
	}
	#[cfg(not(unix))]
	{
		fs::create_dir_all(dir).map_err(|e| BackupError::io(dir, e))
	}
}

/// Replaces `path` with `body`, readable by the owner only.
fn write_private(path: &Path, body: &[u8]) -> BackupResult<()> {
	let mut options = fs::OpenOptions::new();
	options.write(true).create(true).truncate(true);
	#[cfg(unix)]
	{
		use std::os::unix::fs::OpenOptionsExt;
		options.mode(0o600);
	}
	let mut file = options.open(path).map_err(|e| BackupError::io(path, e))?;
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		file.set_permissions(fs::Permissions::from_mode(0o600))
			.map_err(|e| BackupError::io(path, e))?;
	}
	file.write_all(body)
		.and_then(|_| file.sync_all())
		.map_err(|e| BackupError::io(path, e))
}
