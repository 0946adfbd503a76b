// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key vault: first-run generation and subsequent loading of key material.
//!
//! Each key class lives in its own file under the vault directory:
//!
//! | File | Contents |
//! |---|---|
//! | `field.key` | base64 of the 32-byte AES-256-GCM field key |
//! | `hmac.key` | base64 of the 32-byte HMAC-SHA256 key |
//! | `private_key.pem` | RSA private key, PKCS#8 PEM |
//! | `public_key.pem` | RSA public key, SubjectPublicKeyInfo PEM |
//!
//! The directory is created `0700` and every file `0600` on Unix. Losing
//! `field.key` makes every sealed field unrecoverable; losing `hmac.key`
//! makes existing records unverifiable. A partially present set is therefore
//! reported as corrupt rather than topped up with fresh keys.
//!
//! First-run generation happens under an exclusive `.init.lock` file in the
//! vault directory. Processes that find the lock taken wait for the holder
//! to finish and then load the set it wrote, so two processes starting
//! against an empty directory always end up with the same keys.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use permit_common_secret::{SecretKey, KEY_LEN};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::cipher::FieldCipher;
use crate::error::{CryptoError, CryptoResult};
use crate::signer::RecordSigner;

pub const FIELD_KEY_FILE: &str = "field.key";
pub const HMAC_KEY_FILE: &str = "hmac.key";
pub const PRIVATE_KEY_FILE: &str = "private_key.pem";
pub const PUBLIC_KEY_FILE: &str = "public_key.pem";

/// All key files, in the order they are checked and written.
pub const KEY_FILES: [&str; 4] = [
	FIELD_KEY_FILE,
	HMAC_KEY_FILE,
	PRIVATE_KEY_FILE,
	PUBLIC_KEY_FILE,
];

pub const DEFAULT_RSA_BITS: usize = 2048;

pub const INIT_LOCK_FILE: &str = ".init.lock";

/// How long a process waits for another one to finish first-run generation.
pub const DEFAULT_INIT_WAIT: Duration = Duration::from_secs(60);

const INIT_POLL: Duration = Duration::from_millis(50);

/// The process's keys. Loaded once at startup and shared read-only.
#[derive(Clone)]
pub struct KeyMaterial {
	field_key: SecretKey,
	hmac_key: SecretKey,
	private_key: RsaPrivateKey,
	public_key: RsaPublicKey,
}

fn random_key() -> SecretKey {
	let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
	OsRng.fill_bytes(bytes.as_mut());
	SecretKey::new(*bytes)
}

impl KeyMaterial {
	pub fn generate(rsa_bits: usize) -> CryptoResult<Self> {
		let private_key = RsaPrivateKey::new(&mut OsRng, rsa_bits)
			.map_err(|e| CryptoError::KeyGeneration(format!("RSA-{rsa_bits}: {e}")))?;
		let public_key = RsaPublicKey::from(&private_key);
		Ok(Self {
			field_key: random_key(),
			hmac_key: random_key(),
			private_key,
			public_key,
		})
	}

	pub fn field_key(&self) -> &SecretKey {
		&self.field_key
	}

	pub fn hmac_key(&self) -> &SecretKey {
		&self.hmac_key
	}

	pub fn private_key(&self) -> &RsaPrivateKey {
		&self.private_key
	}

	pub fn public_key(&self) -> &RsaPublicKey {
		&self.public_key
	}

	pub fn public_key_pem(&self) -> CryptoResult<String> {
		self.public_key
			.to_public_key_pem(LineEnding::LF)
			.map_err(|e| CryptoError::Internal(format!("public key encoding failed: {e}")))
	}

	/// Short SHA-256 fingerprint of the public key, for operator display.
	pub fn fingerprint(&self) -> CryptoResult<String> {
		let der = self
			.public_key
			.to_public_key_der()
			.map_err(|e| CryptoError::Internal(format!("public key encoding failed: {e}")))?;
		let digest = Sha256::digest(der.as_bytes());
		Ok(hex::encode(&digest[..8]))
	}

	pub fn cipher(&self) -> FieldCipher {
		FieldCipher::new(&self.field_key)
	}

	pub fn signer(&self) -> RecordSigner {
		RecordSigner::new(self)
	}
}

impl std::fmt::Debug for KeyMaterial {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("KeyMaterial")
			.field("field_key", &permit_common_secret::REDACTED)
			.field("hmac_key", &permit_common_secret::REDACTED)
			.field("private_key", &permit_common_secret::REDACTED)
			.finish_non_exhaustive()
	}
}

#[derive(Debug, Clone)]
pub struct KeyVault {
	dir: PathBuf,
	rsa_bits: usize,
	init_wait: Duration,
}

impl KeyVault {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self {
			dir: dir.into(),
			rsa_bits: DEFAULT_RSA_BITS,
			init_wait: DEFAULT_INIT_WAIT,
		}
	}

	pub fn with_init_wait(mut self, wait: Duration) -> Self {
		self.init_wait = wait;
		self
	}

	/// Modulus size used on first-run generation.
	pub fn with_rsa_bits(mut self, bits: usize) -> Self {
		self.rsa_bits = bits;
		self
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	pub fn path(&self, file: &str) -> PathBuf {
		self.dir.join(file)
	}

	/// Loads the persisted keys, generating and persisting a fresh set when
	/// none exist yet.
	#[instrument(skip(self), fields(dir = %self.dir.display()))]
	pub fn load_or_create(&self) -> CryptoResult<KeyMaterial> {
		let deadline = Instant::now() + self.init_wait;
		loop {
			if self.missing_files()?.is_empty() {
				return self.load();
			}
			create_private_dir(&self.dir)?;
			if let Some(_lock) = InitLock::acquire(self.path(INIT_LOCK_FILE))? {
				return self.create_locked();
			}
			if Instant::now() >= deadline {
				return Err(CryptoError::KeyMaterialCorrupt(format!(
					"{} is held and the key set is still incomplete; remove it if no other process is starting",
					self.path(INIT_LOCK_FILE).display()
				)));
			}
			debug!("another process is generating key material, waiting");
			std::thread::sleep(INIT_POLL);
		}
	}

	/// Decides between load, generate and corrupt while holding the init lock.
	fn create_locked(&self) -> CryptoResult<KeyMaterial> {
		let missing = self.missing_files()?;
		if missing.is_empty() {
			return self.load();
		}
		if missing.len() < KEY_FILES.len() {
			warn!(?missing, "incomplete key material");
			return Err(CryptoError::KeyMaterialCorrupt(format!(
				"missing {} in {}; refusing to regenerate part of the key set",
				missing.join(", "),
				self.dir.display()
			)));
		}

		info!("no key material found, generating");
		let keys = KeyMaterial::generate(self.rsa_bits)?;
		self.persist(&keys)?;
		info!(fingerprint = %keys.fingerprint()?, "key material generated");
		Ok(keys)
	}

	fn missing_files(&self) -> CryptoResult<Vec<&'static str>> {
		let mut missing = Vec::new();
		for file in KEY_FILES {
			let path = self.path(file);
			let exists = path
				.try_exists()
				.map_err(|e| CryptoError::from_key_io(&path, e))?;
			if !exists {
				missing.push(file);
			}
		}
		Ok(missing)
	}

	/// Loads an existing key set without ever generating one.
	pub fn load(&self) -> CryptoResult<KeyMaterial> {
		let field_key = self.read_symmetric(FIELD_KEY_FILE)?;
		let hmac_key = self.read_symmetric(HMAC_KEY_FILE)?;

		let private_pem = self.read_text(PRIVATE_KEY_FILE)?;
		let private_key = RsaPrivateKey::from_pkcs8_pem(&private_pem).map_err(|e| {
			CryptoError::KeyMaterialCorrupt(format!("{PRIVATE_KEY_FILE}: {e}"))
		})?;

		let public_pem = self.read_text(PUBLIC_KEY_FILE)?;
		let public_key = RsaPublicKey::from_public_key_pem(&public_pem)
			.map_err(|e| CryptoError::KeyMaterialCorrupt(format!("{PUBLIC_KEY_FILE}: {e}")))?;

		if RsaPublicKey::from(&private_key) != public_key {
			return Err(CryptoError::KeyMaterialCorrupt(format!(
				"{PUBLIC_KEY_FILE} does not belong to {PRIVATE_KEY_FILE}"
			)));
		}

		debug!("key material loaded");
		Ok(KeyMaterial {
			field_key,
			hmac_key,
			private_key,
			public_key,
		})
	}

	fn read_text(&self, file: &str) -> CryptoResult<Zeroizing<String>> {
		let path = self.path(file);
		fs::read_to_string(&path)
			.map(Zeroizing::new)
			.map_err(|e| CryptoError::from_key_io(&path, e))
	}

	fn read_symmetric(&self, file: &str) -> CryptoResult<SecretKey> {
		let encoded = self.read_text(file)?;
		let bytes = Zeroizing::new(
			BASE64
				.decode(encoded.trim().as_bytes())
				.map_err(|e| CryptoError::KeyMaterialCorrupt(format!("{file}: invalid base64: {e}")))?,
		);
		SecretKey::from_slice(&bytes).ok_or_else(|| {
			CryptoError::KeyMaterialCorrupt(format!(
				"{file}: expected {KEY_LEN} bytes, found {}",
				bytes.len()
			))
		})
	}

	/// Writes every file to a temporary name first and renames only once all
	/// four are on disk. Callers hold the init lock.
	fn persist(&self, keys: &KeyMaterial) -> CryptoResult<()> {

		let private_pem = keys
			.private_key
			.to_pkcs8_pem(LineEnding::LF)
			.map_err(|e| CryptoError::KeyGeneration(format!("private key encoding failed: {e}")))?;
		let public_pem = keys.public_key_pem()?;

		let contents: [(&str, Zeroizing<String>); 4] = [
			(
				FIELD_KEY_FILE,
				Zeroizing::new(BASE64.encode(keys.field_key.expose())),
			),
			(
				HMAC_KEY_FILE,
				Zeroizing::new(BASE64.encode(keys.hmac_key.expose())),
			),
			(PRIVATE_KEY_FILE, Zeroizing::new(private_pem.to_string())),
			(PUBLIC_KEY_FILE, Zeroizing::new(public_pem)),
		];

		let mut staged = Vec::with_capacity(contents.len());
		for (file, body) in &contents {
			let tmp = self.path(&format!("{file}.{}.tmp", std::process::id()));
			write_private_file(&tmp, body.as_bytes())?;
			staged.push((tmp, self.path(file)));
		}
		for (tmp, path) in staged {
			fs::rename(&tmp, &path).map_err(|e| CryptoError::from_key_io(&path, e))?;
		}
		Ok(())
	}
}

/// Exclusive marker for first-run generation, removed on drop.
struct InitLock {
	path: PathBuf,
}

impl InitLock {
	/// `Ok(None)` when another process holds the lock.
	fn acquire(path: PathBuf) -> CryptoResult<Option<Self>> {
		let mut options = fs::OpenOptions::new();
		options.write(true).create_new(true);
		#[cfg(unix)]
		{
			use std::os::unix::fs::OpenOptionsExt;
			options.mode(0o600);
		}
		match options.open(&path) {
			Ok(mut file) => {
				// Holder's pid, for operators looking at a stale lock.
				let _ = writeln!(file, "{}", std::process::id());
				Ok(Some(Self { path }))
			}
			Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
			Err(e) => Err(CryptoError::from_key_io(&path, e)),
		}
	}
}

impl Drop for InitLock {
	fn drop(&mut self) {
		if let Err(e) = fs::remove_file(&self.path) {
			warn!(path = %self.path.display(), error = %e, "failed to remove key init lock");
		}
	}
}

fn create_private_dir(dir: &Path) -> CryptoResult<()> {
	let mut builder = fs::DirBuilder::new();
	builder.recursive(true);
	#[cfg(unix)]
	{
		use std::os::unix::fs::DirBuilderExt;
		builder.mode(0o700);
	}
	builder
		.create(dir)
		.map_err(|e| CryptoError::from_key_io(dir, e))
}

fn write_private_file(path: &Path, body: &[u8]) -> CryptoResult<()> {
	let mut options = fs::OpenOptions::new();
	options.write(true).create(true).truncate(true);
	#[cfg(unix)]
	{
		use std::os::unix::fs::OpenOptionsExt;
		options.mode(0o600);
	}
	let mut file = options
		.open(path)
		.map_err(|e| CryptoError::from_key_io(path, e))?;
	file.write_all(body)
		.and_then(|_| file.sync_all())
		.map_err(|e| CryptoError::from_key_io(path, e))
}

/// Shared fixtures for tests in this and downstream crates.
pub mod testing {
	use std::sync::OnceLock;

	use super::KeyMaterial;

	/// Small modulus keeps RSA generation fast in debug builds.
	pub const TEST_RSA_BITS: usize = 1024;

	/// One generated key set per test binary.
	pub fn shared_key_material() -> KeyMaterial {
		static KEYS: OnceLock<KeyMaterial> = OnceLock::new();
		KEYS.get_or_init(|| match KeyMaterial::generate(TEST_RSA_BITS) {
			Ok(keys) => keys,
			Err(e) => panic!("test key generation failed: {e}"),
		})
		.clone()
	}
}
