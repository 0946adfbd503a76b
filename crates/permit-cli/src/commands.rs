// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context as _, Result};
use permit_audit::{AuditOperation, AuditQuery};
use permit_backup::{sqlite_path, RestoreTarget};
use permit_config::{require_secret_env, PermitConfig};
use permit_lookup::{Caller, LookupError};
use permit_store::Record;

use crate::context::AppContext;
use crate::Command;

pub const PASSPHRASE_ENV: &str = "PERMIT_BACKUP_PASSPHRASE";

pub async fn run(command: Command, config: PermitConfig) -> Result<ExitCode> {
	// Restore must not generate keys or touch the live database first.
	if let Command::Restore { input, overwrite } = command {
		return restore(&input, overwrite, &config);
	}

	let ctx = AppContext::open(config).await?;
	match command {
		Command::Init => {
			let report = ctx.store.verify_all_integrity().await?;
			println!("keys:        {}", ctx.config.paths.keys_dir.display());
			println!("fingerprint: {}", ctx.keys.fingerprint()?);
			println!("database:    {}", ctx.config.database.url);
			println!("records:     {}", report.total);
			Ok(ExitCode::SUCCESS)
		}
		Command::Verify => {
			let report = ctx.store.verify_all_integrity().await?;
			println!(
				"{} records, {} verified, {} failed",
				report.total,
				report.verified,
				report.failed_count()
			);
			for id in &report.failed {
				println!("INTEGRITY FAILED: {id}");
			}
			Ok(if report.is_clean() {
				ExitCode::SUCCESS
			} else {
				ExitCode::FAILURE
			})
		}
		Command::Show { protocol_id } => {
			let record = ctx.store.get(&protocol_id).await?;
			print_record(&record)?;
			Ok(if record.is_verified() {
				ExitCode::SUCCESS
			} else {
				ExitCode::FAILURE
			})
		}
		Command::Search { text } => {
			let hits = ctx.store.search(&text).await?;
			for record in &hits {
				print_record(record)?;
			}
			eprintln!("{} match(es)", hits.len());
			Ok(ExitCode::SUCCESS)
		}
		Command::Audit {
			operation,
			text,
			protocol_id,
			limit,
		} => {
			let operation = operation
				.map(|op| op.parse::<AuditOperation>())
				.transpose()
				.map_err(anyhow::Error::msg)?;
			let entries = ctx
				.store
				.audit()
				.query(&AuditQuery {
					operation,
					text,
					protocol_id,
					limit,
				})
				.await?;
			for entry in &entries {
				println!("{}", serde_json::to_string(entry)?);
			}
			Ok(ExitCode::SUCCESS)
		}
		Command::Lookup {
			caller,
			label,
			plate,
		} => {
			let mut caller = Caller::new(caller);
			if let Some(label) = label {
				caller = caller.with_label(label);
			}
			match ctx.lookup_service().check_plate(&caller, &plate).await {
				Ok(status) => {
					println!("{}", serde_json::to_string(&status)?);
					Ok(ExitCode::SUCCESS)
				}
				Err(e @ LookupError::Integrity { .. }) => {
					eprintln!("WARNING: {e}");
					Ok(ExitCode::FAILURE)
				}
				Err(e) => Err(e.into()),
			}
		}
		Command::Attest { protocol_id } => {
			let attestation = ctx.store.attest(&protocol_id).await?;
			println!("protocol_id: {}", attestation.protocol_id);
			println!("canonical:   {}", attestation.canonical.escape_default());
			println!("signature:   {}", attestation.signature);
			println!("fingerprint: {}", ctx.keys.fingerprint()?);
			print!("{}", ctx.store.public_key_pem()?);
			Ok(ExitCode::SUCCESS)
		}
		Command::Backup { out } => {
			let passphrase = require_secret_env(PASSPHRASE_ENV)?;
			let summary = permit_backup::create_backup(
				&ctx.pool,
				&ctx.config.paths.keys_dir,
				&out,
				&passphrase,
			)
			.await?;
			println!(
				"backup written to {} ({} byte database, keys {})",
				summary.path.display(),
				summary.database_bytes,
				summary.key_fingerprint
			);
			Ok(ExitCode::SUCCESS)
		}
		Command::Restore { .. } | Command::Version => bail!("unreachable command dispatch"),
	}
}

fn restore(input: &Path, overwrite: bool, config: &PermitConfig) -> Result<ExitCode> {
	let passphrase = require_secret_env(PASSPHRASE_ENV)?;
	let database_path = sqlite_path(&config.database.url).with_context(|| {
		format!(
			"database url {} does not name a file to restore into",
			config.database.url
		)
	})?;
	let summary = permit_backup::restore_backup(
		input,
		&passphrase,
		&RestoreTarget {
			database_path,
			keys_dir: config.paths.keys_dir.clone(),
			overwrite,
		},
	)?;
	println!(
		"restored backup from {} into {} (keys {})",
		summary.created_at.to_rfc3339(),
		summary.database_path.display(),
		summary.key_fingerprint
	);
	println!("run `permit verify` to check record integrity");
	Ok(ExitCode::SUCCESS)
}

fn print_record(record: &Record) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(record)?);
	if !record.is_verified() {
		eprintln!(
			"WARNING: record {} failed integrity verification",
			record.protocol_id
		);
	}
	let unreadable = record.unreadable_fields();
	if !unreadable.is_empty() {
		eprintln!("WARNING: unreadable fields: {}", unreadable.join(", "));
	}
	let malformed = record.malformed_fields();
	if !malformed.is_empty() {
		eprintln!("WARNING: malformed fields: {}", malformed.join(", "));
	}
	Ok(())
}
