// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `permit`: operator command line for the parking permit registry.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod context;
mod version;

#[derive(Parser, Debug)]
#[command(name = "permit", about = "Parking permit registry administration", version)]
struct Args {
	/// TOML configuration file (defaults to /etc/permit/permit.toml).
	#[arg(long, global = true, env = "PERMIT_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Generate key material if absent and create the database schema
	Init,
	/// Recompute every record signature and report mismatches
	Verify,
	/// Show one record, decrypted
	Show { protocol_id: String },
	/// Search plain and decrypted fields (linear scan)
	Search { text: String },
	/// List audit trail entries, oldest first
	Audit {
		#[arg(long)]
		operation: Option<String>,
		#[arg(long)]
		text: Option<String>,
		#[arg(long = "id")]
		protocol_id: Option<String>,
		#[arg(long)]
		limit: Option<i64>,
	},
	/// Check a plate the way the remote service does
	Lookup {
		#[arg(long)]
		caller: String,
		#[arg(long)]
		label: Option<String>,
		plate: String,
	},
	/// Produce an RSA attestation verifiable with the public key alone
	Attest { protocol_id: String },
	/// Write an encrypted backup (passphrase from PERMIT_BACKUP_PASSPHRASE[_FILE])
	Backup { out: PathBuf },
	/// Restore an encrypted backup into the configured locations
	Restore {
		input: PathBuf,
		#[arg(long)]
		overwrite: bool,
	},
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
	let args = Args::parse();

	if let Command::Version = args.command {
		println!("{}", version::format_version_info());
		return Ok(ExitCode::SUCCESS);
	}

	let config = match &args.config {
		Some(path) => permit_config::load_config_with_file(path)?,
		None => permit_config::load_config()?,
	};

	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.logging.level.clone().into());
	let registry = tracing_subscriber::registry().with(filter);
	if config.logging.json {
		registry
			.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
			.init();
	} else {
		registry
			.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
			.init();
	}

	commands::run(args.command, config).await
}
