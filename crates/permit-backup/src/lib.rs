// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Encrypted backup and restore of the registry database and its key set.

pub mod archive;
pub mod envelope;
pub mod error;

pub use archive::{create_backup, restore_backup, sqlite_path, BackupSummary, RestoreSummary, RestoreTarget};
pub use envelope::{MAGIC, MIN_PASSPHRASE_LEN};
pub use error::{BackupError, BackupResult};
