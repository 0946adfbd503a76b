// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite persistence for the permit registry.
//!
//! One database file holds the `subscriptions` table, the append-only
//! `audit_log` and the per-year `protocol_sequence`. The desktop editor and
//! the lookup service each open their own pool on it; WAL journaling lets
//! readers proceed during a write.

pub mod error;
pub mod migrations;
pub mod pool;
pub mod record;
pub mod sequence;
pub mod testing;

pub use error::{is_busy_error, DbError, Result};
pub use migrations::run_migrations;
pub use pool::create_pool;
pub use record::{RecordRepository, RecordRow};
pub use sequence::{format_protocol_id, next_protocol_id, parse_protocol_id};

pub use sqlx::{SqliteConnection, SqlitePool};
