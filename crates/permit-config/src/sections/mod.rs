// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod database;
mod logging;
mod lookup;
mod paths;
mod store;

pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use lookup::{LookupConfig, LookupConfigLayer};
pub use paths::{PathsConfig, PathsConfigLayer};
pub use store::{StoreConfig, StoreConfigLayer};
