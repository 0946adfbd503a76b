// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Read path for remote callers: authorization guards, a sliding-window
//! rate limiter, the query log, and plate status classification on top of
//! the record store.

pub mod error;
pub mod guard;
pub mod query_log;
pub mod rate_limit;
pub mod service;

pub use error::{LookupError, QueryLogError};
pub use guard::{AllowList, Both, Caller, CallerGuard, CallerGuardExt};
pub use query_log::{QueryLog, QueryLogEntry};
pub use rate_limit::RateLimiter;
pub use service::{LookupService, LookupSettings, PlateStatus};
