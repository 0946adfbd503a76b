// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Append-only audit trail for the permit registry.
//!
//! Every create, update and delete of a subscription writes exactly one
//! [`AuditEntry`] in the same transaction as the mutation. Entries carry the
//! full plaintext before/after snapshots and the actor's justification, and
//! are never modified once written.

pub mod error;
pub mod event;
pub mod trail;

pub use error::{AuditError, AuditResult};
pub use event::{Actor, AuditEntry, AuditEntryBuilder, AuditOperation};
pub use trail::{format_timestamp, AuditQuery, AuditTrail};
