// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secure record store for the parking-subscription registry.
//!
//! [`RecordStore`] encrypts sensitive fields with the field cipher, signs
//! each stored row with the HMAC key, and writes one audit entry per
//! mutation in the same transaction as the mutation itself. Reads verify
//! the signature and report failures in [`Record::integrity`] rather than
//! hiding the record.

pub mod error;
pub mod fields;
pub mod record;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use fields::{normalize_plate, parse_date, PaymentMethod, RecordFields, RecordPatch, Patch, SensitiveFields};
pub use record::{DecryptedField, IntegrityReport, IntegrityStatus, PlainField, Record, UNREADABLE};
pub use store::{RecordStore, StoreSettings};
