// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Caller authorization checks run before any store access.

use std::collections::HashSet;

/// Identity a remote caller presents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
	pub id: String,
	pub label: Option<String>,
	pub remote_address: Option<String>,
}

impl Caller {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			label: None,
			remote_address: None,
		}
	}

	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = Some(label.into());
		self
	}

	pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
		self.remote_address = Some(address.into());
		self
	}
}

/// Returns `Err(reason)` to refuse a caller.
pub trait CallerGuard: Send + Sync {
	fn authorize(&self, caller: &Caller) -> Result<(), String>;
}

impl<F> CallerGuard for F
where
	F: Fn(&Caller) -> Result<(), String> + Send + Sync,
{
	fn authorize(&self, caller: &Caller) -> Result<(), String> {
		self(caller)
	}
}

pub trait CallerGuardExt: CallerGuard + Sized {
	/// Both guards must pass; `self` is checked first.
	fn and<G: CallerGuard>(self, other: G) -> Both<Self, G> {
		Both(self, other)
	}
}

impl<T: CallerGuard> CallerGuardExt for T {}

pub struct Both<A, B>(A, B);

impl<A: CallerGuard, B: CallerGuard> CallerGuard for Both<A, B> {
	fn authorize(&self, caller: &Caller) -> Result<(), String> {
		self.0.authorize(caller)?;
		self.1.authorize(caller)
	}
}

/// Admits only listed caller ids. An empty list admits nobody.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
	ids: HashSet<String>,
}

impl AllowList {
	pub fn new<I, S>(ids: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			ids: ids
				.into_iter()
				.map(Into::into)
				.map(|s: String| s.trim().to_string())
				.filter(|s| !s.is_empty())
				.collect(),
		}
	}

	pub fn len(&self) -> usize {
		self.ids.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ids.is_empty()
	}
}

impl CallerGuard for AllowList {
	fn authorize(&self, caller: &Caller) -> Result<(), String> {
		if self.ids.contains(&caller.id) {
			Ok(())
		} else {
			Err("caller is not on the allow list".to_string())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_allow_list_denies_everyone() {
		let guard = AllowList::default();
		assert!(guard.authorize(&Caller::new("bot:1")).is_err());
	}

	#[test]
	fn allow_list_trims_and_skips_blanks() {
		let guard = AllowList::new([" bot:1 ", "", "bot:2"]);
		assert_eq!(guard.len(), 2);
		assert!(guard.authorize(&Caller::new("bot:1")).is_ok());
		assert!(guard.authorize(&Caller::new("bot:3")).is_err());
	}

	#[test]
	fn closures_compose_with_and() {
		let labelled = |c: &Caller| {
			if c.label.is_some() {
				Ok(())
			} else {
				Err("label required".to_string())
			}
		};
		let guard = AllowList::new(["bot:1"]).and(labelled);

		assert!(guard
			.authorize(&Caller::new("bot:1").with_label("Vigile"))
			.is_ok());
		assert_eq!(
			guard.authorize(&Caller::new("bot:1")),
			Err("label required".to_string())
		);
		assert!(guard
			.authorize(&Caller::new("bot:9").with_label("Vigile"))
			.is_err());
	}
}
