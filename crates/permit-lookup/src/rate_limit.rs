// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sliding-window rate limiter keyed by caller id.
//!
//! State lives only in memory; a restart resets every window. Callers with
//! an empty window are swept every [`SWEEP_EVERY`] checks so the map does
//! not grow with every caller ever seen.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const SWEEP_EVERY: u64 = 256;

type Windows = HashMap<String, VecDeque<Instant>>;

#[derive(Debug, Clone)]
pub struct RateLimiter {
	windows: Arc<Mutex<Windows>>,
	checks: Arc<AtomicU64>,
	max_requests: usize,
	window: Duration,
}

/// Drops timestamps that have left the window ending at `now`.
fn prune(calls: &mut VecDeque<Instant>, now: Instant, window: Duration) {
	while let Some(&oldest) = calls.front() {
		if now.saturating_duration_since(oldest) >= window {
			calls.pop_front();
		} else {
			break;
		}
	}
}

fn sweep(windows: &mut Windows, now: Instant, window: Duration) {
	let before = windows.len();
	windows.retain(|_, calls| {
		prune(calls, now, window);
		!calls.is_empty()
	});
	debug!(evicted = before - windows.len(), "idle callers swept");
}

impl RateLimiter {
	pub fn new(max_requests: usize, window: Duration) -> Self {
		Self {
			windows: Arc::new(Mutex::new(HashMap::new())),
			checks: Arc::new(AtomicU64::new(0)),
			max_requests,
			window,
		}
	}

	pub fn max_requests(&self) -> usize {
		self.max_requests
	}

	pub fn window(&self) -> Duration {
		self.window
	}

	/// Counts the call and returns whether it fits in the caller's window.
	/// Rejected calls are not counted.
	pub async fn is_allowed(&self, caller_id: &str) -> bool {
		self.is_allowed_at(caller_id, Instant::now()).await
	}

	pub async fn is_allowed_at(&self, caller_id: &str, now: Instant) -> bool {
		let mut windows = self.windows.lock().await;
		if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
			sweep(&mut windows, now, self.window);
		}
		let calls = windows.entry(caller_id.to_string()).or_default();
		prune(calls, now, self.window);

		if calls.len() < self.max_requests {
			calls.push_back(now);
			debug!(caller_id, used = calls.len(), "rate limit check passed");
			true
		} else {
			warn!(caller_id, "rate limit exceeded");
			false
		}
	}

	/// Zero when the next call would be allowed right away.
	pub async fn time_until_next_allowed(&self, caller_id: &str) -> Duration {
		self.time_until_next_allowed_at(caller_id, Instant::now()).await
	}

	pub async fn time_until_next_allowed_at(&self, caller_id: &str, now: Instant) -> Duration {
		let mut windows = self.windows.lock().await;
		let Some(calls) = windows.get_mut(caller_id) else {
			return Duration::ZERO;
		};
		prune(calls, now, self.window);
		if calls.len() < self.max_requests {
			return Duration::ZERO;
		}
		match calls.front() {
			Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
			None => Duration::ZERO,
		}
	}

	pub async fn reset(&self, caller_id: &str) {
		self.windows.lock().await.remove(caller_id);
	}

	#[cfg(test)]
	async fn tracked_callers(&self) -> usize {
		self.windows.lock().await.len()
	}
}
