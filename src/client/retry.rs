//! Retry bound and backoff schedule for transient connector faults.

// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

/// Immutable retry configuration.
///
/// `max_attempts` counts every attempt including the first. Delays double from `min_backoff`
/// and are capped at `max_backoff`; `jitter` adds a uniformly random extra delay on top.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total attempts per call, including the first one.
	pub max_attempts: u32,
	/// Delay before the second attempt.
	pub min_backoff: Duration,
	/// Upper bound for any single delay before jitter.
	pub max_backoff: Duration,
	/// Upper bound of the random delay added to each backoff.
	pub jitter: Duration,
}
impl RetryPolicy {
	/// Default total attempts.
	pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
	/// Default backoff between attempts.
	pub const DEFAULT_BACKOFF: Duration = Duration::milliseconds(100);

	/// Policy that never retries.
	pub const fn none() -> Self {
		Self {
			max_attempts: 1,
			min_backoff: Duration::ZERO,
			max_backoff: Duration::ZERO,
			jitter: Duration::ZERO,
		}
	}

	/// Overrides the total attempt count; values below one are raised to one.
	pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
		self.max_attempts = max_attempts.max(1);

		self
	}

	/// Overrides the backoff bounds; `max` is raised to `min` when smaller.
	pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
		self.min_backoff = min.max(Duration::ZERO);
		self.max_backoff = max.max(self.min_backoff);

		self
	}

	/// Overrides the jitter bound.
	pub fn with_jitter(mut self, jitter: Duration) -> Self {
		self.jitter = jitter.max(Duration::ZERO);

		self
	}

	/// Returns `true` when another attempt is allowed after `attempt` attempts.
	pub fn allows_retry(&self, attempt: u32) -> bool {
		attempt < self.max_attempts
	}

	/// Deterministic delay after the `attempt`-th failed attempt (1-based).
	pub fn backoff(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1).min(16);
		let factor = i32::try_from(1_u32 << exponent).unwrap_or(i32::MAX);
		let delay = self.min_backoff.checked_mul(factor).unwrap_or(self.max_backoff);

		delay.min(self.max_backoff)
	}

	/// [`backoff`](Self::backoff) plus random jitter.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let base = self.backoff(attempt);
		let jitter_ms = self.jitter.whole_milliseconds();

		if jitter_ms <= 0 {
			return base;
		}

		let extra = rand::rng().random_range(0..=i64::try_from(jitter_ms).unwrap_or(i64::MAX));

		base + Duration::milliseconds(extra)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
			min_backoff: Self::DEFAULT_BACKOFF,
			max_backoff: Self::DEFAULT_BACKOFF,
			jitter: Duration::ZERO,
		}
	}
}
