//! Pre-flight rate-limit policies consulted before every budgeted call.

// self
use crate::{_prelude::*, obs, rate_limit::RateLimitRecord, runtime};

/// Boxed future returned by [`RateLimitChecker::check_rate_limit`].
pub type CheckFuture<'a> = Pin<Box<dyn Future<Output = Result<bool>> + 'a + Send>>;

/// Strategy that decides whether a call must wait for the budget to reset.
pub trait RateLimitChecker
where
	Self: Send + Sync,
{
	/// Inspects `record` before a call.
	///
	/// Returns `Ok(true)` after the checker has blocked; the coordinator then refreshes the
	/// record and asks again with `count` incremented. `Ok(false)` lets the call proceed and an
	/// error fails it.
	fn check_rate_limit<'a>(&'a self, record: &'a RateLimitRecord, count: u64) -> CheckFuture<'a>;
}

/// Built-in pre-flight policies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CheckerPolicy {
	/// Never blocks.
	#[default]
	NoWait,
	/// Blocks until reset whenever the remaining budget is zero.
	Wait,
	/// Blocks until reset whenever the remaining budget is below the threshold.
	LiteralValue(u64),
}
impl CheckerPolicy {
	const MIN_SLEEP: Duration = Duration::seconds(1);

	fn threshold(self) -> u64 {
		match self {
			CheckerPolicy::NoWait => 0,
			CheckerPolicy::Wait => 1,
			CheckerPolicy::LiteralValue(threshold) => threshold,
		}
	}
}
impl RateLimitChecker for CheckerPolicy {
	fn check_rate_limit<'a>(&'a self, record: &'a RateLimitRecord, count: u64) -> CheckFuture<'a> {
		Box::pin(async move {
			if record.remaining >= self.threshold() {
				return Ok(false);
			}

			obs::record_rate_limit_wait(&record.resource, record.reset_at, count);
			runtime::sleep_until(record.reset_at, Self::MIN_SLEEP).await;

			Ok(true)
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn record(remaining: u64) -> RateLimitRecord {
		RateLimitRecord::new("core", 5000, remaining, OffsetDateTime::now_utc() + Duration::minutes(10))
	}

	#[tokio::test(start_paused = true)]
	async fn literal_value_blocks_below_threshold_only() {
		let policy = CheckerPolicy::LiteralValue(50);

		assert!(!policy.check_rate_limit(&record(50), 0).await.expect("Check should succeed."));
		assert!(policy.check_rate_limit(&record(49), 0).await.expect("Check should succeed."));
	}

	#[tokio::test(start_paused = true)]
	async fn wait_blocks_only_when_exhausted() {
		assert!(!CheckerPolicy::Wait.check_rate_limit(&record(1), 0).await.expect("Check should succeed."));
		assert!(CheckerPolicy::Wait.check_rate_limit(&record(0), 0).await.expect("Check should succeed."));
		assert!(!CheckerPolicy::NoWait.check_rate_limit(&record(0), 0).await.expect("Check should succeed."));
	}
}
