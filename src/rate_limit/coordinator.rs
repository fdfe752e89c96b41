//! Per-client owner of the last known rate-limit budget.

// self
use crate::{
	_prelude::*,
	cache::SharedCachedValue,
	http::Headers,
	rate_limit::{
		CheckerPolicy, RateLimitChecker, RateLimitRecord, RateLimitSnapshot, RateLimitTarget,
	},
	runtime,
};

/// Boxed future returned by [`RateLimitProbe::probe`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<RateLimitSnapshot>> + 'a + Send>>;

/// Source of fresh rate-limit snapshots, normally `GET /rate_limit` through the client.
pub trait RateLimitProbe
where
	Self: Send + Sync,
{
	/// Fetches every record the server reports.
	fn probe(&self) -> ProbeFuture<'_>;
}

/// Tracks the latest [`RateLimitRecord`] per resource and runs the pre-flight checker.
///
/// One coordinator is owned by each client and shared by all of its clones. Records are
/// superseded atomically; a record whose reset has passed reads as unknown (full budget).
pub struct RateLimitCoordinator {
	records: RwLock<HashMap<String, RateLimitRecord>>,
	snapshot: SharedCachedValue<RateLimitSnapshot>,
	checker: Arc<dyn RateLimitChecker>,
}
impl RateLimitCoordinator {
	/// Creates a coordinator driven by `checker`.
	pub fn new(checker: Arc<dyn RateLimitChecker>) -> Self {
		Self { records: RwLock::new(HashMap::new()), snapshot: SharedCachedValue::new(), checker }
	}

	/// Merges an observed record, keeping the newest window.
	///
	/// Returns `true` when the stored record was replaced.
	pub fn record_observed(&self, record: RateLimitRecord) -> bool {
		let now = runtime::now();
		let mut records = self.records.write();

		match records.get(&record.resource) {
			Some(existing) if !record.supersedes(existing, now) => false,
			_ => {
				records.insert(record.resource.clone(), record);

				true
			},
		}
	}

	/// Parses the rate-limit headers of a response and merges the record they describe.
	pub fn observe_headers(&self, headers: &Headers, target: RateLimitTarget) -> Option<RateLimitRecord> {
		let record = RateLimitRecord::from_headers(headers, target.resource().unwrap_or("core"))?;

		self.record_observed(record.clone());

		Some(record)
	}

	/// Last stored record for `resource`, if any; expired records are returned as stored.
	pub fn current(&self, resource: &str) -> Option<RateLimitRecord> {
		self.records.read().get(resource).cloned()
	}

	/// Last stored record for `resource`, with an unknown placeholder standing in for missing or
	/// already-reset data.
	pub fn effective(&self, resource: &str) -> RateLimitRecord {
		let now = runtime::now();

		self.current(resource)
			.filter(|record| !record.is_expired_at(now))
			.unwrap_or_else(|| RateLimitRecord::unknown(resource))
	}

	/// Consults the checker before a call budgeted against `target`.
	///
	/// The first check for a resource with no local record probes the server through `probe`;
	/// concurrent first callers share one probe. After the checker blocks, the record is
	/// refreshed with exactly one probe shared by every caller blocked on the same window.
	pub async fn check_before_call(
		&self,
		target: RateLimitTarget,
		probe: &dyn RateLimitProbe,
	) -> Result<()> {
		let Some(resource) = target.resource() else {
			return Ok(());
		};
		let mut blocked_at = None;
		let mut count = 0;

		loop {
			let record = self.record_for_check(resource, probe, blocked_at).await?;

			if !self.checker.check_rate_limit(&record, count).await? {
				return Ok(());
			}

			count += 1;
			blocked_at = Some(runtime::now());
		}
	}

	async fn record_for_check(
		&self,
		resource: &str,
		probe: &dyn RateLimitProbe,
		blocked_at: Option<OffsetDateTime>,
	) -> Result<RateLimitRecord> {
		if blocked_at.is_none()
			&& let Some(record) = self.current(resource)
		{
			let now = runtime::now();

			return Ok(if record.is_expired_at(now) { RateLimitRecord::unknown(resource) } else { record });
		}

		let snapshot = self
			.snapshot
			.get_or_refresh(
				|snapshot| blocked_at.is_some_and(|instant| snapshot.observed_at < instant),
				|| probe.probe(),
			)
			.await?;

		self.merge_snapshot(&snapshot, resource);

		Ok(self.effective(resource))
	}

	fn merge_snapshot(&self, snapshot: &RateLimitSnapshot, resource: &str) {
		let now = runtime::now();

		for record in snapshot.records.values() {
			if !record.is_expired_at(now) {
				self.record_observed(record.clone());
			}
		}

		// Park a placeholder so resources the server does not report stop triggering probes.
		if !snapshot.records.contains_key(resource) {
			self.record_observed(RateLimitRecord::unknown(resource));
		}
	}
}
impl Default for RateLimitCoordinator {
	fn default() -> Self {
		Self::new(Arc::new(CheckerPolicy::default()))
	}
}
impl Debug for RateLimitCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimitCoordinator")
			.field("records", &*self.records.read())
			.finish_non_exhaustive()
	}
}
