//! Rate-limit records, resource targets, and probe snapshots.

// self
use crate::{_prelude::*, http::Headers, runtime};

/// Header carrying the budget size.
pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
/// Header carrying the remaining budget.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// Header carrying the consumed budget.
pub const USED_HEADER: &str = "x-ratelimit-used";
/// Header carrying the reset instant in epoch seconds.
pub const RESET_HEADER: &str = "x-ratelimit-reset";
/// Header naming the resource category the response was counted against.
pub const RESOURCE_HEADER: &str = "x-ratelimit-resource";

/// Limit reported for records whose real budget is unknown.
pub const UNKNOWN_LIMIT: u64 = 1_000_000;
const UNKNOWN_RESET_WINDOW: Duration = Duration::seconds(30);

/// Resource category a request is budgeted against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitTarget {
	/// Not rate limited; pre-flight checks are skipped.
	None,
	/// REST API calls.
	Core,
	/// Search API calls.
	Search,
	/// GraphQL calls.
	Graphql,
	/// App manifest conversions.
	IntegrationManifest,
}
impl RateLimitTarget {
	/// Resource name used by the server, or `None` for unbudgeted calls.
	pub const fn resource(self) -> Option<&'static str> {
		match self {
			RateLimitTarget::None => None,
			RateLimitTarget::Core => Some("core"),
			RateLimitTarget::Search => Some("search"),
			RateLimitTarget::Graphql => Some("graphql"),
			RateLimitTarget::IntegrationManifest => Some("integration_manifest"),
		}
	}

	/// Picks the target for an API path (relative to the API root).
	pub fn from_path(path: &str) -> Self {
		let path = path.trim_end_matches('/');

		if path == "/rate_limit" {
			RateLimitTarget::None
		} else if path == "/search" || path.starts_with("/search/") {
			RateLimitTarget::Search
		} else if path == "/graphql" {
			RateLimitTarget::Graphql
		} else if path.starts_with("/app-manifests/") && path.ends_with("/conversions") {
			RateLimitTarget::IntegrationManifest
		} else {
			RateLimitTarget::Core
		}
	}
}

/// Last known budget for one resource category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
	/// Resource category (`core`, `search`, ...).
	pub resource: String,
	/// Budget size for the current window.
	pub limit: u64,
	/// Calls left in the current window; never above `limit`.
	pub remaining: u64,
	/// Calls consumed in the current window.
	pub used: u64,
	/// Instant the window resets.
	#[serde(with = "time::serde::rfc3339")]
	pub reset_at: OffsetDateTime,
	/// Instant the record was observed locally.
	#[serde(with = "time::serde::rfc3339")]
	pub observed_at: OffsetDateTime,
}
impl RateLimitRecord {
	/// Creates a record observed now; `remaining` is clamped to `limit`.
	pub fn new(
		resource: impl Into<String>,
		limit: u64,
		remaining: u64,
		reset_at: OffsetDateTime,
	) -> Self {
		let remaining = remaining.min(limit);

		Self {
			resource: resource.into(),
			limit,
			remaining,
			used: limit - remaining,
			reset_at,
			observed_at: runtime::now(),
		}
	}

	/// Placeholder for a resource whose budget is unknown; treated as full.
	pub fn unknown(resource: impl Into<String>) -> Self {
		Self::new(resource, UNKNOWN_LIMIT, UNKNOWN_LIMIT, runtime::now() + UNKNOWN_RESET_WINDOW)
	}

	/// Overrides the local observation instant.
	pub fn with_observed_at(mut self, instant: OffsetDateTime) -> Self {
		self.observed_at = instant;

		self
	}

	/// Overrides the consumed count.
	pub fn with_used(mut self, used: u64) -> Self {
		self.used = used;

		self
	}

	/// Parses the rate-limit headers of a response.
	///
	/// `fallback_resource` names the category when the server omits `X-RateLimit-Resource`.
	pub fn from_headers(headers: &Headers, fallback_resource: &str) -> Option<Self> {
		let limit = headers.get_u64(LIMIT_HEADER)?;
		let remaining = headers.get_u64(REMAINING_HEADER)?;
		let reset = headers.get_u64(RESET_HEADER)?;
		let reset_at = OffsetDateTime::from_unix_timestamp(i64::try_from(reset).ok()?).ok()?;
		let resource = headers.get(RESOURCE_HEADER).unwrap_or(fallback_resource);
		let record = Self::new(resource, limit, remaining, reset_at);

		Some(match headers.get_u64(USED_HEADER) {
			Some(used) => record.with_used(used),
			None => record,
		})
	}

	/// Returns `true` when the reset instant is not in the future.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.reset_at <= instant
	}

	/// Returns `true` for [`unknown`](Self::unknown) placeholders.
	pub fn is_unknown(&self) -> bool {
		self.limit == UNKNOWN_LIMIT
	}

	/// Decides whether `self` should replace `existing` in the coordinator.
	///
	/// Unknown placeholders always yield to real data. Among real records the later window wins,
	/// and within one window the lower remaining count wins so late responses cannot inflate the
	/// budget.
	pub fn supersedes(&self, existing: &RateLimitRecord, instant: OffsetDateTime) -> bool {
		if existing.is_unknown() {
			return true;
		}
		if self.is_unknown() {
			return existing.is_expired_at(instant);
		}

		match self.reset_at.cmp(&existing.reset_at) {
			std::cmp::Ordering::Greater => true,
			std::cmp::Ordering::Equal => self.remaining <= existing.remaining,
			std::cmp::Ordering::Less => false,
		}
	}
}

/// Every record returned by one `/rate_limit` probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitSnapshot {
	/// Records keyed by resource name.
	pub records: HashMap<String, RateLimitRecord>,
	/// `true` when the server does not report rate limits at all.
	pub unknown: bool,
	/// Instant the probe completed.
	pub observed_at: OffsetDateTime,
}
impl RateLimitSnapshot {
	/// Snapshot for servers without rate limiting (the probe answered 404).
	pub fn unknown() -> Self {
		Self { records: HashMap::new(), unknown: true, observed_at: runtime::now() }
	}

	/// Builds a snapshot from records.
	pub fn from_records(records: impl IntoIterator<Item = RateLimitRecord>) -> Self {
		Self {
			records: records.into_iter().map(|record| (record.resource.clone(), record)).collect(),
			unknown: false,
			observed_at: runtime::now(),
		}
	}

	/// Parses the `/rate_limit` response body.
	pub fn from_body(body: &[u8]) -> Result<Self, serde_path_to_error::Error<serde_json::Error>> {
		let de = &mut serde_json::Deserializer::from_slice(body);
		let payload: RateLimitPayload = serde_path_to_error::deserialize(de)?;
		let records = payload.resources.into_iter().filter_map(|(resource, raw)| {
			let reset_at = OffsetDateTime::from_unix_timestamp(raw.reset).ok()?;
			let record = RateLimitRecord::new(resource, raw.limit, raw.remaining, reset_at);

			Some(match raw.used {
				Some(used) => record.with_used(used),
				None => record,
			})
		});

		Ok(Self::from_records(records))
	}

	/// Returns `true` when the snapshot says something about `resource`.
	pub fn covers(&self, resource: &str) -> bool {
		self.unknown || self.records.contains_key(resource)
	}

	/// Record for `resource`; unknown placeholders stand in for missing or already-reset data.
	pub fn record_for(&self, resource: &str, instant: OffsetDateTime) -> RateLimitRecord {
		self.records
			.get(resource)
			.filter(|record| !record.is_expired_at(instant))
			.cloned()
			.unwrap_or_else(|| RateLimitRecord::unknown(resource))
	}
}

#[derive(Deserialize)]
struct RateLimitPayload {
	resources: HashMap<String, RawRecord>,
}

#[derive(Deserialize)]
struct RawRecord {
	limit: u64,
	remaining: u64,
	reset: i64,
	#[serde(default)]
	used: Option<u64>,
}
