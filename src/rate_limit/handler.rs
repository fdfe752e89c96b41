//! Policies applied after the server reports an exhausted limit.

// self
use crate::{
	_prelude::*,
	http::ConnectorResponse,
	obs,
	rate_limit::{REMAINING_HEADER, RESET_HEADER, RESOURCE_HEADER, RateLimitTarget},
	runtime,
};

/// Boxed future returned by [`RateLimitHandler::on_limit_exceeded`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a + Send>>;

/// Strategy invoked when a response signals an exhausted limit.
pub trait RateLimitHandler
where
	Self: Send + Sync,
{
	/// Handles the exhaustion.
	///
	/// Returning `Ok(())` asks the pipeline to retry within its attempt bound; returning an
	/// error fails the call with that error.
	fn on_limit_exceeded<'a>(&'a self, exceeded: &'a LimitExceeded) -> HandlerFuture<'a>;
}

/// Built-in post-exceeded policies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HandlerPolicy {
	/// Sleeps until the advertised reset and retries once.
	#[default]
	Wait,
	/// Fails immediately with [`Error::RateLimitExceeded`].
	Fail,
}
impl HandlerPolicy {
	const MIN_SLEEP: Duration = Duration::seconds(1);
	const SECONDARY_DEFAULT_WAIT: Duration = Duration::minutes(1);
}
impl RateLimitHandler for HandlerPolicy {
	fn on_limit_exceeded<'a>(&'a self, exceeded: &'a LimitExceeded) -> HandlerFuture<'a> {
		Box::pin(async move {
			match self {
				HandlerPolicy::Fail => Err(exceeded.to_error()),
				HandlerPolicy::Wait => {
					obs::record_limit_handler_wait(&exceeded.resource, exceeded.kind);

					match (exceeded.retry_after, exceeded.reset_at, exceeded.kind) {
						(Some(delay), _, _) => runtime::sleep(delay.max(Self::MIN_SLEEP)).await,
						(None, Some(reset_at), LimitKind::Primary) =>
							runtime::sleep_until(reset_at, Self::MIN_SLEEP).await,
						_ => runtime::sleep(Self::SECONDARY_DEFAULT_WAIT).await,
					}

					Ok(())
				},
			}
		})
	}
}

/// Which limit the server enforced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LimitKind {
	/// The per-window budget reported by the `X-RateLimit-*` headers.
	Primary,
	/// The secondary (abuse) limit, usually accompanied by `Retry-After`.
	Secondary,
}
impl LimitKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			LimitKind::Primary => "primary",
			LimitKind::Secondary => "secondary",
		}
	}
}

/// Details of a rate-limited response handed to a [`RateLimitHandler`].
#[derive(Clone, Debug)]
pub struct LimitExceeded {
	/// Which limit fired.
	pub kind: LimitKind,
	/// Resource category the call was counted against.
	pub resource: String,
	/// Advertised reset instant, when present.
	pub reset_at: Option<OffsetDateTime>,
	/// `Retry-After` hint, when present.
	pub retry_after: Option<Duration>,
	/// The rate-limited response.
	pub response: ConnectorResponse,
}
impl LimitExceeded {
	/// Classifies a response; returns `None` unless it is a 403/429 signalling a rate limit.
	pub fn detect(response: &ConnectorResponse, target: RateLimitTarget) -> Option<Self> {
		if response.status != 403 && response.status != 429 {
			return None;
		}

		let headers = &response.headers;
		let body = response.body_text().to_ascii_lowercase();
		let retry_after = headers.retry_after();
		let kind = if body.contains("secondary rate limit") || body.contains("abuse") {
			LimitKind::Secondary
		} else if headers.get(REMAINING_HEADER).map(str::trim) == Some("0")
			|| body.contains("rate limit")
		{
			LimitKind::Primary
		} else if retry_after.is_some() || response.status == 429 {
			LimitKind::Secondary
		} else {
			return None;
		};
		let resource = headers
			.get(RESOURCE_HEADER)
			.or(target.resource())
			.unwrap_or("core")
			.to_owned();
		let reset_at = headers
			.get_u64(RESET_HEADER)
			.and_then(|secs| i64::try_from(secs).ok())
			.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());

		Some(Self { kind, resource, reset_at, retry_after, response: response.clone() })
	}

	/// Returns `true` for the secondary (abuse) limit.
	pub fn is_secondary(&self) -> bool {
		matches!(self.kind, LimitKind::Secondary)
	}

	/// Error describing this exhaustion.
	pub fn to_error(&self) -> Error {
		Error::RateLimitExceeded {
			resource: self.resource.clone(),
			reset_at: self.reset_at,
			secondary: self.is_secondary(),
		}
	}
}
