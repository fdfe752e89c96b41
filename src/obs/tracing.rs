// self
use crate::{_prelude::*, obs::OpKind, rate_limit::LimitKind};

/// Span named `github_client.op` around one pipeline operation.
///
/// `op` carries the [`OpKind`] label and `stage` the call site that opened it, so a request,
/// the rate-limit lookup it triggers, and a credential exchange nested inside it can be told
/// apart. Without the `tracing` feature the span is empty and every method is a passthrough.
#[derive(Clone, Debug)]
pub struct OpSpan {
	kind: OpKind,
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Opens the span for `kind` at `stage`.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		let span = tracing::info_span!("github_client.op", op = kind.as_str(), stage);
		#[cfg(not(feature = "tracing"))]
		let _ = stage;

		Self {
			kind,
			#[cfg(feature = "tracing")]
			span,
		}
	}

	/// Operation this span was opened for.
	pub fn kind(&self) -> OpKind {
		self.kind
	}

	/// Runs blocking work, such as signing an app assertion, inside the span.
	pub fn in_scope<T>(&self, work: impl FnOnce() -> T) -> T {
		#[cfg(feature = "tracing")]
		{
			self.span.in_scope(work)
		}
		#[cfg(not(feature = "tracing"))]
		{
			work()
		}
	}

	/// Drives `fut` to completion, entering the span on every poll.
	pub async fn run<Fut>(&self, fut: Fut) -> Fut::Output
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			tracing::Instrument::instrument(fut, self.span.clone()).await
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut.await
		}
	}
}

/// Emits a `warn` event before a transient connector fault is retried.
pub fn record_retry(url: &Url, attempt: u32, delay: Duration, cause: &dyn StdError) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			url = %url,
			attempt,
			delay_ms = delay.whole_milliseconds() as u64,
			error = %cause,
			"Connector fault; retrying request."
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (url, attempt, delay, cause);
	}
}

/// Emits a `warn` event when a pre-flight checker blocks until the budget resets.
pub fn record_rate_limit_wait(resource: &str, reset_at: OffsetDateTime, count: u64) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(resource, reset_at = %reset_at, count, "Rate limit budget low; waiting for reset.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (resource, reset_at, count);
	}
}

/// Emits a `warn` event when a handler sleeps after the server reported an exhausted limit.
pub fn record_limit_handler_wait(resource: &str, kind: LimitKind) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(resource, limit = kind.as_str(), "Rate limit exceeded; waiting before retry.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (resource, kind);
	}
}

/// Emits a `debug` event when a provider replaces its cached credential.
///
/// Only the credential fingerprint is logged, never the secret.
pub fn record_credential_refresh(kind: OpKind, fingerprint: &str, expires_at: Option<OffsetDateTime>) {
	#[cfg(feature = "tracing")]
	{
		match expires_at {
			Some(expires_at) => tracing::debug!(
				op = kind.as_str(),
				fingerprint,
				expires_at = %expires_at,
				"Credential refreshed."
			),
			None => tracing::debug!(op = kind.as_str(), fingerprint, "Credential refreshed."),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, fingerprint, expires_at);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn signing_sections_return_their_value() {
		let span = OpSpan::new(OpKind::AppAssertion, "sign");

		assert_eq!(span.kind(), OpKind::AppAssertion);
		assert_eq!(span.in_scope(|| "signed"), "signed");
	}

	#[tokio::test]
	async fn requests_resolve_inside_the_span() {
		let span = OpSpan::new(OpKind::Request, "execute");

		assert_eq!(span.run(async { 204_u16 }).await, 204);
	}
}
