//! Optional observability helpers for pipeline operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `github_client.op` with the `op` (operation)
//!   and `stage` (call site) fields, plus `warn`/`debug` events for retries, rate-limit waits, and
//!   credential refreshes.
//! - Enable `metrics` to increment the `github_client_operation_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// One call through the request pipeline.
	Request,
	/// `GET /rate_limit` probe issued by the coordinator.
	RateLimitProbe,
	/// Signing of an app assertion.
	AppAssertion,
	/// Installation lookup (by organization, user, or repository).
	InstallationLookup,
	/// Installation access-token exchange.
	InstallationToken,
	/// Interactive device authorization.
	DeviceFlow,
	/// Refresh-token exchange for a stored device-flow credential.
	DeviceRefresh,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Request => "request",
			OpKind::RateLimitProbe => "rate_limit_probe",
			OpKind::AppAssertion => "app_assertion",
			OpKind::InstallationLookup => "installation_lookup",
			OpKind::InstallationToken => "installation_token",
			OpKind::DeviceFlow => "device_flow",
			OpKind::DeviceRefresh => "device_refresh",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside an [`OpSpan`], counting the attempt and how it ended.
pub(crate) async fn observe<T, Fut>(kind: OpKind, stage: &'static str, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	record_op_outcome(kind, OpOutcome::Attempt);

	let result = OpSpan::new(kind, stage).run(fut).await;

	record_op_result(kind, &result);

	result
}

/// Blocking counterpart of [`observe`] for work that never awaits.
pub(crate) fn observe_sync<T>(
	kind: OpKind,
	stage: &'static str,
	work: impl FnOnce() -> Result<T>,
) -> Result<T> {
	record_op_outcome(kind, OpOutcome::Attempt);

	let result = OpSpan::new(kind, stage).in_scope(work);

	record_op_result(kind, &result);

	result
}
