//! `github_client_operation_total{op, outcome}`, a no-op unless the `metrics` feature is on.

// self
use crate::obs::{OpKind, OpOutcome};

const OPERATION_TOTAL: &str = "github_client_operation_total";

/// Counts one step of a pipeline operation: its entry, or how it ended.
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(OPERATION_TOTAL, "op" => kind.as_str(), "outcome" => outcome.as_str())
		.increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = (OPERATION_TOTAL, kind, outcome);
}

/// Counts how an operation ended, given the result it returned to the caller.
pub fn record_op_result<T, E>(kind: OpKind, result: &Result<T, E>) {
	record_op_outcome(kind, if result.is_ok() { OpOutcome::Success } else { OpOutcome::Failure });
}
