//! Clock and timer helpers shared by the suspension points of the pipeline.

// self
use crate::_prelude::*;

/// Current wall-clock instant in UTC.
pub(crate) fn now() -> OffsetDateTime {
	OffsetDateTime::now_utc()
}

/// Sleeps for `duration`; zero and negative durations return immediately.
pub(crate) async fn sleep(duration: Duration) {
	if let Ok(duration) = std::time::Duration::try_from(duration)
		&& !duration.is_zero()
	{
		tokio::time::sleep(duration).await;
	}
}

/// Sleeps until `instant`, but never for less than `floor`.
pub(crate) async fn sleep_until(instant: OffsetDateTime, floor: Duration) {
	let wait = instant - now();

	sleep(if wait < floor { floor } else { wait }).await;
}
