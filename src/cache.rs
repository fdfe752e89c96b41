//! Single-flight, whole-second memoizer shared by every caller on a client.
//!
//! [`SharedCachedValue`] keeps the last computed value together with the wall-clock second it
//! was produced in. Callers arriving within the same second reuse it; the first caller after the
//! boundary (or after a staleness predicate rejects the value) runs the supplier while every
//! concurrent caller waits on the refresh guard and then receives that one result.

// self
use crate::{_prelude::*, runtime};

/// Time-bounded memoizer with at most one refresh in flight.
#[derive(Debug)]
pub struct SharedCachedValue<T> {
	state: Mutex<CacheState<T>>,
	refresh: AsyncMutex<()>,
}
impl<T> SharedCachedValue<T>
where
	T: Clone,
{
	/// Creates an empty cache; the first call always runs the supplier.
	pub fn new() -> Self {
		Self {
			state: Mutex::new(CacheState { value: None, computed_second: i64::MIN, generation: 0 }),
			refresh: AsyncMutex::new(()),
		}
	}

	/// Returns the cached value, computing it with `supplier` when the second has rolled over.
	pub async fn get<F, Fut>(&self, supplier: F) -> Result<T>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		self.get_or_refresh(|_| false, supplier).await
	}

	/// Like [`get`](Self::get), but `is_stale` may force a refresh within the same second.
	///
	/// Failed refreshes are not cached; the error is returned to the caller that ran the
	/// supplier and the next caller tries again.
	pub async fn get_or_refresh<S, F, Fut>(&self, is_stale: S, supplier: F) -> Result<T>
	where
		S: Fn(&T) -> bool,
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let observed = {
			let state = self.state.lock();

			if let Some(value) = state.fresh(runtime::now().unix_timestamp(), &is_stale) {
				return Ok(value);
			}

			state.generation
		};
		let _refresh = self.refresh.lock().await;

		{
			let state = self.state.lock();

			// Another caller refreshed while this one waited on the guard.
			if state.generation != observed
				&& let Some(value) = state.value.as_ref().filter(|value| !is_stale(value))
			{
				return Ok(value.clone());
			}
		}

		let value = supplier().await?;
		let mut state = self.state.lock();

		state.value = Some(value.clone());
		state.computed_second = runtime::now().unix_timestamp();
		state.generation = state.generation.wrapping_add(1);

		Ok(value)
	}

	/// Returns the last computed value without refreshing.
	pub fn peek(&self) -> Option<T> {
		self.state.lock().value.clone()
	}
}
impl<T> Default for SharedCachedValue<T>
where
	T: Clone,
{
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Debug)]
struct CacheState<T> {
	value: Option<T>,
	computed_second: i64,
	generation: u64,
}
impl<T> CacheState<T>
where
	T: Clone,
{
	fn fresh(&self, now_second: i64, is_stale: &impl Fn(&T) -> bool) -> Option<T> {
		if self.computed_second != now_second {
			return None;
		}

		self.value.as_ref().filter(|value| !is_stale(value)).cloned()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;

	#[tokio::test]
	async fn concurrent_callers_share_one_supplier_run() {
		let cache = Arc::new(SharedCachedValue::<u32>::new());
		let calls = Arc::new(AtomicU32::new(0));
		let tasks = (0..8)
			.map(|_| {
				let cache = cache.clone();
				let calls = calls.clone();

				tokio::spawn(async move {
					cache
						.get(|| async {
							tokio::time::sleep(std::time::Duration::from_millis(50)).await;

							Ok(calls.fetch_add(1, Ordering::SeqCst) + 100)
						})
						.await
				})
			})
			.collect::<Vec<_>>();
		let mut values = Vec::new();

		for task in tasks {
			values.push(task.await.expect("Cache task should not panic.").expect("Supplier succeeds."));
		}

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(values.iter().all(|value| *value == 100));
	}

	async fn sleep_into_next_second() {
		let nanos = u64::from(runtime::now().nanosecond());

		tokio::time::sleep(std::time::Duration::from_nanos(1_000_000_000 - nanos + 5_000_000)).await;
	}

	#[tokio::test]
	async fn crossing_a_second_boundary_refreshes_once() {
		let cache = Arc::new(SharedCachedValue::<u32>::new());
		let calls = Arc::new(AtomicU32::new(0));
		let supplier = |calls: Arc<AtomicU32>| async move {
			tokio::time::sleep(std::time::Duration::from_millis(20)).await;

			Ok(calls.fetch_add(1, Ordering::SeqCst))
		};

		sleep_into_next_second().await;

		assert_eq!(cache.get(|| supplier(calls.clone())).await.expect("First supplier succeeds."), 0);
		assert_eq!(cache.get(|| supplier(calls.clone())).await.expect("Cached read succeeds."), 0);
		assert_eq!(calls.load(Ordering::SeqCst), 1);

		sleep_into_next_second().await;

		let tasks = (0..6)
			.map(|_| {
				let cache = cache.clone();
				let calls = calls.clone();

				tokio::spawn(async move { cache.get(|| supplier(calls)).await })
			})
			.collect::<Vec<_>>();

		for task in tasks {
			let value =
				task.await.expect("Cache task should not panic.").expect("Supplier succeeds.");

			assert_eq!(value, 1);
		}

		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn stale_predicate_forces_refresh_within_the_second() {
		let cache = SharedCachedValue::<Option<u32>>::new();
		let first = cache.get(|| async { Ok(None) }).await.expect("First supplier succeeds.");
		let second = cache
			.get_or_refresh(Option::is_none, || async { Ok(Some(7)) })
			.await
			.expect("Forced supplier succeeds.");

		assert_eq!(first, None);
		assert_eq!(second, Some(7));
		assert_eq!(cache.peek(), Some(Some(7)));
	}

	#[tokio::test]
	async fn failed_refresh_is_not_cached() {
		let cache = SharedCachedValue::<u32>::new();
		let err = cache
			.get(|| async { Err(Error::custom(std::io::Error::other("probe failed"))) })
			.await
			.expect_err("Supplier failure should surface.");

		assert!(matches!(err, Error::Custom(_)));
		assert_eq!(cache.peek(), None);
		assert_eq!(cache.get(|| async { Ok(3) }).await.expect("Retry succeeds."), 3);
	}
}
