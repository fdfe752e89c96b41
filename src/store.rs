//! Storage contracts and built-in store implementations for persisted user credentials.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::StoredCredential};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract used by providers that persist credentials between runs.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Persists or replaces the credential stored under `key`.
	fn save<'a>(&'a self, key: &'a str, credential: StoredCredential) -> StoreFuture<'a, ()>;

	/// Fetches the credential stored under `key`, if present.
	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<StoredCredential>>;

	/// Removes the credential stored under `key`, returning it when present.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<StoredCredential>>;
}
impl<S> CredentialStore for Arc<S>
where
	S: ?Sized + CredentialStore,
{
	fn save<'a>(&'a self, key: &'a str, credential: StoredCredential) -> StoreFuture<'a, ()> {
		(**self).save(key, credential)
	}

	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<StoredCredential>> {
		(**self).load(key)
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<StoredCredential>> {
		(**self).remove(key)
	}
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_pipeline_error_with_source() {
		let store_error = StoreError::Backend { message: "disk unavailable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Store(_)));
		assert!(error.to_string().contains("disk unavailable"));

		let source =
			StdError::source(&error).expect("Pipeline error should expose the store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}
}
