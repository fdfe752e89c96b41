//! Thread-safe in-memory [`CredentialStore`] for tests and short-lived processes.

// self
use crate::{
	_prelude::*,
	auth::StoredCredential,
	store::{CredentialStore, StoreFuture},
};

/// Keeps credentials in-process; clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<HashMap<String, StoredCredential>>>);
impl MemoryStore {
	/// Number of stored credentials.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl CredentialStore for MemoryStore {
	fn save<'a>(&'a self, key: &'a str, credential: StoredCredential) -> StoreFuture<'a, ()> {
		self.0.write().insert(key.to_owned(), credential);

		Box::pin(async move { Ok(()) })
	}

	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<StoredCredential>> {
		let credential = self.0.read().get(key).cloned();

		Box::pin(async move { Ok(credential) })
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<StoredCredential>> {
		let credential = self.0.write().remove(key);

		Box::pin(async move { Ok(credential) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::TokenSecret;

	#[tokio::test]
	async fn clones_share_saved_credentials() {
		let store = MemoryStore::default();
		let clone = store.clone();

		store
			.save("client-1", StoredCredential::bearer(TokenSecret::new("gho_abc")))
			.await
			.expect("Save should succeed.");

		let loaded = clone.load("client-1").await.expect("Load should succeed.");

		assert_eq!(loaded.map(|credential| credential.access_token), Some(TokenSecret::new("gho_abc")));
		assert!(clone.remove("client-1").await.expect("Remove should succeed.").is_some());
		assert!(store.is_empty());
	}
}
