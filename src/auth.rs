//! Authorization providers and the credentials they produce.
//!
//! Every provider implements [`AuthorizationProvider`]: the pipeline asks for a header before
//! each attempt and the provider answers from its cache, refreshing single-flight when the cached
//! credential is about to expire. Providers compose by holding an inner provider (or a client
//! authenticated with one) instead of sharing a base type.

pub mod app;
pub mod credential;
pub mod device;
pub mod fixed;
pub mod installation;
pub mod secret;

pub use app::*;
pub use credential::*;
pub use device::*;
pub use fixed::*;
pub use installation::*;
pub use secret::*;

// self
use crate::_prelude::*;

/// Boxed future returned by [`AuthorizationProvider::authorization_header`].
pub type AuthFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<String>>> + 'a + Send>>;

/// Produces the `Authorization` header attached to outgoing requests.
pub trait AuthorizationProvider
where
	Self: Send + Sync,
{
	/// Header value for a request to `target`, or `None` for anonymous requests.
	///
	/// Providers backed by an exchange call surface that call's failure unchanged.
	fn authorization_header<'a>(&'a self, target: Option<&'a Url>) -> AuthFuture<'a>;
}
impl<P> AuthorizationProvider for Arc<P>
where
	P: ?Sized + AuthorizationProvider,
{
	fn authorization_header<'a>(&'a self, target: Option<&'a Url>) -> AuthFuture<'a> {
		(**self).authorization_header(target)
	}
}
