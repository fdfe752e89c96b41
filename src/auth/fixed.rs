//! Providers whose header never changes.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{
	_prelude::*,
	auth::{AuthFuture, AuthorizationProvider, TokenSecret},
};

/// Sends every request without credentials.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnonymousProvider;
impl AuthorizationProvider for AnonymousProvider {
	fn authorization_header<'a>(&'a self, _target: Option<&'a Url>) -> AuthFuture<'a> {
		Box::pin(async { Ok(None) })
	}
}

/// Attaches one fixed header value to every request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticProvider(TokenSecret);
impl StaticProvider {
	/// Uses `header` verbatim.
	pub fn new(header: impl Into<String>) -> Self {
		Self(TokenSecret::new(header))
	}

	/// OAuth or personal access token (`token …`).
	pub fn oauth(token: impl AsRef<str>) -> Self {
		Self::new(format!("token {}", token.as_ref()))
	}

	/// Pre-signed app assertion (`Bearer …`).
	pub fn jwt(assertion: impl AsRef<str>) -> Self {
		Self::new(format!("Bearer {}", assertion.as_ref()))
	}

	/// Installation access token obtained elsewhere (`token …`).
	pub fn installation_token(token: impl AsRef<str>) -> Self {
		Self::oauth(token)
	}

	/// HTTP basic login/password (`Basic …`).
	pub fn basic(login: impl AsRef<str>, password: impl AsRef<str>) -> Self {
		let raw = format!("{}:{}", login.as_ref(), password.as_ref());

		Self::new(format!("Basic {}", STANDARD.encode(raw)))
	}

	/// The wrapped header value.
	pub fn header(&self) -> &TokenSecret {
		&self.0
	}
}
impl AuthorizationProvider for StaticProvider {
	fn authorization_header<'a>(&'a self, _target: Option<&'a Url>) -> AuthFuture<'a> {
		Box::pin(async move { Ok(Some(self.0.expose().to_owned())) })
	}
}
