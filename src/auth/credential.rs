//! Cached authorization credentials and the persisted user-token record.

// self
use crate::{_prelude::*, auth::TokenSecret, runtime};

/// Authorization header value plus the instant it stops being accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
	/// Full `Authorization` header value (`token …`, `Bearer …`, `Basic …`).
	pub header: TokenSecret,
	/// Expiry advertised by the issuer; `None` for credentials that never expire locally.
	pub expires_at: Option<OffsetDateTime>,
}
impl Credential {
	/// Creates a credential that never expires locally.
	pub fn permanent(header: impl Into<String>) -> Self {
		Self { header: TokenSecret::new(header), expires_at: None }
	}

	/// Creates a credential expiring at `expires_at`.
	pub fn expiring(header: impl Into<String>, expires_at: OffsetDateTime) -> Self {
		Self { header: TokenSecret::new(header), expires_at: Some(expires_at) }
	}

	/// Returns `true` while the credential stays valid for at least `margin` past `instant`.
	pub fn is_usable_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		self.expires_at.is_none_or(|expires_at| instant + margin < expires_at)
	}

	/// [`is_usable_at`](Self::is_usable_at) against the current clock.
	pub fn is_usable(&self, margin: Duration) -> bool {
		self.is_usable_at(runtime::now(), margin)
	}
}

/// User-to-server token persisted by the device-flow provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
	/// Access token secret.
	pub access_token: TokenSecret,
	/// Refresh token secret, when the app has expiring user tokens enabled.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Access token expiry.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub access_expires_at: Option<OffsetDateTime>,
	/// Refresh token expiry.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub refresh_expires_at: Option<OffsetDateTime>,
	/// Granted scopes.
	#[serde(default)]
	pub scopes: Vec<String>,
	/// Token type reported by the server (normally `bearer`).
	pub token_type: String,
}
impl StoredCredential {
	/// Non-expiring bearer credential.
	pub fn bearer(access_token: TokenSecret) -> Self {
		Self {
			access_token,
			refresh_token: None,
			access_expires_at: None,
			refresh_expires_at: None,
			scopes: Vec::new(),
			token_type: "bearer".into(),
		}
	}

	/// Attaches a refresh token.
	pub fn with_refresh_token(mut self, refresh_token: TokenSecret) -> Self {
		self.refresh_token = Some(refresh_token);

		self
	}

	/// Sets the access token expiry.
	pub fn with_access_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.access_expires_at = Some(instant);

		self
	}

	/// Sets the refresh token expiry.
	pub fn with_refresh_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.refresh_expires_at = Some(instant);

		self
	}

	/// Sets the granted scopes.
	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Returns `true` while the access token stays valid for at least `margin` past `instant`.
	pub fn access_usable_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		self.access_expires_at.is_none_or(|expires_at| instant + margin < expires_at)
	}

	/// Returns `true` when a refresh token exists and has not expired at `instant`.
	pub fn can_refresh_at(&self, instant: OffsetDateTime) -> bool {
		self.refresh_token.is_some()
			&& self.refresh_expires_at.is_none_or(|expires_at| instant < expires_at)
	}

	/// Header credential derived from the access token.
	pub fn to_credential(&self) -> Credential {
		Credential {
			header: TokenSecret::new(format!("token {}", self.access_token.expose())),
			expires_at: self.access_expires_at,
		}
	}
}
impl Debug for StoredCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StoredCredential")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("access_expires_at", &self.access_expires_at)
			.field("refresh_expires_at", &self.refresh_expires_at)
			.field("scopes", &self.scopes)
			.field("token_type", &self.token_type)
			.finish()
	}
}
