//! Wire calls against the OAuth device and token endpoints.

// crates.io
use url::form_urlencoded::Serializer;
// self
use crate::{
	_prelude::*,
	auth::{StoredCredential, TokenSecret},
	client::{Client, Request, decode_json},
	error::AuthError,
	http::{
		HeaderValue,
		header::{ACCEPT, CONTENT_TYPE},
	},
	rate_limit::RateLimitTarget,
	runtime,
};

const DEVICE_CODE_PATH: &str = "/login/device/code";
const TOKEN_PATH: &str = "/login/oauth/access_token";
const DEVICE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const MIN_INTERVAL_SECS: u64 = 1;

/// Code and verification address issued at the start of a device authorization.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DeviceCode {
	/// Code the client polls with; never shown to the user.
	pub device_code: TokenSecret,
	/// Code the user enters at [`verification_uri`](Self::verification_uri).
	pub user_code: String,
	/// Address where the user approves the request.
	pub verification_uri: String,
	/// Seconds until the codes expire.
	pub expires_in: u64,
	/// Minimum seconds between polls.
	#[serde(default = "DeviceCode::default_interval")]
	pub interval: u64,
}
impl DeviceCode {
	const DEFAULT_INTERVAL_SECS: u64 = 5;

	fn default_interval() -> u64 {
		Self::DEFAULT_INTERVAL_SECS
	}

	/// Polling interval as a duration, never below one second.
	pub fn poll_interval(&self) -> Duration {
		Duration::seconds(i64::try_from(self.interval.max(MIN_INTERVAL_SECS)).unwrap_or(i64::MAX))
	}

	/// Lifetime of the codes as a duration.
	pub fn lifetime(&self) -> Duration {
		Duration::seconds(i64::try_from(self.expires_in).unwrap_or(i64::MAX))
	}
}

/// Result of one poll of the token endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
	/// The user has not acted yet.
	Pending,
	/// The client polled too fast; carries the server's new interval when supplied.
	SlowDown(Option<Duration>),
	/// The user approved the request.
	Authorized(StoredCredential),
	/// The user declined the request.
	Denied,
	/// The device code expired.
	Expired,
}

/// Device-flow HTTP exchanges for one OAuth app.
#[derive(Clone, Debug)]
pub struct DeviceAuthorizer {
	web: Client,
	client_id: String,
	client_secret: Option<TokenSecret>,
	scopes: Vec<String>,
}
impl DeviceAuthorizer {
	/// Creates an authorizer issuing calls through `web`, a client rooted at the web host.
	pub fn new(web: Client, client_id: impl Into<String>) -> Self {
		Self { web, client_id: client_id.into(), client_secret: None, scopes: Vec::new() }
	}

	/// Client secret sent with refresh requests.
	pub fn with_client_secret(mut self, secret: TokenSecret) -> Self {
		self.client_secret = Some(secret);

		self
	}

	/// Scopes requested with the device code.
	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// OAuth client id.
	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	/// `POST /login/device/code`.
	pub async fn request_code(&self) -> Result<DeviceCode> {
		let scope = self.scopes.join(" ");
		let mut pairs = vec![("client_id", self.client_id.as_str())];

		if !scope.is_empty() {
			pairs.push(("scope", scope.as_str()));
		}

		let response = self.web.execute(form_request(DEVICE_CODE_PATH, &pairs)).await?;
		let raw: RawResponse = decode_json(&response)?;

		if let Some(error) = raw.error {
			return Err(AuthError::TokenEndpoint { error, description: raw.error_description }.into());
		}

		decode_json(&response)
	}

	/// `POST /login/oauth/access_token` with the device grant.
	pub async fn poll(&self, code: &DeviceCode) -> Result<PollOutcome> {
		let pairs = [
			("client_id", self.client_id.as_str()),
			("device_code", code.device_code.expose()),
			("grant_type", DEVICE_GRANT),
		];
		let response = self.web.execute(form_request(TOKEN_PATH, &pairs)).await?;

		classify(decode_json(&response)?)
	}

	/// `POST /login/oauth/access_token` with the refresh grant.
	pub async fn refresh(&self, refresh_token: &TokenSecret) -> Result<StoredCredential> {
		let mut pairs = vec![
			("client_id", self.client_id.as_str()),
			("grant_type", "refresh_token"),
			("refresh_token", refresh_token.expose()),
		];

		if let Some(secret) = &self.client_secret {
			pairs.push(("client_secret", secret.expose()));
		}

		let response = self.web.execute(form_request(TOKEN_PATH, &pairs)).await?;

		match classify(decode_json(&response)?)? {
			PollOutcome::Authorized(credential) => Ok(credential),
			outcome => Err(AuthError::InvalidTokenResponse {
				reason: format!("refresh answered with {outcome:?}"),
			}
			.into()),
		}
	}
}

/// Form-encoded `POST` that never consults the rate-limit coordinator.
///
/// The serializer is not `Send`, so it lives only inside this synchronous helper.
fn form_request(path: &str, pairs: &[(&str, &str)]) -> Request {
	let body = Serializer::new(String::new()).extend_pairs(pairs).finish();
	let mut request = Request::post(path)
		.with_header(ACCEPT, HeaderValue::from_static("application/json"))
		.with_header(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"))
		.with_rate_limit_target(RateLimitTarget::None);

	request.body = Some(body.into_bytes());

	request
}

#[derive(Deserialize)]
struct RawResponse {
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default)]
	token_type: Option<String>,
	#[serde(default)]
	scope: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	refresh_token_expires_in: Option<i64>,
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
	#[serde(default)]
	interval: Option<u64>,
}

fn classify(raw: RawResponse) -> Result<PollOutcome> {
	if let Some(error) = raw.error {
		return match error.as_str() {
			"authorization_pending" => Ok(PollOutcome::Pending),
			"slow_down" => Ok(PollOutcome::SlowDown(raw.interval.map(|secs| {
				Duration::seconds(i64::try_from(secs.max(MIN_INTERVAL_SECS)).unwrap_or(i64::MAX))
			}))),
			"expired_token" => Ok(PollOutcome::Expired),
			"access_denied" => Ok(PollOutcome::Denied),
			_ => Err(AuthError::TokenEndpoint { error, description: raw.error_description }.into()),
		};
	}

	let access_token = raw.access_token.filter(|token| !token.is_empty()).ok_or_else(|| {
		AuthError::InvalidTokenResponse { reason: "missing access_token".into() }
	})?;
	let now = runtime::now();
	let mut credential = StoredCredential::bearer(TokenSecret::new(access_token))
		.with_scopes(raw.scope.iter().flat_map(|scope| scope.split([',', ' '])).filter(|s| !s.is_empty()));

	if let Some(token_type) = raw.token_type {
		credential.token_type = token_type;
	}
	if let Some(expires_at) = raw.expires_in.and_then(|secs| expiry_after(now, secs)) {
		credential = credential.with_access_expires_at(expires_at);
	}
	if let Some(refresh_token) = raw.refresh_token {
		credential = credential.with_refresh_token(TokenSecret::new(refresh_token));
	}
	if let Some(expires_at) = raw.refresh_token_expires_in.and_then(|secs| expiry_after(now, secs)) {
		credential = credential.with_refresh_expires_at(expires_at);
	}

	Ok(PollOutcome::Authorized(credential))
}

/// Absolute expiry `secs` after `now`; lifetimes past the representable range never expire.
fn expiry_after(now: OffsetDateTime, secs: i64) -> Option<OffsetDateTime> {
	now.checked_add(Duration::seconds(secs))
}
