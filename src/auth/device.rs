//! OAuth device authorization for user-to-server tokens, with persisted and refreshed results.

pub mod exchange;
pub mod state;

pub use exchange::*;
pub use state::*;

// self
use crate::{
	_prelude::*,
	auth::{AuthFuture, AuthorizationProvider, Credential, StoredCredential, TokenSecret},
	client::{Client, ClientBuilder, RetryPolicy},
	error::AuthError,
	http::Connector,
	obs::{self, OpKind},
	runtime,
	store::{CredentialStore, MemoryStore},
};

/// Boxed future returned by [`VerificationPrompt::present`].
pub type PromptFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a + Send>>;

/// Shows the user where to approve a device authorization.
pub trait VerificationPrompt
where
	Self: Send + Sync,
{
	/// Presents `code`; an error aborts the flow.
	fn present<'a>(&'a self, code: &'a DeviceCode) -> PromptFuture<'a>;
}
impl<P> VerificationPrompt for Arc<P>
where
	P: ?Sized + VerificationPrompt,
{
	fn present<'a>(&'a self, code: &'a DeviceCode) -> PromptFuture<'a> {
		(**self).present(code)
	}
}

/// Prompt that writes the verification address and user code to standard error.
#[derive(Clone, Copy, Debug, Default)]
pub struct StderrPrompt;
impl VerificationPrompt for StderrPrompt {
	fn present<'a>(&'a self, code: &'a DeviceCode) -> PromptFuture<'a> {
		Box::pin(async move {
			eprintln!("Open {} and enter code {}", code.verification_uri, code.user_code);

			Ok(())
		})
	}
}

/// User-token provider backed by the device flow.
///
/// The stored credential is reused until it nears expiry, then refreshed with its refresh token;
/// a fresh device authorization runs only when neither works. Concurrent callers share one
/// refresh or authorization.
pub struct DeviceFlowProvider {
	authorizer: DeviceAuthorizer,
	prompt: Arc<dyn VerificationPrompt>,
	store: Arc<dyn CredentialStore>,
	store_key: String,
	refresh_margin: Duration,
	gate: AsyncMutex<()>,
}
impl DeviceFlowProvider {
	/// Default window before expiry in which the stored token is refreshed.
	pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::minutes(5);

	/// Starts a builder for the OAuth app `client_id`.
	pub fn builder(client_id: impl Into<String>) -> DeviceFlowProviderBuilder {
		DeviceFlowProviderBuilder::new(client_id)
	}

	/// Key the credential is persisted under.
	pub fn store_key(&self) -> &str {
		&self.store_key
	}

	/// Fresh state machine sharing this provider's endpoints and prompt.
	pub fn flow(&self) -> DeviceFlow<'_> {
		DeviceFlow::new(&self.authorizer, &*self.prompt)
	}

	/// Returns a usable credential, refreshing or authorizing when the stored one cannot be used.
	pub async fn credential(&self) -> Result<Credential> {
		let _gate = self.gate.lock().await;
		let now = runtime::now();
		let stored = self.store.load(&self.store_key).await?;

		if let Some(stored) = stored {
			if stored.access_usable_at(now, self.refresh_margin) {
				return Ok(stored.to_credential());
			}
			if stored.can_refresh_at(now)
				&& let Some(refreshed) = self.try_refresh(&stored).await?
			{
				return self.persist(OpKind::DeviceRefresh, refreshed).await;
			}
		}

		let authorized = obs::observe(OpKind::DeviceFlow, "authorize", self.flow().run()).await?;

		self.persist(OpKind::DeviceFlow, authorized).await
	}

	/// Drops the persisted credential so the next call authorizes again.
	pub async fn sign_out(&self) -> Result<Option<StoredCredential>> {
		let _gate = self.gate.lock().await;

		Ok(self.store.remove(&self.store_key).await?)
	}

	/// Refreshes `stored`; `Ok(None)` means the refresh token was rejected and a new
	/// authorization is needed.
	async fn try_refresh(&self, stored: &StoredCredential) -> Result<Option<StoredCredential>> {
		let Some(refresh_token) = &stored.refresh_token else {
			return Ok(None);
		};

		match obs::observe(OpKind::DeviceRefresh, "refresh", self.authorizer.refresh(refresh_token)).await {
			Ok(mut refreshed) => {
				if refreshed.refresh_token.is_none() {
					refreshed.refresh_token = Some(refresh_token.clone());
					refreshed.refresh_expires_at = stored.refresh_expires_at;
				}

				Ok(Some(refreshed))
			},
			Err(Error::Auth(AuthError::TokenEndpoint { error, .. })) if error == "bad_refresh_token" => {
				self.store.remove(&self.store_key).await?;

				Ok(None)
			},
			Err(e) => Err(e),
		}
	}

	async fn persist(&self, kind: OpKind, stored: StoredCredential) -> Result<Credential> {
		let credential = stored.to_credential();

		self.store.save(&self.store_key, stored).await?;
		obs::record_credential_refresh(kind, &credential.header.fingerprint(), credential.expires_at);

		Ok(credential)
	}
}
impl AuthorizationProvider for DeviceFlowProvider {
	fn authorization_header<'a>(&'a self, _target: Option<&'a Url>) -> AuthFuture<'a> {
		Box::pin(async move { Ok(Some(self.credential().await?.header.expose().to_owned())) })
	}
}
impl Debug for DeviceFlowProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DeviceFlowProvider")
			.field("client_id", &self.authorizer.client_id())
			.field("store_key", &self.store_key)
			.field("refresh_margin", &self.refresh_margin)
			.finish_non_exhaustive()
	}
}

/// Builder for [`DeviceFlowProvider`].
pub struct DeviceFlowProviderBuilder {
	client_id: String,
	client_secret: Option<TokenSecret>,
	scopes: Vec<String>,
	web_endpoint: String,
	connector: Option<Arc<dyn Connector>>,
	retry: RetryPolicy,
	prompt: Arc<dyn VerificationPrompt>,
	store: Arc<dyn CredentialStore>,
	store_key: Option<String>,
	refresh_margin: Duration,
}
impl DeviceFlowProviderBuilder {
	/// Public GitHub web host serving the device and token endpoints.
	pub const DEFAULT_WEB_ENDPOINT: &str = "https://github.com";

	/// Creates a builder with an in-memory store and the standard-error prompt.
	pub fn new(client_id: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: None,
			scopes: Vec::new(),
			web_endpoint: Self::DEFAULT_WEB_ENDPOINT.into(),
			connector: None,
			retry: RetryPolicy::default(),
			prompt: Arc::new(StderrPrompt),
			store: Arc::new(MemoryStore::default()),
			store_key: None,
			refresh_margin: DeviceFlowProvider::DEFAULT_REFRESH_MARGIN,
		}
	}

	/// Client secret sent when refreshing tokens.
	pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(TokenSecret::new(secret));

		self
	}

	/// Scopes requested for OAuth apps; GitHub Apps ignore them.
	pub fn scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Web host root, e.g. `https://ghe.example.com` for Enterprise Server.
	pub fn web_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.web_endpoint = endpoint.into();

		self
	}

	/// Transport for the device and token endpoints.
	pub fn connector<C>(mut self, connector: C) -> Self
	where
		C: Connector,
	{
		self.connector = Some(Arc::new(connector));

		self
	}

	/// Shared transport for the device and token endpoints.
	pub fn shared_connector(mut self, connector: Arc<dyn Connector>) -> Self {
		self.connector = Some(connector);

		self
	}

	/// Retry policy for the device and token endpoints.
	pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Presents the user code.
	pub fn prompt<P>(mut self, prompt: P) -> Self
	where
		P: 'static + VerificationPrompt,
	{
		self.prompt = Arc::new(prompt);

		self
	}

	/// Persists credentials between runs.
	pub fn store<S>(mut self, store: S) -> Self
	where
		S: 'static + CredentialStore,
	{
		self.store = Arc::new(store);

		self
	}

	/// Key the credential is persisted under; defaults to the client id.
	pub fn store_key(mut self, key: impl Into<String>) -> Self {
		self.store_key = Some(key.into());

		self
	}

	/// Window before expiry in which the stored token is refreshed.
	pub fn refresh_margin(mut self, margin: Duration) -> Self {
		self.refresh_margin = margin.max(Duration::ZERO);

		self
	}

	/// Validates the configuration and produces the provider.
	pub fn build(self) -> Result<DeviceFlowProvider> {
		let mut web = ClientBuilder::new()
			.endpoint(self.web_endpoint)
			.api_version(None)
			.accept("application/json")
			.retry_policy(self.retry);

		if let Some(connector) = self.connector {
			web = web.shared_connector(connector);
		}

		let web: Client = web.build()?;
		let mut authorizer = DeviceAuthorizer::new(web, &self.client_id).with_scopes(self.scopes);

		if let Some(secret) = self.client_secret {
			authorizer = authorizer.with_client_secret(secret);
		}

		Ok(DeviceFlowProvider {
			authorizer,
			prompt: self.prompt,
			store: self.store,
			store_key: self.store_key.unwrap_or(self.client_id),
			refresh_margin: self.refresh_margin,
			gate: AsyncMutex::new(()),
		})
	}
}
impl Debug for DeviceFlowProviderBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DeviceFlowProviderBuilder")
			.field("client_id", &self.client_id)
			.field("scopes", &self.scopes)
			.field("web_endpoint", &self.web_endpoint)
			.field("store_key", &self.store_key)
			.finish_non_exhaustive()
	}
}
