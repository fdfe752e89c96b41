//! Validated construction of [`Client`] values.

// self
use crate::{
	_prelude::*,
	auth::{AnonymousProvider, AuthorizationProvider, StaticProvider},
	client::{Client, ClientInner, RetryPolicy},
	error::ConfigError,
	http::{
		Connector, HeaderValue, Headers,
		header::{ACCEPT, HeaderName, USER_AGENT},
	},
	rate_limit::{CheckerPolicy, HandlerPolicy, RateLimitChecker, RateLimitCoordinator, RateLimitHandler},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestConnector;

const API_VERSION_HEADER: &str = "x-github-api-version";

/// Builder for [`Client`].
///
/// Every setting has a default: the public API endpoint, anonymous access, the reqwest
/// connector, three attempts with 100 ms backoff, no pre-flight waiting, and waiting on both
/// primary and secondary limits.
#[derive(Clone)]
pub struct ClientBuilder {
	endpoint: String,
	user_agent: String,
	api_version: Option<String>,
	accept: String,
	connector: Option<Arc<dyn Connector>>,
	provider: Arc<dyn AuthorizationProvider>,
	retry: RetryPolicy,
	checker: Arc<dyn RateLimitChecker>,
	rate_limit_handler: Arc<dyn RateLimitHandler>,
	abuse_limit_handler: Arc<dyn RateLimitHandler>,
}
impl ClientBuilder {
	/// Public GitHub API root.
	pub const DEFAULT_ENDPOINT: &str = "https://api.github.com";
	/// REST API version requested through `X-GitHub-Api-Version`.
	pub const DEFAULT_API_VERSION: &str = "2022-11-28";
	/// Media type requested through `Accept`.
	pub const DEFAULT_ACCEPT: &str = "application/vnd.github+json";

	/// Creates a builder with default settings.
	pub fn new() -> Self {
		Self {
			endpoint: Self::DEFAULT_ENDPOINT.into(),
			user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).into(),
			api_version: Some(Self::DEFAULT_API_VERSION.into()),
			accept: Self::DEFAULT_ACCEPT.into(),
			connector: None,
			provider: Arc::new(AnonymousProvider),
			retry: RetryPolicy::default(),
			checker: Arc::new(CheckerPolicy::default()),
			rate_limit_handler: Arc::new(HandlerPolicy::Wait),
			abuse_limit_handler: Arc::new(HandlerPolicy::Wait),
		}
	}

	/// Reads the endpoint and credentials from the process environment.
	///
	/// Recognized variables: `GITHUB_ENDPOINT`, then the first of `GITHUB_OAUTH`, `GITHUB_JWT`,
	/// or `GITHUB_LOGIN` + `GITHUB_PASSWORD` that is set.
	pub fn from_env() -> Self {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Like [`from_env`](Self::from_env), reading variables through `lookup`.
	pub fn from_lookup<F>(lookup: F) -> Self
	where
		F: Fn(&str) -> Option<String>,
	{
		let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
		let mut builder = Self::new();

		if let Some(endpoint) = lookup("GITHUB_ENDPOINT") {
			builder = builder.endpoint(endpoint);
		}

		if let Some(token) = lookup("GITHUB_OAUTH") {
			builder.provider(StaticProvider::oauth(token))
		} else if let Some(jwt) = lookup("GITHUB_JWT") {
			builder.provider(StaticProvider::jwt(jwt))
		} else if let (Some(login), Some(password)) = (lookup("GITHUB_LOGIN"), lookup("GITHUB_PASSWORD")) {
			builder.provider(StaticProvider::basic(login, password))
		} else {
			builder
		}
	}

	/// API root, e.g. `https://ghe.example.com/api/v3` for Enterprise Server.
	pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.endpoint = endpoint.into();

		self
	}

	/// `User-Agent` sent with every request.
	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}

	/// `X-GitHub-Api-Version` sent with every request; `None` omits the header.
	pub fn api_version(mut self, api_version: Option<String>) -> Self {
		self.api_version = api_version;

		self
	}

	/// Default `Accept` header.
	pub fn accept(mut self, accept: impl Into<String>) -> Self {
		self.accept = accept.into();

		self
	}

	/// Transport used for every call.
	pub fn connector<C>(mut self, connector: C) -> Self
	where
		C: Connector,
	{
		self.connector = Some(Arc::new(connector));

		self
	}

	/// Shared transport used for every call.
	pub fn shared_connector(mut self, connector: Arc<dyn Connector>) -> Self {
		self.connector = Some(connector);

		self
	}

	/// Credential provider consulted before every attempt.
	pub fn provider<P>(mut self, provider: P) -> Self
	where
		P: 'static + AuthorizationProvider,
	{
		self.provider = Arc::new(provider);

		self
	}

	/// Shared credential provider consulted before every attempt.
	pub fn shared_provider(mut self, provider: Arc<dyn AuthorizationProvider>) -> Self {
		self.provider = provider;

		self
	}

	/// Retry bound and backoff for transient connector faults.
	pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Pre-flight rate-limit policy.
	pub fn rate_limit_checker<C>(mut self, checker: C) -> Self
	where
		C: 'static + RateLimitChecker,
	{
		self.checker = Arc::new(checker);

		self
	}

	/// Policy applied when the primary rate limit is reported as exhausted.
	pub fn rate_limit_handler<H>(mut self, handler: H) -> Self
	where
		H: 'static + RateLimitHandler,
	{
		self.rate_limit_handler = Arc::new(handler);

		self
	}

	/// Policy applied when the secondary (abuse) limit fires.
	pub fn abuse_limit_handler<H>(mut self, handler: H) -> Self
	where
		H: 'static + RateLimitHandler,
	{
		self.abuse_limit_handler = Arc::new(handler);

		self
	}

	/// Validates the configuration and produces the client.
	pub fn build(self) -> Result<Client> {
		let endpoint = Url::parse(self.endpoint.trim())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: self.endpoint.clone(), source })?;

		if !matches!(endpoint.scheme(), "http" | "https") {
			return Err(ConfigError::UnsupportedScheme { scheme: endpoint.scheme().into() }.into());
		}

		let connector = match self.connector {
			Some(connector) => connector,
			None => default_connector()?,
		};

		let value_of = |value: &str| HeaderValue::from_str(value).map_err(ConfigError::invalid_header);
		let mut default_headers = Headers::new()
			.with(ACCEPT, value_of(&self.accept)?)
			.with(USER_AGENT, value_of(&self.user_agent)?);

		if let Some(version) = &self.api_version {
			default_headers.insert(HeaderName::from_static(API_VERSION_HEADER), value_of(version)?);
		}

		Ok(Client {
			inner: Arc::new(ClientInner {
				endpoint,
				default_headers,
				connector,
				provider: self.provider,
				retry: self.retry,
				rate_limit: RateLimitCoordinator::new(self.checker),
				rate_limit_handler: self.rate_limit_handler,
				abuse_limit_handler: self.abuse_limit_handler,
			}),
		})
	}
}
impl Default for ClientBuilder {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for ClientBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientBuilder")
			.field("endpoint", &self.endpoint)
			.field("user_agent", &self.user_agent)
			.field("api_version", &self.api_version)
			.field("connector_set", &self.connector.is_some())
			.field("retry", &self.retry)
			.finish_non_exhaustive()
	}
}

#[cfg(feature = "reqwest")]
fn default_connector() -> Result<Arc<dyn Connector>> {
	let client = ReqwestClient::builder().build().map_err(ConfigError::from)?;

	Ok(Arc::new(ReqwestConnector::with_client(client)))
}

#[cfg(not(feature = "reqwest"))]
fn default_connector() -> Result<Arc<dyn Connector>> {
	Err(ConfigError::MissingConnector.into())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
		move |key| pairs.iter().find(|(name, _)| *name == key).map(|(_, value)| (*value).to_owned())
	}

	#[test]
	fn endpoints_must_be_http_urls() {
		let invalid = ClientBuilder::new().endpoint("not a url").build();
		let ftp = ClientBuilder::new().endpoint("ftp://ghe.example.com").build();

		assert!(matches!(invalid, Err(Error::Config(ConfigError::InvalidEndpoint { .. }))));
		assert!(matches!(ftp, Err(Error::Config(ConfigError::UnsupportedScheme { .. }))));
	}

	#[test]
	fn default_header_values_are_validated() {
		let agent = ClientBuilder::new().user_agent("bad\nagent").build();

		assert!(matches!(agent, Err(Error::Config(ConfigError::InvalidHeader { .. }))));
	}

	#[tokio::test]
	async fn environment_selects_the_first_configured_credential() {
		let oauth = ClientBuilder::from_lookup(lookup(&[
			("GITHUB_ENDPOINT", "https://ghe.example.com/api/v3"),
			("GITHUB_OAUTH", "ghp_token"),
			("GITHUB_JWT", "eyJ"),
		]));
		let basic = ClientBuilder::from_lookup(lookup(&[
			("GITHUB_OAUTH", " "),
			("GITHUB_LOGIN", "octocat"),
			("GITHUB_PASSWORD", "hunter2"),
		]));
		let anonymous = ClientBuilder::from_lookup(lookup(&[("GITHUB_LOGIN", "octocat")]));
		let header = |builder: &ClientBuilder| {
			let provider = builder.provider.clone();

			async move { provider.authorization_header(None).await.expect("Static providers never fail.") }
		};

		assert_eq!(oauth.endpoint, "https://ghe.example.com/api/v3");
		assert_eq!(header(&oauth).await, Some("token ghp_token".into()));
		assert_eq!(basic.endpoint, ClientBuilder::DEFAULT_ENDPOINT);
		assert_eq!(header(&basic).await, Some("Basic b2N0b2NhdDpodW50ZXIy".into()));
		assert_eq!(header(&anonymous).await, None);
	}
}
