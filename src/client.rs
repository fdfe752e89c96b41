//! Request pipeline: credential resolution, rate-limit coordination, retries, and response
//! classification for every call.
//!
//! [`Client`] is cheap to clone; clones share one connector, one credential provider, and one
//! [`RateLimitCoordinator`]. Each call:
//!
//! 1. asks the coordinator for pre-flight clearance (which may block or probe `/rate_limit`),
//! 2. resolves the `Authorization` header from the provider,
//! 3. sends through the [`Connector`], retrying transient faults per [`RetryPolicy`],
//! 4. records any rate-limit headers, routes exhausted-limit responses to the configured
//!    [`RateLimitHandler`], and classifies the rest into [`Error::NotFound`] / [`Error::Http`].

pub mod builder;
pub mod paged;
pub mod request;
pub mod retry;

pub use builder::*;
pub use paged::*;
pub use request::*;
pub use retry::*;

// self
use crate::{
	_prelude::*,
	auth::AuthorizationProvider,
	error::ConfigError,
	http::{Connector, ConnectorRequest, ConnectorResponse, HeaderValue, Headers, header::AUTHORIZATION},
	obs::{self, OpKind},
	rate_limit::{
		LimitExceeded, ProbeFuture, RateLimitCoordinator, RateLimitHandler, RateLimitProbe,
		RateLimitSnapshot, RateLimitTarget,
	},
	runtime,
};

/// Shared handle to the request pipeline.
#[derive(Clone)]
pub struct Client {
	inner: Arc<ClientInner>,
}
impl Client {
	/// Starts a builder with default settings.
	pub fn builder() -> ClientBuilder {
		ClientBuilder::new()
	}

	/// API root every relative request is resolved against.
	pub fn endpoint(&self) -> &Url {
		&self.inner.endpoint
	}

	/// Retry configuration applied to connector faults.
	pub fn retry_policy(&self) -> &RetryPolicy {
		&self.inner.retry
	}

	/// Rate-limit coordinator shared by every clone of this client.
	pub fn rate_limit(&self) -> &RateLimitCoordinator {
		&self.inner.rate_limit
	}

	/// Executes `request` and returns the successful response.
	pub async fn execute(&self, request: Request) -> Result<ConnectorResponse> {
		obs::observe(OpKind::Request, "execute", self.execute_inner(request)).await
	}

	async fn execute_inner(&self, request: Request) -> Result<ConnectorResponse> {
		let inner = &self.inner;
		let url = request.resolve(&inner.endpoint)?;
		let target = request.target_for(&url, &inner.endpoint);
		let mut attempt = 0;

		loop {
			attempt += 1;

			inner.rate_limit.check_before_call(target, self).await?;

			let authorization = inner.provider.authorization_header(Some(&url)).await?;
			let outgoing = self.assemble(&request, &url, authorization)?;
			let response = match inner.connector.send(outgoing).await {
				Ok(response) => response,
				Err(e) if e.is_transient() && inner.retry.allows_retry(attempt) => {
					let delay = inner.retry.delay_for(attempt);

					obs::record_retry(&url, attempt, delay, &e);
					runtime::sleep(delay).await;

					continue;
				},
				Err(e) => return Err(Error::Connection { url, attempts: attempt, source: Box::new(e) }),
			};

			inner.rate_limit.observe_headers(&response.headers, target);

			if response.is_success() {
				return Ok(response);
			}

			let Some(exceeded) = LimitExceeded::detect(&response, target) else {
				return Err(classify(response));
			};
			let handler =
				if exceeded.is_secondary() { &inner.abuse_limit_handler } else { &inner.rate_limit_handler };

			handler.on_limit_exceeded(&exceeded).await?;

			if !inner.retry.allows_retry(attempt) {
				return Err(Error::Connection {
					url,
					attempts: attempt,
					source: Box::new(exceeded.to_error()),
				});
			}
		}
	}

	/// Executes `request` and decodes the JSON body into `T`.
	///
	/// Empty bodies decode as JSON `null`, so `()` and `Option<_>` work for 204 responses.
	pub async fn fetch_json<T>(&self, request: Request) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let response = self.execute(request).await?;

		decode_json(&response)
	}

	/// Serializes `body` as JSON onto `request`, executes it, and decodes the response.
	pub async fn send_json<B, T>(&self, request: Request, body: &B) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		self.fetch_json(request.with_json_body(body)?).await
	}

	/// Lazily paginated listing for `request`; nothing is fetched until iteration starts.
	pub fn paginate<T>(&self, request: Request) -> PagedList<T>
	where
		T: 'static + DeserializeOwned + Send,
	{
		PagedList::new(self.clone(), request)
	}

	/// Fetches `GET /rate_limit`; servers without rate limiting (404) yield an unknown snapshot.
	pub async fn probe_rate_limit(&self) -> Result<RateLimitSnapshot> {
		obs::observe(OpKind::RateLimitProbe, "probe", async {
			let request = Request::get("/rate_limit").with_rate_limit_target(RateLimitTarget::None);

			match self.execute(request).await {
				Ok(response) => RateLimitSnapshot::from_body(&response.body)
					.map_err(|source| Error::Decode { url: response.url.clone(), source }),
				Err(Error::NotFound { .. }) => Ok(RateLimitSnapshot::unknown()),
				Err(e) => Err(e),
			}
		})
		.await
	}

	fn assemble(
		&self,
		request: &Request,
		url: &Url,
		authorization: Option<String>,
	) -> Result<ConnectorRequest> {
		let mut headers = self.inner.default_headers.clone();

		if let Some(authorization) = authorization {
			let mut value = HeaderValue::try_from(authorization).map_err(ConfigError::invalid_header)?;

			value.set_sensitive(true);
			headers.insert(AUTHORIZATION, value);
		}

		headers.override_with(&request.headers);

		Ok(ConnectorRequest {
			method: request.method.clone(),
			url: url.clone(),
			headers,
			body: request.body.clone(),
		})
	}
}
impl RateLimitProbe for Client {
	fn probe(&self) -> ProbeFuture<'_> {
		Box::pin(self.probe_rate_limit())
	}
}
impl Debug for Client {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Client")
			.field("endpoint", &self.inner.endpoint.as_str())
			.field("default_headers", &self.inner.default_headers)
			.field("retry", &self.inner.retry)
			.field("rate_limit", &self.inner.rate_limit)
			.finish_non_exhaustive()
	}
}

pub(crate) struct ClientInner {
	endpoint: Url,
	default_headers: Headers,
	connector: Arc<dyn Connector>,
	provider: Arc<dyn AuthorizationProvider>,
	retry: RetryPolicy,
	rate_limit: RateLimitCoordinator,
	rate_limit_handler: Arc<dyn RateLimitHandler>,
	abuse_limit_handler: Arc<dyn RateLimitHandler>,
}

/// Decodes a JSON response body into `T` with a path-qualified error.
pub(crate) fn decode_json<T>(response: &ConnectorResponse) -> Result<T>
where
	T: DeserializeOwned,
{
	let body: &[u8] =
		if response.body.iter().all(u8::is_ascii_whitespace) { b"null" } else { &response.body };
	let de = &mut serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(de).map_err(|source| Error::Decode { url: response.url.clone(), source })
}

fn classify(response: ConnectorResponse) -> Error {
	let body = response.body_text();

	match response.status {
		404 => Error::NotFound { url: response.url, headers: response.headers, body },
		status => Error::Http { status, url: response.url, headers: response.headers, body },
	}
}
