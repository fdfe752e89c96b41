//! Connector primitives: the pipeline's only dependency on an HTTP stack.
//!
//! The module exposes [`Connector`] alongside the request/response values it exchanges so
//! downstream crates can plug in pooling, caching, or fake transports without touching the
//! pipeline. Connectors report I/O-level faults as [`ConnectorError`]; HTTP statuses, including
//! errors, are returned as ordinary [`ConnectorResponse`] values and classified by the client.

// crates.io
pub use http::{
	HeaderMap, HeaderName, HeaderValue, Method,
	header::{self, AsHeaderName},
};
use http::header::{AUTHORIZATION, LINK, RETRY_AFTER};
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::ConfigError};

/// Boxed future returned by [`Connector::send`].
pub type ConnectorFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ConnectorResponse, ConnectorError>> + 'a + Send>>;

/// Transport capability used for every outbound call.
///
/// Implementations must be `Send + Sync + 'static` so one connector can be shared by every
/// clone of a client. Each call is independent: retries invoke [`send`](Connector::send) again,
/// which lets pooling connectors re-resolve their connection.
pub trait Connector
where
	Self: 'static + Send + Sync,
{
	/// Sends one request and returns the full response.
	fn send(&self, request: ConnectorRequest) -> ConnectorFuture<'_>;
}

/// I/O-level failure reported by a [`Connector`].
#[derive(Debug, ThisError)]
pub enum ConnectorError {
	/// Network failure (DNS, TCP, TLS, reset connection).
	#[error("Network error occurred while contacting the server.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request timed out in the transport.
	#[error("Request timed out.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Raw I/O failure.
	#[error("I/O error occurred while contacting the server.")]
	Io(#[from] std::io::Error),
	/// The transport refused to build the request; retrying cannot help.
	#[error("Request could not be constructed by the transport.")]
	Request {
		/// Transport-specific builder error.
		#[source]
		source: BoxError,
	},
}
impl ConnectorError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Whether another attempt may succeed.
	pub fn is_transient(&self) -> bool {
		!matches!(self, Self::Request { .. })
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConnectorError {
	fn from(e: ReqwestError) -> Self {
		if e.is_builder() {
			Self::Request { source: Box::new(e) }
		} else if e.is_timeout() {
			Self::Timeout { source: Box::new(e) }
		} else {
			Self::network(e)
		}
	}
}

/// Header map wrapper whose `Debug` output redacts credentials.
///
/// Lookups return values as `&str`; values that are not visible ASCII read as absent but stay
/// in the map and are forwarded untouched.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers(HeaderMap);
impl Headers {
	/// Creates an empty header set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds headers from textual pairs, rejecting invalid names or values.
	pub fn try_from_pairs<I, K, V>(pairs: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: AsRef<str>,
	{
		let mut map = HeaderMap::new();

		for (name, value) in pairs {
			let name = HeaderName::from_bytes(name.as_ref().as_bytes()).map_err(ConfigError::invalid_header)?;
			let value = HeaderValue::from_str(value.as_ref()).map_err(ConfigError::invalid_header)?;

			map.append(name, value);
		}

		Ok(Self(map))
	}

	/// Replaces every value stored under `name`.
	pub fn insert(&mut self, name: HeaderName, value: HeaderValue) {
		self.0.insert(name, value);
	}

	/// Builder-style variant of [`insert`](Self::insert).
	pub fn with(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.insert(name, value);

		self
	}

	/// Copies `overrides` in, replacing every existing value of each name it carries.
	pub fn override_with(&mut self, overrides: &Headers) {
		self.0.extend(overrides.0.clone());
	}

	/// First value stored under `name`, when it is visible ASCII.
	pub fn get<K>(&self, name: K) -> Option<&str>
	where
		K: AsHeaderName,
	{
		self.0.get(name)?.to_str().ok()
	}

	/// Every textual value stored under `name`, in arrival order.
	pub fn get_all<K>(&self, name: K) -> impl Iterator<Item = &str>
	where
		K: AsHeaderName,
	{
		self.0.get_all(name).into_iter().filter_map(|value| value.to_str().ok())
	}

	/// Returns `true` when `name` is present.
	pub fn contains<K>(&self, name: K) -> bool
	where
		K: AsHeaderName,
	{
		self.0.contains_key(name)
	}

	/// Parses `name` as an unsigned integer.
	pub fn get_u64<K>(&self, name: K) -> Option<u64>
	where
		K: AsHeaderName,
	{
		self.get(name)?.trim().parse().ok()
	}

	/// Number of stored values.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no header is stored.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Underlying map.
	pub fn as_map(&self) -> &HeaderMap {
		&self.0
	}

	/// Mutable access to the underlying map.
	pub fn as_map_mut(&mut self) -> &mut HeaderMap {
		&mut self.0
	}

	/// Unwraps the underlying map.
	pub fn into_map(self) -> HeaderMap {
		self.0
	}

	/// `Retry-After` hint expressed as a relative duration.
	pub fn retry_after(&self) -> Option<Duration> {
		let raw = self.get(RETRY_AFTER)?.trim();

		if let Ok(secs) = raw.parse::<u64>() {
			return Some(Duration::seconds(i64::try_from(secs).ok()?));
		}
		if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
			let delta = moment - OffsetDateTime::now_utc();

			if delta.is_positive() {
				return Some(delta);
			}
		}

		None
	}

	/// Target of the `Link: <…>; rel="next"` relation, if any.
	pub fn next_link(&self) -> Option<Url> {
		self.get_all(LINK).flat_map(|value| value.split(',')).find_map(|entry| {
			let mut parts = entry.split(';');
			let target = parts.next()?.trim();
			let is_next = parts.any(|param| {
				let param = param.trim();

				param == "rel=\"next\"" || param == "rel=next"
			});

			if !is_next {
				return None;
			}

			target.strip_prefix('<')?.strip_suffix('>').and_then(|raw| Url::parse(raw).ok())
		})
	}
}
impl From<HeaderMap> for Headers {
	fn from(map: HeaderMap) -> Self {
		Self(map)
	}
}
impl From<Headers> for HeaderMap {
	fn from(headers: Headers) -> Self {
		headers.0
	}
}
impl Debug for Headers {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_map()
			.entries(self.0.iter().map(|(name, value)| {
				let shown = if *name == AUTHORIZATION || value.is_sensitive() {
					"<redacted>"
				} else {
					value.to_str().unwrap_or("<opaque>")
				};

				(name.as_str(), shown)
			}))
			.finish()
	}
}

/// Fully assembled outbound request handed to a [`Connector`].
#[derive(Clone, Debug)]
pub struct ConnectorRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL including query parameters.
	pub url: Url,
	/// Request headers, including any authorization header.
	pub headers: Headers,
	/// Raw request body.
	pub body: Option<Vec<u8>>,
}

/// Response returned by a [`Connector`].
#[derive(Clone, Debug)]
pub struct ConnectorResponse {
	/// HTTP status code.
	pub status: u16,
	/// Final URL after any transport-level redirects.
	pub url: Url,
	/// Response headers.
	pub headers: Headers,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ConnectorResponse {
	/// Returns `true` for 2xx statuses and 304 (served from a caching connector).
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status) || self.status == 304
	}

	/// Body decoded lossily as UTF-8.
	pub fn body_text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Status, URL, and headers without the body.
	pub fn metadata(&self) -> ResponseMetadata {
		ResponseMetadata { status: self.status, url: self.url.clone(), headers: self.headers.clone() }
	}
}

/// Status line and headers of a response, kept after the body has been consumed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseMetadata {
	/// HTTP status code.
	pub status: u16,
	/// URL that produced the response.
	pub url: Url,
	/// Response headers.
	pub headers: Headers,
}

/// Default [`Connector`] backed by a shared [`ReqwestClient`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestConnector(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestConnector {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	fn build(&self, request: ConnectorRequest) -> reqwest::Request {
		let mut outgoing = reqwest::Request::new(request.method, request.url);

		*outgoing.headers_mut() = request.headers.into_map();

		if let Some(body) = request.body {
			*outgoing.body_mut() = Some(body.into());
		}

		outgoing
	}
}
#[cfg(feature = "reqwest")]
impl Connector for ReqwestConnector {
	fn send(&self, request: ConnectorRequest) -> ConnectorFuture<'_> {
		Box::pin(async move {
			let response = self.0.execute(self.build(request)).await?;
			let status = response.status().as_u16();
			let url = response.url().clone();
			let headers = Headers::from(response.headers().to_owned());
			let body = response.bytes().await?.to_vec();

			Ok(ConnectorResponse { status, url, headers, body })
		})
	}
}
