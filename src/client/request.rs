//! Request values assembled by callers and resolved by the client.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	http::{HeaderName, HeaderValue, Headers, Method, header::CONTENT_TYPE},
	rate_limit::RateLimitTarget,
};

/// One logical API call; resolved against the client's endpoint on every attempt.
#[derive(Clone, Debug)]
pub struct Request {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the API root (`/repos/o/r`) or an absolute URL.
	pub target: String,
	/// Query parameters appended in order.
	pub query: Vec<(String, String)>,
	/// Extra headers; they override the client defaults with the same name.
	pub headers: Headers,
	/// Raw body.
	pub body: Option<Vec<u8>>,
	/// Explicit rate-limit target; derived from the path when unset.
	pub rate_limit_target: Option<RateLimitTarget>,
	invalid_header: Option<Arc<::http::Error>>,
}
impl Request {
	/// Creates a request for `target`.
	pub fn new(method: Method, target: impl Into<String>) -> Self {
		Self {
			method,
			target: target.into(),
			query: Vec::new(),
			headers: Headers::default(),
			body: None,
			rate_limit_target: None,
			invalid_header: None,
		}
	}

	/// `GET` request.
	pub fn get(target: impl Into<String>) -> Self {
		Self::new(Method::GET, target)
	}

	/// `POST` request.
	pub fn post(target: impl Into<String>) -> Self {
		Self::new(Method::POST, target)
	}

	/// `PUT` request.
	pub fn put(target: impl Into<String>) -> Self {
		Self::new(Method::PUT, target)
	}

	/// `PATCH` request.
	pub fn patch(target: impl Into<String>) -> Self {
		Self::new(Method::PATCH, target)
	}

	/// `DELETE` request.
	pub fn delete(target: impl Into<String>) -> Self {
		Self::new(Method::DELETE, target)
	}

	/// Appends a query parameter.
	pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
		self.query.push((name.into(), value.to_string()));

		self
	}

	/// Sets a header, replacing earlier values with the same name.
	///
	/// An invalid name or value is reported when the request is resolved.
	pub fn with_header<K, V>(mut self, name: K, value: V) -> Self
	where
		K: TryInto<HeaderName>,
		<K as TryInto<HeaderName>>::Error: Into<::http::Error>,
		V: TryInto<HeaderValue>,
		<V as TryInto<HeaderValue>>::Error: Into<::http::Error>,
	{
		let pair = name
			.try_into()
			.map_err(Into::into)
			.and_then(|name| value.try_into().map(|value| (name, value)).map_err(Into::into));

		match pair {
			Ok((name, value)) => self.headers.insert(name, value),
			Err(e) => {
				self.invalid_header.get_or_insert_with(|| Arc::new(e));
			},
		}

		self
	}

	/// Serializes `body` as JSON and sets the matching content type.
	pub fn with_json_body<B>(mut self, body: &B) -> Result<Self>
	where
		B: ?Sized + Serialize,
	{
		let bytes = serde_json::to_vec(body).map_err(ConfigError::from)?;

		self.body = Some(bytes);
		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

		Ok(self)
	}

	/// Pins the rate-limit target instead of deriving it from the path.
	pub fn with_rate_limit_target(mut self, target: RateLimitTarget) -> Self {
		self.rate_limit_target = Some(target);

		self
	}

	/// Resolves the absolute URL against `endpoint`, appending query parameters.
	pub fn resolve(&self, endpoint: &Url) -> Result<Url> {
		if let Some(e) = &self.invalid_header {
			return Err(ConfigError::invalid_header(Arc::clone(e)).into());
		}

		let invalid =
			|source| ConfigError::InvalidRequestUrl { target: self.target.clone(), source };
		let mut url = if is_absolute(&self.target) {
			Url::parse(&self.target).map_err(invalid)?
		} else {
			let base = endpoint.as_str().trim_end_matches('/');
			let path = self.target.trim_start_matches('/');

			Url::parse(&format!("{base}/{path}")).map_err(invalid)?
		};

		if !self.query.is_empty() {
			url.query_pairs_mut().extend_pairs(self.query.iter());
		}

		Ok(url)
	}

	/// Rate-limit target for this request once resolved to `url`.
	pub fn target_for(&self, url: &Url, endpoint: &Url) -> RateLimitTarget {
		self.rate_limit_target.unwrap_or_else(|| RateLimitTarget::from_path(api_path(url, endpoint)))
	}
}

fn is_absolute(target: &str) -> bool {
	target.starts_with("https://") || target.starts_with("http://")
}

/// Path of `url` relative to the API root, so Enterprise prefixes such as `/api/v3` are ignored.
fn api_path<'a>(url: &'a Url, endpoint: &Url) -> &'a str {
	let path = url.path();

	if url.origin() != endpoint.origin() {
		return path;
	}

	let prefix = endpoint.path().trim_end_matches('/');

	match path.strip_prefix(prefix) {
		Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
		_ => path,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn endpoint(raw: &str) -> Url {
		Url::parse(raw).expect("Fixture endpoint should parse.")
	}

	#[test]
	fn relative_targets_join_enterprise_prefixes() {
		let endpoint = endpoint("https://ghe.example.com/api/v3");
		let request = Request::get("/search/code").with_query("q", "fn main").with_query("per_page", 50);
		let url = request.resolve(&endpoint).expect("Request should resolve.");

		assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/search/code?q=fn+main&per_page=50");
		assert_eq!(request.target_for(&url, &endpoint), RateLimitTarget::Search);
	}

	#[test]
	fn absolute_targets_are_kept() {
		let endpoint = endpoint("https://api.github.com");
		let request = Request::get("https://api.github.com/rate_limit");
		let url = request.resolve(&endpoint).expect("Request should resolve.");

		assert_eq!(url.as_str(), "https://api.github.com/rate_limit");
		assert_eq!(request.target_for(&url, &endpoint), RateLimitTarget::None);
		assert_eq!(
			Request::get("/graphql")
				.with_rate_limit_target(RateLimitTarget::Core)
				.target_for(&url, &endpoint),
			RateLimitTarget::Core,
		);
	}

	#[test]
	fn json_bodies_set_the_content_type() {
		let request = Request::post("/repos/o/r/issues")
			.with_json_body(&serde_json::json!({ "title": "Bug" }))
			.expect("Body should serialize.");

		assert_eq!(request.headers.get("content-type"), Some("application/json"));
		assert_eq!(request.body.as_deref(), Some(br#"{"title":"Bug"}"#.as_slice()));
	}

	#[test]
	fn invalid_headers_surface_on_resolve() {
		let endpoint = endpoint("https://api.github.com");
		let request = Request::get("/user").with_header("x-trace", "line\nbreak");

		assert!(request.headers.is_empty());
		assert!(matches!(
			request.resolve(&endpoint),
			Err(Error::Config(ConfigError::InvalidHeader { .. }))
		));
	}
}
