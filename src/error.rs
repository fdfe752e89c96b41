//! Pipeline-level error types shared across the client, providers, and pagination.

// self
use crate::{_prelude::*, http::Headers};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error used where the concrete cause is caller-defined.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Connector-level fault that persisted through every retry.
	#[error("Request to {url} failed after {attempts} attempt(s).")]
	Connection {
		/// Target URL of the failing request.
		url: Url,
		/// Number of attempts performed before giving up.
		attempts: u32,
		/// Cause reported by the final attempt.
		#[source]
		source: BoxError,
	},
	/// Non-success HTTP status other than 404.
	#[error("GitHub returned HTTP {status} for {url}.")]
	Http {
		/// HTTP status code.
		status: u16,
		/// URL that produced the response.
		url: Url,
		/// Response headers.
		headers: Headers,
		/// Response body decoded lossily as UTF-8.
		body: String,
	},
	/// HTTP 404; headers are kept because some callers branch on scope headers.
	#[error("GitHub returned 404 for {url}.")]
	NotFound {
		/// URL that produced the response.
		url: Url,
		/// Response headers.
		headers: Headers,
		/// Response body decoded lossily as UTF-8.
		body: String,
	},
	/// Rate limit exhausted and the active handler refused to wait.
	#[error("Rate limit for `{resource}` exceeded.")]
	RateLimitExceeded {
		/// Resource category whose budget ran out.
		resource: String,
		/// Advertised reset instant, when known.
		reset_at: Option<OffsetDateTime>,
		/// Whether the secondary (abuse) limit fired rather than the primary budget.
		secondary: bool,
	},
	/// Local credential failure.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Iteration requested past the final element.
	#[error("No further elements are available.")]
	NoSuchElement,
	/// Final pagination response requested before iteration finished.
	#[error("The final response is only available once iteration has completed.")]
	IterationIncomplete,
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Response body did not match the expected shape.
	#[error("Response body from {url} could not be decoded.")]
	Decode {
		/// URL that produced the body.
		url: Url,
		/// Path-qualified decoding failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Credential persistence failure.
	#[error("{0}")]
	Store(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// I/O failure surfaced from caller-supplied code.
	///
	/// Pagination unwraps I/O causes nested in [`Error::Custom`] into this variant.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// Failure raised by caller-supplied code (page sources, resolvers, input managers).
	#[error(transparent)]
	Custom(BoxError),
}
impl Error {
	/// Wraps an arbitrary error raised by caller-supplied code.
	pub fn custom(src: impl Into<BoxError>) -> Self {
		Self::Custom(src.into())
	}

	/// HTTP status carried by the error, when it originated from a response.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Http { status, .. } => Some(*status),
			Self::NotFound { .. } => Some(404),
			_ => None,
		}
	}

	/// Response headers carried by the error, when it originated from a response.
	pub fn headers(&self) -> Option<&Headers> {
		match self {
			Self::Http { headers, .. } | Self::NotFound { headers, .. } => Some(headers),
			_ => None,
		}
	}

	/// Returns `true` for I/O-class failures (exhausted connector retries or raw I/O).
	pub fn is_io(&self) -> bool {
		matches!(self, Self::Connection { .. } | Self::Io(_))
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying builder failure.
		#[source]
		source: BoxError,
	},
	/// API endpoint cannot be parsed.
	#[error("Endpoint `{endpoint}` is not a valid URL.")]
	InvalidEndpoint {
		/// Raw endpoint value.
		endpoint: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// API endpoint uses a scheme other than http or https.
	#[error("Endpoint scheme `{scheme}` is not supported.")]
	UnsupportedScheme {
		/// Offending scheme.
		scheme: String,
	},
	/// Request path or absolute URL cannot be parsed.
	#[error("Request target `{target}` is not a valid URL.")]
	InvalidRequestUrl {
		/// Raw request target.
		target: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	Body(#[from] serde_json::Error),
	/// Page size outside the server-accepted range.
	#[error("Page size {size} is outside the supported range 1..=100.")]
	InvalidPageSize {
		/// Rejected page size.
		size: u32,
	},
	/// Header name or value cannot be encoded.
	#[error("Header name or value is invalid.")]
	InvalidHeader {
		/// Underlying encoding failure.
		#[source]
		source: BoxError,
	},
	/// A pagination `Link` points away from the client's origin.
	#[error("Refusing to follow continuation {url} outside the API origin.")]
	ForeignContinuation {
		/// Rejected continuation.
		url: Url,
	},
	/// No connector was supplied and the default transport is disabled.
	#[error("No connector configured; enable the `reqwest` feature or supply one.")]
	MissingConnector,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Wraps a header name or value encoding failure.
	pub fn invalid_header(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::InvalidHeader { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Credential failures raised locally by authorization providers.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// Private key material could not be parsed or was rejected.
	#[error("Private key is invalid: {reason}.")]
	InvalidPrivateKey {
		/// Human-readable rejection reason.
		reason: String,
	},
	/// Private key file could not be read.
	#[error("Private key file {path} could not be read.")]
	KeyFile {
		/// Offending path.
		path: String,
		/// Underlying I/O failure.
		#[source]
		source: std::io::Error,
	},
	/// Assertion signing failed.
	#[error("App assertion could not be signed.")]
	Signing,
	/// Token endpoint returned a response without a usable token.
	#[error("Token endpoint returned an unusable response: {reason}.")]
	InvalidTokenResponse {
		/// Human-readable reason.
		reason: String,
	},
	/// Token endpoint answered with an OAuth error.
	#[error("Token endpoint returned `{error}`.")]
	TokenEndpoint {
		/// OAuth `error` code.
		error: String,
		/// OAuth `error_description`, when supplied.
		description: Option<String>,
	},
	/// The user declined the device authorization request.
	#[error("Device authorization was denied by the user.")]
	AccessDenied,
	/// The device code expired before the user approved it.
	#[error("Device code expired before authorization completed.")]
	DeviceCodeExpired,
}
