#![allow(dead_code, unused_imports)]

// std
use std::{
	collections::VecDeque,
	sync::atomic::{AtomicU32, Ordering},
};
// crates.io
use parking_lot::Mutex;
// self
pub use github_pipeline::{
	client::{Client, ClientBuilder, Request, RetryPolicy},
	error::{Error, Result},
	http::{
		Connector, ConnectorError, ConnectorFuture, ConnectorRequest, ConnectorResponse, HeaderName,
		HeaderValue, Headers,
	},
	url::Url,
};
pub use std::sync::Arc;
pub use time::{Duration, OffsetDateTime};

/// One scripted answer.
pub enum Step {
	Respond { status: u16, headers: Headers, body: String },
	Fail,
	Reject,
}
impl Step {
	pub fn ok(body: impl Into<String>) -> Self {
		Self::Respond { status: 200, headers: Headers::new(), body: body.into() }
	}

	pub fn status(status: u16, body: impl Into<String>) -> Self {
		Self::Respond { status, headers: Headers::new(), body: body.into() }
	}

	pub fn with_header(self, name: &'static str, value: impl Into<String>) -> Self {
		let value = HeaderValue::try_from(value.into()).expect("Scripted header values are valid.");

		match self {
			Self::Respond { status, headers, body } => Self::Respond {
				status,
				headers: headers.with(HeaderName::from_static(name), value),
				body,
			},
			other => other,
		}
	}
}

/// In-memory connector answering from a script and recording every request.
///
/// `GET /rate_limit` is answered separately so probes never consume script entries: 404 until
/// bodies are configured, then each body in turn with the last one repeating.
#[derive(Default)]
pub struct ScriptedConnector {
	script: Mutex<VecDeque<Step>>,
	rate_limit_bodies: Mutex<VecDeque<String>>,
	requests: Mutex<Vec<ConnectorRequest>>,
	probes: AtomicU32,
}
impl ScriptedConnector {
	pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
		Arc::new(Self { script: Mutex::new(steps.into_iter().collect()), ..Default::default() })
	}

	pub fn with_rate_limit_bodies<I, S>(self: Arc<Self>, bodies: I) -> Arc<Self>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.rate_limit_bodies.lock().extend(bodies.into_iter().map(Into::into));

		self
	}

	pub fn push(&self, step: Step) {
		self.script.lock().push_back(step);
	}

	/// Requests other than rate-limit probes, in order.
	pub fn requests(&self) -> Vec<ConnectorRequest> {
		self.requests.lock().clone()
	}

	pub fn attempts(&self) -> usize {
		self.requests.lock().len()
	}

	pub fn probes(&self) -> u32 {
		self.probes.load(Ordering::SeqCst)
	}

	pub fn client(self: &Arc<Self>) -> ClientBuilder {
		Client::builder()
			.endpoint("https://api.github.test")
			.shared_connector(self.clone())
			.retry_policy(
				RetryPolicy::default().with_backoff(Duration::milliseconds(10), Duration::milliseconds(10)),
			)
	}
}
impl Connector for ScriptedConnector {
	fn send(&self, request: ConnectorRequest) -> ConnectorFuture<'_> {
		Box::pin(async move {
			let url = request.url.clone();

			if url.path().ends_with("/rate_limit") {
				self.probes.fetch_add(1, Ordering::SeqCst);

				let body = {
					let mut bodies = self.rate_limit_bodies.lock();

					if bodies.len() > 1 { bodies.pop_front() } else { bodies.front().cloned() }
				};

				return Ok(match body {
					Some(body) => response(url, 200, Headers::new(), body),
					None => response(url, 404, Headers::new(), r#"{"message":"Not Found"}"#.into()),
				});
			}

			self.requests.lock().push(request);

			match self.script.lock().pop_front() {
				Some(Step::Respond { status, headers, body }) => Ok(response(url, status, headers, body)),
				Some(Step::Fail) => Err(ConnectorError::Io(std::io::Error::new(
					std::io::ErrorKind::ConnectionReset,
					"scripted reset",
				))),
				Some(Step::Reject) => Err(ConnectorError::Request {
					source: "scripted rejection".into(),
				}),
				None => Ok(response(url, 500, Headers::new(), "script exhausted".into())),
			}
		})
	}
}

fn response(url: Url, status: u16, headers: Headers, body: String) -> ConnectorResponse {
	ConnectorResponse { status, url, headers, body: body.into_bytes() }
}

/// Counts how often a shared helper ran.
#[derive(Debug, Default)]
pub struct Counter(AtomicU32);
impl Counter {
	pub fn bump(&self) -> u32 {
		self.0.fetch_add(1, Ordering::SeqCst) + 1
	}

	pub fn get(&self) -> u32 {
		self.0.load(Ordering::SeqCst)
	}
}
