//! Immutable page values produced by one HTTP call.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	http::{ConnectorResponse, ResponseMetadata},
};

/// Ordered items returned by one call plus the continuation to the next page.
#[derive(Clone, Debug)]
pub struct Page<T> {
	items: Vec<T>,
	next: Option<Url>,
	metadata: Option<ResponseMetadata>,
	total_count: Option<u64>,
}
impl<T> Page<T> {
	/// Creates a page from items and an optional continuation.
	pub fn new(items: Vec<T>, next: Option<Url>) -> Self {
		Self { items, next, metadata: None, total_count: None }
	}

	/// Creates a terminal page with no continuation.
	pub fn last(items: Vec<T>) -> Self {
		Self::new(items, None)
	}

	/// Attaches the response metadata the page was parsed from.
	pub fn with_metadata(mut self, metadata: ResponseMetadata) -> Self {
		self.metadata = Some(metadata);

		self
	}

	/// Attaches the total reported by search-style envelopes.
	pub fn with_total_count(mut self, total_count: u64) -> Self {
		self.total_count = Some(total_count);

		self
	}

	/// Items in server order.
	pub fn items(&self) -> &[T] {
		&self.items
	}

	/// Continuation to the next page.
	pub fn next(&self) -> Option<&Url> {
		self.next.as_ref()
	}

	/// Returns `true` when no continuation follows.
	pub fn is_last(&self) -> bool {
		self.next.is_none()
	}

	/// Response metadata, when the page came from an HTTP call.
	pub fn metadata(&self) -> Option<&ResponseMetadata> {
		self.metadata.as_ref()
	}

	/// Total item count reported by the envelope, when present.
	pub fn total_count(&self) -> Option<u64> {
		self.total_count
	}

	/// Number of items on the page.
	pub fn len(&self) -> usize {
		self.items.len()
	}

	/// Returns `true` when the page holds no items.
	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Splits the page into its items and its response metadata.
	pub fn into_parts(self) -> (Vec<T>, Option<Url>, Option<ResponseMetadata>) {
		(self.items, self.next, self.metadata)
	}
}
impl<T> Page<T>
where
	T: DeserializeOwned,
{
	/// Parses a listing response.
	///
	/// The body is either a JSON array of items or an object whose first array-valued field
	/// holds them; a numeric `total_count` field is captured when present. The continuation
	/// comes from the `Link: <…>; rel="next"` header.
	pub fn from_response(response: ConnectorResponse) -> Result<Self> {
		let next = response.headers.next_link();
		let metadata = response.metadata();
		let decode = |source| Error::Decode { url: response.url.clone(), source };
		let value = if response.body.iter().all(u8::is_ascii_whitespace) {
			Value::Array(Vec::new())
		} else {
			let de = &mut serde_json::Deserializer::from_slice(&response.body);

			serde_path_to_error::deserialize(de).map_err(decode)?
		};
		let (items, total_count) = match value {
			Value::Object(mut fields) => {
				let total_count = fields.get("total_count").and_then(Value::as_u64);
				let key = fields.iter().find(|(_, value)| value.is_array()).map(|(key, _)| key.clone());
				let items = key.and_then(|key| fields.remove(&key)).unwrap_or(Value::Array(Vec::new()));

				(items, total_count)
			},
			value => (value, None),
		};
		let items: Vec<T> = serde_path_to_error::deserialize(items).map_err(decode)?;
		let page = Self::new(items, next).with_metadata(metadata);

		Ok(match total_count {
			Some(total_count) => page.with_total_count(total_count),
			None => page,
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::http::Headers;

	fn headers(pairs: &[(&str, &str)]) -> Headers {
		Headers::try_from_pairs(pairs.iter().copied()).expect("Fixture headers should be valid.")
	}

	#[derive(Debug, Deserialize, PartialEq)]
	struct Issue {
		number: u32,
	}

	fn response(headers: Headers, body: &str) -> ConnectorResponse {
		ConnectorResponse {
			status: 200,
			url: Url::parse("https://api.github.com/repos/o/r/issues")
				.expect("Fixture URL should parse."),
			headers,
			body: body.as_bytes().to_vec(),
		}
	}

	#[test]
	fn array_bodies_follow_next_link() {
		let headers =
			headers(&[("Link", "<https://api.github.com/repos/o/r/issues?page=2>; rel=\"next\"")]);
		let page = Page::<Issue>::from_response(response(headers, r#"[{"number":1},{"number":2}]"#))
			.expect("Array body should parse.");

		assert_eq!(page.items(), &[Issue { number: 1 }, Issue { number: 2 }]);
		assert!(!page.is_last());
		assert_eq!(page.metadata().map(|meta| meta.status), Some(200));
	}

	#[test]
	fn envelope_bodies_capture_total_count() {
		let body = r#"{"total_count":41,"incomplete_results":false,"items":[{"number":7}]}"#;
		let page = Page::<Issue>::from_response(response(Headers::new(), body))
			.expect("Envelope body should parse.");

		assert_eq!(page.items(), &[Issue { number: 7 }]);
		assert_eq!(page.total_count(), Some(41));
		assert!(page.is_last());
	}

	#[test]
	fn decode_failures_name_the_offending_path() {
		let err = Page::<Issue>::from_response(response(Headers::new(), r#"[{"number":"x"}]"#))
			.expect_err("Mistyped item should fail.");
		let Error::Decode { source, .. } = &err else {
			panic!("Expected a decode error, got {err:?}.");
		};

		assert_eq!(source.path().to_string(), "[0].number");
	}
}
