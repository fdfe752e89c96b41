//! Lazy, forward-only pagination over `Link`-header continuations.
//!
//! A [`PageSource`] fetches one [`Page`] per call. [`PageIterator`] walks pages and
//! [`ItemIterator`] flattens them while still exposing page boundaries. Iterators are owned by
//! their caller and make a single pass; build a fresh one to start over.

pub mod iter;
pub mod page;

pub use iter::*;
pub use page::*;

// self
use crate::_prelude::*;

/// Boxed future returned by [`PageSource::fetch_page`].
pub type PageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<Page<T>>> + 'a + Send>>;

/// Fetches pages on behalf of an iterator.
pub trait PageSource<T>
where
	Self: Send + Sync,
{
	/// Fetches the first page when `continuation` is `None`, otherwise the page it points at.
	fn fetch_page(&self, continuation: Option<Url>) -> PageFuture<'_, T>;
}
impl<T, S> PageSource<T> for Arc<S>
where
	S: ?Sized + PageSource<T>,
{
	fn fetch_page(&self, continuation: Option<Url>) -> PageFuture<'_, T> {
		(**self).fetch_page(continuation)
	}
}

/// Replaces a caller-supplied fault that wraps an I/O error with the I/O error itself.
///
/// Every other error passes through unchanged.
pub fn unwrap_io_fault(err: Error) -> Error {
	match err {
		Error::Custom(source) => match source.downcast::<std::io::Error>() {
			Ok(io) => Error::Io(*io),
			Err(source) => Error::Custom(source),
		},
		err => err,
	}
}
