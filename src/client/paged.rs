//! Paged listings bound to a client.

// std
use std::marker::PhantomData;
// self
use crate::{
	_prelude::*,
	client::{Client, Request},
	error::ConfigError,
	pagination::{ItemIterator, Page, PageFuture, PageIterator, PageSource},
};

/// Re-iterable listing: holds the request and page size, and hands out fresh iterators.
pub struct PagedList<T> {
	client: Client,
	request: Request,
	page_size: Option<u32>,
	_item: PhantomData<fn() -> T>,
}
impl<T> PagedList<T>
where
	T: 'static + DeserializeOwned + Send,
{
	/// Largest `per_page` value the server accepts.
	pub const MAX_PAGE_SIZE: u32 = 100;

	pub(crate) fn new(client: Client, request: Request) -> Self {
		Self { client, request, page_size: None, _item: PhantomData }
	}

	/// Requests `size` items per page through the `per_page` parameter.
	pub fn with_page_size(mut self, size: u32) -> Result<Self> {
		if !(1..=Self::MAX_PAGE_SIZE).contains(&size) {
			return Err(ConfigError::InvalidPageSize { size }.into());
		}

		self.page_size = Some(size);

		Ok(self)
	}

	/// Configured page size, if any.
	pub fn page_size(&self) -> Option<u32> {
		self.page_size
	}

	/// Fresh item iterator starting at the first page.
	pub fn iter(&self) -> ItemIterator<T, ClientPageSource<T>> {
		ItemIterator::new(self.source())
	}

	/// Fresh page iterator starting at the first page.
	pub fn pages(&self) -> PageIterator<T, ClientPageSource<T>> {
		PageIterator::new(self.source())
	}

	/// Fetches every page and returns all items in order.
	pub async fn to_vec(&self) -> Result<Vec<T>> {
		self.iter().collect_remaining().await
	}

	/// Total reported by search-style envelopes, read from the first page.
	pub async fn total_count(&self) -> Result<Option<u64>> {
		let page = self.source().fetch_page(None).await?;

		Ok(page.total_count())
	}

	fn source(&self) -> ClientPageSource<T> {
		let request = match self.page_size {
			Some(size) => self.request.clone().with_query("per_page", size),
			None => self.request.clone(),
		};

		ClientPageSource { client: self.client.clone(), request, _item: PhantomData }
	}
}
impl<T> Debug for PagedList<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PagedList")
			.field("request", &self.request)
			.field("page_size", &self.page_size)
			.finish_non_exhaustive()
	}
}

/// [`PageSource`] that fetches pages through a [`Client`].
///
/// The first page uses the listing's request; later pages follow the `Link` continuation
/// verbatim, keeping the original method and headers. Continuations must stay on the client's
/// origin so credentials never leave it.
pub struct ClientPageSource<T> {
	client: Client,
	request: Request,
	_item: PhantomData<fn() -> T>,
}
impl<T> PageSource<T> for ClientPageSource<T>
where
	T: 'static + DeserializeOwned + Send,
{
	fn fetch_page(&self, continuation: Option<Url>) -> PageFuture<'_, T> {
		Box::pin(async move {
			let mut request = self.request.clone();

			if let Some(url) = continuation {
				if url.origin() != self.client.endpoint().origin() {
					return Err(ConfigError::ForeignContinuation { url }.into());
				}

				request.target = url.into();
				request.query.clear();
			}

			let response = self.client.execute(request).await?;

			Page::from_response(response)
		})
	}
}
impl<T> Debug for ClientPageSource<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientPageSource").field("request", &self.request).finish_non_exhaustive()
	}
}
