//! Page and item iterators driven by a [`PageSource`].

// std
use std::{collections::VecDeque, marker::PhantomData};
// self
use crate::{
	_prelude::*,
	http::ResponseMetadata,
	pagination::{Page, PageFuture, PageSource, unwrap_io_fault},
};

#[derive(Debug)]
enum Cursor {
	Start,
	Next(Url),
	Done,
}

/// Walks pages one HTTP call at a time.
pub struct PageIterator<T, S> {
	source: S,
	cursor: Cursor,
	last: Option<ResponseMetadata>,
	_item: PhantomData<fn() -> T>,
}
impl<T, S> PageIterator<T, S>
where
	S: PageSource<T>,
{
	/// Starts a fresh pass over `source`.
	pub fn new(source: S) -> Self {
		Self { source, cursor: Cursor::Start, last: None, _item: PhantomData }
	}

	/// Returns `true` while another page can be fetched.
	pub fn has_next(&self) -> bool {
		!matches!(self.cursor, Cursor::Done)
	}

	/// Fetches the next page; fails with [`Error::NoSuchElement`] once the last page was returned.
	pub async fn next(&mut self) -> Result<Page<T>> {
		let continuation = match &self.cursor {
			Cursor::Start => None,
			Cursor::Next(url) => Some(url.clone()),
			Cursor::Done => return Err(Error::NoSuchElement),
		};
		let page = self.source.fetch_page(continuation).await.map_err(unwrap_io_fault)?;

		self.cursor = page.next().cloned().map_or(Cursor::Done, Cursor::Next);

		if let Some(metadata) = page.metadata() {
			self.last = Some(metadata.clone());
		}

		Ok(page)
	}

	/// Metadata of the final page's response.
	///
	/// Fails with [`Error::IterationIncomplete`] until the last page has been fetched; yields
	/// `None` for pages that did not come from an HTTP call.
	pub fn final_response(&self) -> Result<Option<&ResponseMetadata>> {
		match self.cursor {
			Cursor::Done => Ok(self.last.as_ref()),
			_ => Err(Error::IterationIncomplete),
		}
	}
}
impl<T, S> Debug for PageIterator<T, S> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PageIterator").field("cursor", &self.cursor).finish_non_exhaustive()
	}
}

/// Flattens pages into items while keeping page boundaries reachable.
pub struct ItemIterator<T, S> {
	pages: PageIterator<T, S>,
	buffer: VecDeque<T>,
}
impl<T, S> ItemIterator<T, S>
where
	S: PageSource<T>,
{
	/// Starts a fresh pass over `source`.
	pub fn new(source: S) -> Self {
		Self { pages: PageIterator::new(source), buffer: VecDeque::new() }
	}

	/// Fetches pages until an item is buffered; returns `false` once every page is consumed.
	async fn fill(&mut self) -> Result<bool> {
		while self.buffer.is_empty() {
			if !self.pages.has_next() {
				return Ok(false);
			}

			let (items, ..) = self.pages.next().await?.into_parts();

			self.buffer.extend(items);
		}

		Ok(true)
	}

	/// Returns `true` while another item is available, fetching pages as needed.
	pub async fn has_next(&mut self) -> Result<bool> {
		self.fill().await
	}

	/// Next item; fails with [`Error::NoSuchElement`] once every page is consumed.
	pub async fn next(&mut self) -> Result<T> {
		self.try_next().await?.ok_or(Error::NoSuchElement)
	}

	/// Next item, or `None` once every page is consumed.
	pub async fn try_next(&mut self) -> Result<Option<T>> {
		if !self.fill().await? {
			return Ok(None);
		}

		Ok(self.buffer.pop_front())
	}

	/// Next item without consuming it; `None` once every page is consumed.
	pub async fn peek(&mut self) -> Result<Option<&T>> {
		self.fill().await?;

		Ok(self.buffer.front())
	}

	/// Returns the unconsumed rest of the current page, or the whole next page when the current
	/// one is used up.
	pub async fn next_page(&mut self) -> Result<Vec<T>> {
		if !self.fill().await? {
			return Err(Error::NoSuchElement);
		}

		Ok(self.buffer.drain(..).collect())
	}

	/// Unconsumed items of the current page; never fetches.
	pub fn current_page(&mut self) -> &[T] {
		self.buffer.make_contiguous()
	}

	/// Drains every remaining item.
	pub async fn collect_remaining(&mut self) -> Result<Vec<T>> {
		let mut items = Vec::new();

		while self.fill().await? {
			items.extend(self.buffer.drain(..));
		}

		Ok(items)
	}

	/// Metadata of the final page's response; fails until every item has been consumed.
	pub fn final_response(&self) -> Result<Option<&ResponseMetadata>> {
		if !self.buffer.is_empty() {
			return Err(Error::IterationIncomplete);
		}

		self.pages.final_response()
	}
}
impl<T, S> Debug for ItemIterator<T, S> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ItemIterator")
			.field("pages", &self.pages)
			.field("buffered", &self.buffer.len())
			.finish()
	}
}

/// Page source serving one pre-fetched page.
pub struct SinglePage<T>(Mutex<Option<Page<T>>>);
impl<T> SinglePage<T>
where
	T: Send,
{
	/// Wraps a pre-fetched page.
	pub fn new(page: Page<T>) -> Self {
		Self(Mutex::new(Some(page)))
	}

	/// Item iterator over pre-fetched items.
	pub fn items(items: Vec<T>) -> ItemIterator<T, Self> {
		ItemIterator::new(Self::new(Page::last(items)))
	}
}
impl<T> PageSource<T> for SinglePage<T>
where
	T: Send,
{
	fn fetch_page(&self, _continuation: Option<Url>) -> PageFuture<'_, T> {
		let page = self.0.lock().take();

		Box::pin(async move { page.ok_or(Error::NoSuchElement) })
	}
}
impl<T> Debug for SinglePage<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("SinglePage(..)")
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;

	struct NumberedPages {
		pages: Vec<Vec<u32>>,
		calls: AtomicU32,
		fail_on: Option<usize>,
	}
	impl NumberedPages {
		fn new(pages: Vec<Vec<u32>>) -> Self {
			Self { pages, calls: AtomicU32::new(0), fail_on: None }
		}

		fn url(index: usize) -> Url {
			Url::parse(&format!("https://api.github.com/items?page={index}"))
				.expect("Fixture URL should parse.")
		}
	}
	impl PageSource<u32> for NumberedPages {
		fn fetch_page(&self, continuation: Option<Url>) -> PageFuture<'_, u32> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);

				let index = continuation
					.and_then(|url| {
						url.query_pairs().find(|(key, _)| key == "page").and_then(|(_, v)| v.parse().ok())
					})
					.unwrap_or(0);

				if self.fail_on == Some(index) {
					return Err(Error::custom(std::io::Error::new(
						std::io::ErrorKind::TimedOut,
						"page timed out",
					)));
				}

				let next = (index + 1 < self.pages.len()).then(|| Self::url(index + 1));

				Ok(Page::new(self.pages[index].clone(), next))
			})
		}
	}

	#[tokio::test]
	async fn single_page_yields_items_then_no_such_element() {
		let mut items = SinglePage::items(vec![1, 2, 3]);

		assert_eq!(items.next().await.expect("First item."), 1);
		assert_eq!(items.next().await.expect("Second item."), 2);
		assert_eq!(items.next().await.expect("Third item."), 3);
		assert!(matches!(items.next().await, Err(Error::NoSuchElement)));
		assert_eq!(items.peek().await.expect("Peek never fails on exhaustion."), None);
	}

	#[tokio::test]
	async fn next_page_mid_page_returns_only_the_remainder() {
		let mut items = SinglePage::items(vec![1, 2, 3]);

		assert_eq!(items.next().await.expect("First item."), 1);
		assert_eq!(items.current_page(), &[2, 3]);
		assert_eq!(items.next_page().await.expect("Remainder."), vec![2, 3]);
		assert!(matches!(items.next_page().await, Err(Error::NoSuchElement)));
	}

	#[tokio::test]
	async fn items_flatten_pages_and_skip_empty_ones() {
		let source = NumberedPages::new(vec![vec![1, 2], vec![], vec![3]]);
		let mut items = ItemIterator::new(source);

		assert!(matches!(items.final_response(), Err(Error::IterationIncomplete)));
		assert_eq!(items.peek().await.expect("Peek."), Some(&1));
		assert_eq!(items.collect_remaining().await.expect("Collect."), vec![1, 2, 3]);
		assert!(items.final_response().is_ok());
	}

	#[tokio::test]
	async fn page_iterator_stops_after_last_page() {
		let source = Arc::new(NumberedPages::new(vec![vec![1], vec![2]]));
		let mut pages = PageIterator::new(source.clone());

		assert!(pages.has_next());
		assert_eq!(pages.next().await.expect("First page.").items(), &[1]);
		assert!(pages.final_response().is_err());
		assert!(pages.next().await.expect("Second page.").is_last());
		assert!(!pages.has_next());
		assert!(matches!(pages.next().await, Err(Error::NoSuchElement)));
		assert_eq!(source.calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn io_faults_from_sources_surface_as_io_errors() {
		let mut source = NumberedPages::new(vec![vec![1], vec![2]]);

		source.fail_on = Some(1);

		let mut items = ItemIterator::new(source);

		assert_eq!(items.next().await.expect("First item."), 1);

		let err = items.next().await.expect_err("Second page fails.");

		assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::TimedOut));
	}
}
