//! Page-by-page fetch loop
//!
//! Upstream list endpoints carry no total count or next cursor, so a page
//! shorter than `per_page` (including an empty one) is taken as the last page.

use super::SisError;
use futures::{Stream, TryStreamExt};
use std::future::Future;

/// Default ceiling on pages fetched in one loop
pub const DEFAULT_MAX_PAGES: u32 = 1000;

/// Paging parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// First page to fetch (1-indexed)
    pub start_page: u32,
    /// Requested page size
    pub per_page: u32,
    /// Stop after this many pages even if they keep coming back full
    pub max_pages: u32,
}

impl PageRequest {
    pub fn new(per_page: u32) -> Self {
        Self {
            start_page: 1,
            per_page,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Resume from a given page
    pub fn starting_at(mut self, page: u32) -> Self {
        self.start_page = page.max(1);
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }
}

/// Lazily stream every record across pages
///
/// `fetch` is called with successive page numbers. The stream ends after an
/// empty page, after a page shorter than `per_page`, or on the first error
/// (which is yielded).
pub fn paginate<T, F, Fut>(request: PageRequest, mut fetch: F) -> impl Stream<Item = Result<T, SisError>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, SisError>>,
{
    async_stream::try_stream! {
        let mut page = request.start_page.max(1);
        let mut pages_fetched: u32 = 0;

        loop {
            if pages_fetched >= request.max_pages {
                tracing::warn!(
                    page,
                    max_pages = request.max_pages,
                    "Page limit reached, stopping pagination"
                );
                break;
            }

            let records = fetch(page).await?;
            pages_fetched += 1;

            let count = records.len();
            tracing::debug!(page, count, per_page = request.per_page, "Fetched page");

            for record in records {
                yield record;
            }

            if count == 0 || count < request.per_page as usize {
                break;
            }
            page += 1;
        }
    }
}

/// Drain [`paginate`] into a vector
pub async fn collect_pages<T, F, Fut>(request: PageRequest, fetch: F) -> Result<Vec<T>, SisError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, SisError>>,
{
    paginate(request, fetch).try_collect().await
}
