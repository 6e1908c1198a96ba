//! Generic page walker.

use std::future::Future;

use eddy_core::constants::MAX_PAGES;
use eddy_core::error::FetchError;

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Records that parsed cleanly.
    pub items: Vec<T>,
    /// Records the server returned, including skipped malformed ones.
    pub fetched: usize,
    /// Server-reported page count, when the service provides one.
    pub total_pages: Option<u32>,
}

impl<T> Page<T> {
    /// Page without server-side page accounting; `fetched` equals `items.len()`.
    pub fn of(items: Vec<T>) -> Self {
        let fetched = items.len();
        Self {
            items,
            fetched,
            total_pages: None,
        }
    }
}

/// Fetch pages `0, 1, 2, …` until the walk ends and concatenate the items.
///
/// When the server reports a page count, the walk ends once the page index
/// reaches it (or on an empty page); servers may cap the page size below the
/// one requested, so a short page alone proves nothing. Without a count, the
/// walk ends on an empty or short page. More than [`MAX_PAGES`] pages is an
/// error.
pub async fn paginate<T, F, Fut>(url: &str, page_size: usize, mut fetch_page: F) -> Result<Vec<T>, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, FetchError>>,
{
    let mut all = Vec::new();

    for index in 0..MAX_PAGES {
        let page = fetch_page(index).await?;
        let fetched = page.fetched;
        all.extend(page.items);

        let last = match page.total_pages {
            Some(total) => index + 1 >= total,
            None => fetched < page_size,
        };
        if fetched == 0 || last {
            return Ok(all);
        }
    }

    Err(FetchError::TooManyPages {
        url: url.to_string(),
        max_pages: MAX_PAGES,
    })
}
