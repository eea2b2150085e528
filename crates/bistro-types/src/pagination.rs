//! Pagination types shared by list queries.

use serde::{Deserialize, Serialize};

/// Page used when the request does not name one.
pub const DEFAULT_PAGE: usize = 1;
/// Page size used when the request does not name one.
pub const DEFAULT_LIMIT: usize = 10;
/// Upper bound on the page size a client may ask for.
pub const MAX_LIMIT: usize = 100;

/// Requested page, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
	pub page: usize,
	pub limit: usize,
}

impl PageRequest {
	/// Builds a request from optional query values, clamping to sane bounds.
	pub fn new(page: Option<usize>, limit: Option<usize>) -> Self {
		Self {
			page: page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE),
			limit: limit
				.filter(|l| *l > 0)
				.unwrap_or(DEFAULT_LIMIT)
				.min(MAX_LIMIT),
		}
	}

	/// Number of items skipped before this page.
	pub fn offset(&self) -> usize {
		(self.page - 1).saturating_mul(self.limit)
	}
}

impl Default for PageRequest {
	fn default() -> Self {
		Self::new(None, None)
	}
}

/// Position of a page within the full result set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageInfo {
	pub current: usize,
	pub pages: usize,
}

/// One page of query results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
	/// Items on this page.
	pub count: usize,
	/// Items matching the query across all pages.
	pub total: usize,
	pub pagination: PageInfo,
	pub data: Vec<T>,
}

impl<T> Page<T> {
	/// Cuts an already filtered and sorted result set down to one page.
	pub fn from_sorted(items: Vec<T>, request: PageRequest) -> Self {
		let total = items.len();
		let data: Vec<T> = items
			.into_iter()
			.skip(request.offset())
			.take(request.limit)
			.collect();

		Self {
			count: data.len(),
			total,
			pagination: PageInfo {
				current: request.page,
				pages: total.div_ceil(request.limit),
			},
			data,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_and_clamping() {
		assert_eq!(PageRequest::new(None, None), PageRequest { page: 1, limit: 10 });
		assert_eq!(PageRequest::new(Some(0), Some(0)), PageRequest { page: 1, limit: 10 });
		assert_eq!(PageRequest::new(Some(3), Some(500)).limit, MAX_LIMIT);
	}

	#[test]
	fn test_page_slicing() {
		let page = Page::from_sorted((1..=25).collect::<Vec<_>>(), PageRequest::new(Some(3), Some(10)));
		assert_eq!(page.data, vec![21, 22, 23, 24, 25]);
		assert_eq!(page.count, 5);
		assert_eq!(page.total, 25);
		assert_eq!(page.pagination, PageInfo { current: 3, pages: 3 });
	}

	#[test]
	fn test_page_past_end_is_empty() {
		let page = Page::from_sorted(vec![1, 2], PageRequest::new(Some(5), Some(10)));
		assert!(page.data.is_empty());
		assert_eq!(page.total, 2);
	}
}
