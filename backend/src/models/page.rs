//! Pagination envelopes and parameters.

use serde::{Deserialize, Serialize};

/// Largest page any list endpoint will return.
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Page-number pagination, always normalized before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageParams {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }.normalized()
    }

    /// Clamp to page >= 1 and 1 <= limit <= MAX_PAGE_SIZE.
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

/// Build normalized params from optional query values.
pub fn page_params(page: Option<u32>, limit: Option<u32>) -> PageParams {
    PageParams::new(page.unwrap_or(1), limit.unwrap_or(DEFAULT_PAGE_SIZE))
}

/// A page of results together with the unpaginated total.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, params: PageParams) -> Self {
        let limit = i64::from(params.limit.max(1));
        Self {
            items,
            total,
            page: params.page,
            limit: params.limit,
            total_pages: (total + limit - 1) / limit,
        }
    }

    pub fn empty(params: PageParams) -> Self {
        Self::new(Vec::new(), 0, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_capped() {
        let params = PageParams::new(0, 500);
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, MAX_PAGE_SIZE);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let page: Page<u8> = Page::new(vec![], 41, PageParams::new(3, 20));
        assert_eq!(page.total_pages, 3);
        assert_eq!(PageParams::new(3, 20).offset(), 40);
    }
}
