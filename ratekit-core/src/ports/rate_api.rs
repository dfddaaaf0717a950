//! Billing platform API port
//!
//! Defines the interface the import and export services use to talk to the
//! platform holding services and rate revisions. The concrete transport
//! (REST/JSON, token lifecycle) lives in the adapters.

use crate::domain::result::Result;
use crate::domain::{AccountItem, ApiError, NewRate, RateRecord, ServiceItem};

/// Largest page the platform accepts
pub const MAX_PAGE_SIZE: usize = 1000;

/// Offset-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    /// First page; `limit` is clamped to `1..=MAX_PAGE_SIZE`
    pub fn first(limit: usize) -> Self {
        Self {
            offset: 0,
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn next(&self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Build a page, inferring `has_more` from a full page
    pub fn from_items(items: Vec<T>, request: PageRequest) -> Self {
        let has_more = items.len() >= request.limit;
        Self { items, has_more }
    }

    /// Build a page whose items were filtered from `fetched` raw records
    ///
    /// `has_more` follows what the server returned, so dropping unusable
    /// records never ends pagination early.
    pub fn from_filtered(items: Vec<T>, fetched: usize, request: PageRequest) -> Self {
        Self {
            items,
            has_more: fetched >= request.limit,
        }
    }
}

/// Billing platform API
///
/// Implementations must be usable from a single thread of control; the
/// import pipeline issues requests strictly in input order.
pub trait RateApi: Send + Sync {
    /// Name of the backend (e.g., "exivity", "demo")
    fn name(&self) -> &str;

    /// Fetch one page of the service catalog
    fn list_services(&self, page: PageRequest) -> Result<Page<ServiceItem>>;

    /// Fetch one page of accounts
    fn list_accounts(&self, page: PageRequest) -> Result<Page<AccountItem>>;

    /// Fetch one page of existing rate revisions
    fn list_rates(&self, page: PageRequest) -> Result<Page<RateRecord>>;

    /// Create one rate revision
    fn create_rate(&self, rate: &NewRate) -> std::result::Result<(), ApiError>;
}

/// Drain a paginated listing into a single vector
pub fn fetch_all<T, F>(page_size: usize, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(PageRequest) -> Result<Page<T>>,
{
    let mut request = PageRequest::first(page_size);
    let mut all = Vec::new();
    loop {
        let page = fetch(request)?;
        let has_more = page.has_more;
        all.extend(page.items);
        if !has_more {
            break;
        }
        request = request.next();
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_all_continues_past_filtered_page() {
        // Raw pages of two; the first page loses one record to filtering
        let raw: Vec<Option<u32>> = vec![None, Some(2), Some(3)];
        let all = fetch_all(2, |req| {
            let page: Vec<Option<u32>> = raw.iter().skip(req.offset).take(req.limit).copied().collect();
            let fetched = page.len();
            Ok(Page::from_filtered(page.into_iter().flatten().collect(), fetched, req))
        })
        .unwrap();
        assert_eq!(all, vec![2, 3]);
    }

    #[test]
    fn test_page_request_clamped() {
        assert_eq!(PageRequest::first(0).limit, 1);
        assert_eq!(PageRequest::first(5000).limit, MAX_PAGE_SIZE);
        let next = PageRequest::first(500).next();
        assert_eq!(next.offset, 500);
    }

    #[test]
    fn test_fetch_all_pages() {
        let data: Vec<u32> = (0..7).collect();
        let all = fetch_all(3, |req| {
            let items: Vec<u32> = data.iter().skip(req.offset).take(req.limit).copied().collect();
            Ok(Page::from_items(items, req))
        })
        .unwrap();
        assert_eq!(all, data);
    }

    #[test]
    fn test_fetch_all_exact_multiple_stops_on_empty_page() {
        let data: Vec<u32> = (0..6).collect();
        let mut calls = 0;
        let all = fetch_all(3, |req| {
            calls += 1;
            let items: Vec<u32> = data.iter().skip(req.offset).take(req.limit).copied().collect();
            Ok(Page::from_items(items, req))
        })
        .unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(calls, 3);
    }
}
