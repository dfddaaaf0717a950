//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod rate_api;

pub use rate_api::{fetch_all, Page, PageRequest, RateApi, MAX_PAGE_SIZE};
