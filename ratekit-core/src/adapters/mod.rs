//! Adapter implementations
//!
//! Adapters implement the [`RateApi`](crate::ports::RateApi) port:
//! - Exivity HTTP client (JSON:API over blocking reqwest)
//! - In-memory demo backend for demo mode and tests

pub mod demo;
pub mod exivity;

#[cfg(test)]
pub mod mock_server;
