//! Resilient data-access layer for the stock analysis API.
//!
//! Requests go through [`api::RequestExecutor`], which caches JSON responses
//! for the life of the process, retries transient failures with exponential
//! backoff and waits out server rate limits. [`api::StockApiClient`] exposes
//! the typed operations on top of it.

pub mod api;
pub mod cache;
pub mod clock;
pub mod models;

pub use api::{FetchError, FinancialDataProvider, StockApiClient};
pub use models::Config;
