use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::fmt;
use std::num::NonZeroU32;

use crate::models::{
    BalanceSheet, FetchOutcome, FinancialAnalysis, FinancialData, FinancialReport, NewsArticle,
    PeRatio, SearchResult, StockInfo,
};

pub mod aggregator;
pub mod backoff;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod stock_client;

pub use backoff::BackoffPolicy;
pub use endpoint::{Endpoint, FetchKey};
pub use error::{AttemptError, FetchError};
pub use executor::{RequestExecutor, CACHE_INDICATOR_HEADER};
pub use stock_client::{StockApiClient, DEFAULT_RISK_LEVEL};

/// Client-side pacing for outgoing requests
pub struct ApiRateLimiter {
    requests_per_minute: NonZeroU32,
    limiter: DefaultDirectRateLimiter,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let requests_per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Self {
            requests_per_minute,
            limiter: RateLimiter::direct(Quota::per_minute(requests_per_minute)),
        }
    }

    /// Wait until the next request may go out
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRateLimiter")
            .field("requests_per_minute", &self.requests_per_minute)
            .finish()
    }
}

/// Named operations against the stock analysis API
#[async_trait::async_trait]
pub trait FinancialDataProvider {
    /// Best-effort search; blank queries and failures both yield no results
    async fn search_stocks(&self, query: &str) -> Vec<SearchResult>;

    async fn get_stock_info(&self, ticker: &str, risk_level: &str) -> Result<StockInfo, FetchError>;

    async fn get_pe_ratio(&self, ticker: &str) -> Result<FetchOutcome<PeRatio>, FetchError>;

    async fn get_balance_sheet(&self, ticker: &str) -> Result<FetchOutcome<BalanceSheet>, FetchError>;

    /// P/E ratio and balance sheet fetched concurrently
    async fn get_financial_data(&self, ticker: &str) -> Result<FinancialData, FetchError>;

    async fn get_stock_news(&self, ticker: &str) -> Result<Vec<NewsArticle>, FetchError>;

    async fn get_financial_report(&self, ticker: &str) -> Result<FinancialReport, FetchError>;

    async fn get_financial_analysis(&self, ticker: &str) -> Result<FinancialAnalysis, FetchError>;
}
