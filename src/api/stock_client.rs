use anyhow::Result;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use super::endpoint::Endpoint;
use super::error::FetchError;
use super::executor::RequestExecutor;
use super::FinancialDataProvider;
use crate::clock::Clock;
use crate::models::{
    BalanceSheet, Config, FetchOutcome, FinancialAnalysis, FinancialData, FinancialReport,
    NewsArticle, PeRatio, SearchResult, StockInfo,
};

pub const DEFAULT_RISK_LEVEL: &str = "moderate";

/// Typed accessors for the stock analysis API.
///
/// Clones share the executor, and with it the response cache.
#[derive(Debug, Clone)]
pub struct StockApiClient {
    executor: Arc<RequestExecutor>,
    cache_ttl: Duration,
}

impl StockApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let executor = RequestExecutor::new(config)?;
        Ok(Self::from_executor(Arc::new(executor), config.cache_ttl))
    }

    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let executor = RequestExecutor::with_clock(config, clock)?;
        Ok(Self::from_executor(Arc::new(executor), config.cache_ttl))
    }

    pub fn from_executor(executor: Arc<RequestExecutor>, cache_ttl: Duration) -> Self {
        Self {
            executor,
            cache_ttl,
        }
    }

    /// Same client and cache, judged against a different freshness window
    pub fn with_cache_ttl(&self, cache_ttl: Duration) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            cache_ttl,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: Endpoint) -> Result<FetchOutcome<T>, FetchError> {
        let key = self.executor.key_for(&endpoint)?;
        self.executor.execute(&key, self.cache_ttl).await
    }
}

#[async_trait::async_trait]
impl FinancialDataProvider for StockApiClient {
    async fn search_stocks(&self, query: &str) -> Vec<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        match self.get::<Vec<SearchResult>>(Endpoint::new("search").segment(query)).await {
            Ok(outcome) => {
                debug!("Search '{}' returned {} results", query, outcome.value.len());
                outcome.value
            }
            Err(e) => {
                // Search is best effort
                error!("Stock search failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn get_stock_info(&self, ticker: &str, risk_level: &str) -> Result<StockInfo, FetchError> {
        let endpoint = Endpoint::new("ticker")
            .segment(ticker)
            .query("risk_level", risk_level);
        Ok(self.get(endpoint).await?.value)
    }

    async fn get_pe_ratio(&self, ticker: &str) -> Result<FetchOutcome<PeRatio>, FetchError> {
        self.get(Endpoint::new("pe_ratio").segment(ticker)).await
    }

    async fn get_balance_sheet(&self, ticker: &str) -> Result<FetchOutcome<BalanceSheet>, FetchError> {
        self.get(Endpoint::new("balance_sheet").segment(ticker)).await
    }

    async fn get_financial_data(&self, ticker: &str) -> Result<FinancialData, FetchError> {
        let pe_key = self.executor.key_for(&Endpoint::new("pe_ratio").segment(ticker))?;
        let sheet_key = self
            .executor
            .key_for(&Endpoint::new("balance_sheet").segment(ticker))?;

        let combined = self
            .executor
            .combine::<PeRatio, BalanceSheet>(&pe_key, &sheet_key, self.cache_ttl)
            .await?;
        Ok(FinancialData::from(combined))
    }

    async fn get_stock_news(&self, ticker: &str) -> Result<Vec<NewsArticle>, FetchError> {
        Ok(self.get(Endpoint::new("news").segment(ticker)).await?.value)
    }

    async fn get_financial_report(&self, ticker: &str) -> Result<FinancialReport, FetchError> {
        Ok(self.get(Endpoint::new("financials").segment(ticker)).await?.value)
    }

    async fn get_financial_analysis(&self, ticker: &str) -> Result<FinancialAnalysis, FetchError> {
        Ok(self
            .get(Endpoint::new("financial-analysis").segment(ticker))
            .await?
            .value)
    }
}
