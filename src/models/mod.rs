use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// A value plus whether it came from a cache rather than a live fetch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchOutcome<T> {
    pub value: T,
    pub served_from_cache: bool,
}

/// Two independently fetched values; `served_from_cache` is true if either was
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeOutcome<T, U> {
    pub first: T,
    pub second: U,
    pub served_from_cache: bool,
}

/// Stock search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub ticker: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub market: String,
    pub match_score: f64,
}

/// Basic company profile and risk read-out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockInfo {
    pub ticker: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub risk: Option<String>,
}

/// P/E ratio, alone and against the industry average
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeRatio {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    #[serde(default)]
    pub industry_pe_ratio: Option<f64>,
    #[serde(default)]
    pub pe_relative_to_industry: Option<f64>,
}

/// Fiscal year as reported; the backend sends a label such as "N/A" when unknown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FiscalYear {
    Year(i64),
    Label(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheet {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub year: Option<FiscalYear>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub total_assets: Option<f64>,
    #[serde(default)]
    pub total_liabilities: Option<f64>,
    #[serde(default)]
    pub total_equity: Option<f64>,
    #[serde(default)]
    pub debt_ratio: Option<f64>,
    #[serde(default)]
    pub debt_to_equity: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CashFlow {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub year: Option<FiscalYear>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub operating_cash_flow: Option<f64>,
    #[serde(default)]
    pub investing_cash_flow: Option<f64>,
    #[serde(default)]
    pub financing_cash_flow: Option<f64>,
    #[serde(default)]
    pub net_cash_flow: Option<f64>,
    #[serde(default)]
    pub cash_flow_to_revenue: Option<f64>,
    #[serde(default)]
    pub cash_flow_to_income: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DividendHistory {
    #[serde(default)]
    pub has_dividends: bool,
    #[serde(default)]
    pub years_of_data: Option<u32>,
    /// Total dividend per calendar year, keyed by year
    #[serde(default)]
    pub annual_dividends: BTreeMap<String, f64>,
    #[serde(default)]
    pub increasing: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Comprehensive financial document served by `/financials/{ticker}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialReport {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    #[serde(default)]
    pub industry_pe_ratio: Option<f64>,
    #[serde(default)]
    pub pe_relative_to_industry: Option<f64>,
    #[serde(default)]
    pub balance_sheet: Option<BalanceSheet>,
    #[serde(default)]
    pub cash_flow: Option<CashFlow>,
    #[serde(default)]
    pub dividend_data: Option<DividendHistory>,
    /// Set by the backend when it could only partially build the report
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Free-text investment analysis for one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialAnalysis {
    pub ticker: String,
    pub analysis: String,
}

/// P/E ratio and balance sheet fetched together
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialData {
    pub pe_ratio: PeRatio,
    pub balance_sheet: BalanceSheet,
    pub from_cache: bool,
}

impl From<CompositeOutcome<PeRatio, BalanceSheet>> for FinancialData {
    fn from(outcome: CompositeOutcome<PeRatio, BalanceSheet>) -> Self {
        Self {
            pe_ratio: outcome.first,
            balance_sheet: outcome.second,
            from_cache: outcome.served_from_cache,
        }
    }
}

/// Configuration for the data-access layer
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: Url,
    pub cache_ttl: Duration,
    /// Total attempts per fetch, the first one included
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub rate_limit_delay: Duration,
    pub max_rate_limit_waits: u32,
    pub request_timeout: Duration,
    pub rate_limit_per_minute: Option<u32>,
}

impl Config {
    pub const DEFAULT_API_URL: &'static str = "http://localhost:5001/api";

    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let api_url = std::env::var("STOCK_API_URL")
            .or_else(|_| std::env::var("NEXT_PUBLIC_API_URL"))
            .unwrap_or_else(|_| Self::DEFAULT_API_URL.to_string());

        let defaults = Config::default();

        Ok(Config {
            api_base_url: Self::parse_base_url(&api_url)?,
            cache_ttl: Duration::from_secs(env_or("CACHE_TTL_SECS", defaults.cache_ttl.as_secs())),
            max_attempts: env_or("MAX_ATTEMPTS", defaults.max_attempts),
            retry_base_delay: Duration::from_millis(env_or(
                "RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )),
            rate_limit_delay: Duration::from_secs(env_or(
                "RATE_LIMIT_DEFAULT_SECS",
                defaults.rate_limit_delay.as_secs(),
            )),
            max_rate_limit_waits: env_or("MAX_RATE_LIMIT_WAITS", defaults.max_rate_limit_waits),
            request_timeout: Duration::from_secs(env_or(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            rate_limit_per_minute: std::env::var("RATE_LIMIT_PER_MINUTE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|per_minute| *per_minute > 0),
        })
    }

    /// Same defaults, pointed at a different API base
    pub fn with_base_url(base_url: &str) -> anyhow::Result<Self> {
        Ok(Config {
            api_base_url: Self::parse_base_url(base_url)?,
            ..Config::default()
        })
    }

    fn parse_base_url(raw: &str) -> anyhow::Result<Url> {
        let url = Url::parse(raw)
            .map_err(|e| anyhow::anyhow!("Invalid API base URL '{}': {}", raw, e))?;
        if url.cannot_be_a_base() {
            return Err(anyhow::anyhow!("API base URL '{}' cannot carry a path", raw));
        }
        Ok(url)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: Url::parse(Self::DEFAULT_API_URL).expect("default API URL is valid"),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(1000),
            rate_limit_delay: Duration::from_secs(5),
            max_rate_limit_waits: 10,
            request_timeout: Duration::from_secs(30),
            rate_limit_per_minute: None,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
