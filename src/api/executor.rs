use anyhow::Result;
use reqwest::{
    header::{ACCEPT, RETRY_AFTER},
    Client, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::backoff::BackoffPolicy;
use super::endpoint::{Endpoint, FetchKey};
use super::error::{AttemptError, FetchError};
use super::ApiRateLimiter;
use crate::cache::ResponseCache;
use crate::clock::{Clock, SystemClock};
use crate::models::{Config, FetchOutcome};

/// Response header the backend sets when it answered from its own cache
pub const CACHE_INDICATOR_HEADER: &str = "X-From-Cache";

/// Error payload the backend sends alongside non-success statuses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// What one network attempt produced, short of a failure
enum AttemptOutcome {
    Success { body: Value, from_server_cache: bool },
    RateLimited { retry_after: Duration },
}

/// Book-keeping for a single `execute` call
#[derive(Debug, Default)]
struct RetryState {
    attempt_index: u32,
    last_error: Option<AttemptError>,
    rate_limit_waits: u32,
}

impl RetryState {
    fn record_failure(&mut self, error: AttemptError) {
        self.last_error = Some(error);
        self.attempt_index += 1;
        self.rate_limit_waits = 0;
    }
}

/// Runs logical fetches: cache check, then a bounded retry loop over HTTP GET.
///
/// The executor owns the response cache; everything built on top of it
/// (aggregator, accessors) shares that one instance.
#[derive(Debug)]
pub struct RequestExecutor {
    client: Client,
    base_url: Url,
    cache: ResponseCache,
    policy: BackoffPolicy,
    clock: Arc<dyn Clock>,
    rate_limiter: Option<ApiRateLimiter>,
}

impl RequestExecutor {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build an executor whose cache timestamps and sleeps go through `clock`
    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent("stock-insights/1.0")
            .build()?;

        let rate_limiter = config.rate_limit_per_minute.map(ApiRateLimiter::new);

        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            cache: ResponseCache::new(clock.clone()),
            policy: BackoffPolicy::from_config(config),
            clock,
            rate_limiter,
        })
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn key_for(&self, endpoint: &Endpoint) -> Result<FetchKey, FetchError> {
        endpoint.resolve(&self.base_url)
    }

    /// Fetch `key`, serving it from cache when an entry is younger than `ttl`
    pub async fn execute<T>(&self, key: &FetchKey, ttl: Duration) -> Result<FetchOutcome<T>, FetchError>
    where
        T: DeserializeOwned,
    {
        if let Some(entry) = self.cache.lookup(key.as_str(), ttl) {
            match serde_json::from_value::<T>(entry.value) {
                Ok(value) => {
                    debug!("📦 Using cached response for {}", key);
                    return Ok(FetchOutcome {
                        value,
                        served_from_cache: true,
                    });
                }
                Err(e) => warn!("Cached response for {} no longer decodes ({}), refetching", key, e),
            }
        }

        let max_attempts = self.policy.max_attempts();
        let mut state = RetryState::default();
        let mut after_rate_limit = false;

        while state.attempt_index < max_attempts {
            // A rate-limit wait replaces the backoff delay for the retry that follows it
            if state.attempt_index > 0 && !after_rate_limit {
                let delay = self.policy.delay_for_attempt(state.attempt_index);
                info!(
                    "🔄 Retry attempt {}/{} for {}, waiting {:?}",
                    state.attempt_index + 1,
                    max_attempts,
                    key,
                    delay
                );
                self.clock.sleep(delay).await;
            }
            after_rate_limit = false;

            let failure = match self.attempt(key).await {
                Ok(AttemptOutcome::RateLimited { retry_after }) => {
                    state.rate_limit_waits += 1;
                    if state.rate_limit_waits > self.policy.max_rate_limit_waits() {
                        warn!("🚫 Giving up on {} after {} rate-limit waits", key, state.rate_limit_waits - 1);
                        return Err(FetchError::RateLimitExceeded {
                            waits: state.rate_limit_waits - 1,
                        });
                    }
                    warn!("⏳ Rate limited on {}, waiting {:?}", key, retry_after);
                    self.clock.sleep(retry_after).await;
                    after_rate_limit = true;
                    continue;
                }
                Ok(AttemptOutcome::Success { body, from_server_cache }) => {
                    match serde_json::from_value::<T>(body.clone()) {
                        Ok(value) => {
                            self.cache.store(key.as_str(), body);
                            return Ok(FetchOutcome {
                                value,
                                served_from_cache: from_server_cache,
                            });
                        }
                        Err(e) => AttemptError::from(e),
                    }
                }
                Err(e) => e,
            };

            warn!(
                "❌ API request failed for {} (attempt {}/{}): {}",
                key,
                state.attempt_index + 1,
                max_attempts,
                failure
            );
            state.record_failure(failure);
        }

        let last = state
            .last_error
            .unwrap_or_else(|| AttemptError::Transport("no attempt was made".to_string()));
        Err(FetchError::Exhausted {
            attempts: max_attempts,
            last,
        })
    }

    /// One HTTP round trip, classified
    async fn attempt(&self, key: &FetchKey) -> Result<AttemptOutcome, AttemptError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.wait().await;
        }

        debug!("Making request to: {}", key);
        let response = self
            .client
            .get(key.as_str())
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok());
            return Ok(AttemptOutcome::RateLimited {
                retry_after: self.policy.rate_limit_delay(retry_after),
            });
        }

        if !status.is_success() {
            let body = response.bytes().await.ok();
            let message = body
                .as_deref()
                .and_then(|bytes| serde_json::from_slice::<ErrorBody>(bytes).ok())
                .and_then(|payload| payload.error)
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| format!("API error: {}", status));
            return Err(AttemptError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let from_server_cache = response
            .headers()
            .get(CACHE_INDICATOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let bytes = response.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes)?;

        Ok(AttemptOutcome::Success {
            body,
            from_server_cache,
        })
    }
}
