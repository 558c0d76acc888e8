//! Fan-in of two independent fetches into one composite value.

use futures::future;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::endpoint::FetchKey;
use super::error::FetchError;
use super::executor::RequestExecutor;
use crate::models::{CompositeOutcome, FetchOutcome};

impl RequestExecutor {
    /// Run both fetches concurrently and wait for both to finish.
    ///
    /// Neither fetch is cancelled when the other fails, so a successful
    /// sibling still lands in the cache. No partial result is returned.
    ///
    /// When both fetches fail, the error for `first` is returned, even if
    /// `second` failed earlier in time.
    pub async fn combine<A, B>(
        &self,
        first: &FetchKey,
        second: &FetchKey,
        ttl: Duration,
    ) -> Result<CompositeOutcome<A, B>, FetchError>
    where
        A: DeserializeOwned,
        B: DeserializeOwned,
    {
        let (first, second) = future::join(
            self.execute::<A>(first, ttl),
            self.execute::<B>(second, ttl),
        )
        .await;

        Ok(merge(first?, second?))
    }
}

fn merge<A, B>(first: FetchOutcome<A>, second: FetchOutcome<B>) -> CompositeOutcome<A, B> {
    let served_from_cache = first.served_from_cache || second.served_from_cache;
    debug!(
        "Combined fetch (first cached: {}, second cached: {})",
        first.served_from_cache, second.served_from_cache
    );

    CompositeOutcome {
        first: first.value,
        second: second.value,
        served_from_cache,
    }
}
