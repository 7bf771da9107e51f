//! Memoization
//!
//! Wraps an expensive async computation so that repeated calls with the same
//! derived key are answered from a [`TieredCache`].

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use crate::cache::TieredCache;

// == Memoized ==
/// A computation paired with a key function and a cache.
///
/// Built with [`memoize`]. Concurrent misses on one key are not coalesced;
/// each computes and the last `put` wins.
#[derive(Debug, Clone)]
pub struct Memoized<K, F> {
    cache: TieredCache,
    key_fn: K,
    compute_fn: F,
}

/// Returns a memoized version of `compute_fn`, keyed by `key_fn(&args)`.
///
/// # Example
/// ```ignore
/// let complete = memoize(
///     &cache,
///     |req: &LlmCallKey| req.cache_key(),
///     |req: LlmCallKey| async move { client.complete(req).await },
/// );
/// let first = complete.call(request.clone()).await;  // computes
/// let again = complete.call(request).await;          // cached
/// ```
pub fn memoize<K, F>(cache: &TieredCache, key_fn: K, compute_fn: F) -> Memoized<K, F> {
    Memoized {
        cache: cache.clone(),
        key_fn,
        compute_fn,
    }
}

impl<K, F> Memoized<K, F> {
    // == Call ==
    /// Returns the cached result for `args`, computing and storing it on a miss.
    pub async fn call<A, T, Fut>(&self, args: A) -> T
    where
        K: Fn(&A) -> String,
        F: Fn(A) -> Fut,
        Fut: Future<Output = T>,
        T: Serialize + DeserializeOwned,
    {
        let key = (self.key_fn)(&args);
        if let Some(hit) = self.cache.get::<T>(&key).await {
            trace!(key = %key, "memoized call served from cache");
            return hit;
        }

        let value = (self.compute_fn)(args).await;
        self.cache.put(&key, &value).await;
        value
    }

    // == Try Call ==
    /// Fallible variant of [`Memoized::call`]; errors are returned, not cached.
    pub async fn try_call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        K: Fn(&A) -> String,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize + DeserializeOwned,
    {
        let key = (self.key_fn)(&args);
        if let Some(hit) = self.cache.get::<T>(&key).await {
            trace!(key = %key, "memoized call served from cache");
            return Ok(hit);
        }

        let value = (self.compute_fn)(args).await?;
        self.cache.put(&key, &value).await;
        Ok(value)
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }
}
