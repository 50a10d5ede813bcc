use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::domain::PlanningError;

/// How a cached read was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    /// Fetched from the provider on this call.
    Fetched,
    /// Served from cache within its TTL.
    Fresh,
    /// Provider failed; served a cached value within the staleness bound.
    StaleFallback,
}

#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub source: CacheSource,
    /// Time since the value was fetched from the provider.
    pub age: Duration,
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    fetched_at: DateTime<Utc>,
}

/// Keyed read-through cache with a TTL, a staleness bound for fallback on
/// provider failure, and a per-fetch timeout.
pub struct ReadThroughCache<T> {
    name: &'static str,
    ttl: Duration,
    max_stale: Duration,
    timeout: std::time::Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone + Send + Sync> ReadThroughCache<T> {
    pub fn new(
        name: &'static str,
        ttl_secs: u64,
        max_stale_secs: u64,
        timeout: std::time::Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name,
            ttl: Duration::seconds(ttl_secs as i64),
            max_stale: Duration::seconds(max_stale_secs as i64),
            timeout,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<Resolved<T>, PlanningError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let now = self.clock.now();
        let cached = self.entries.read().await.get(key).cloned();

        if let Some(entry) = &cached {
            let age = now - entry.fetched_at;
            if age < self.ttl {
                debug!(cache = self.name, key, age_secs = age.num_seconds(), "cache hit");
                return Ok(Resolved {
                    value: entry.value.clone(),
                    source: CacheSource::Fresh,
                    age,
                });
            }
        }

        let failure = match tokio::time::timeout(self.timeout, fetch()).await {
            Ok(Ok(value)) => {
                let fetched_at = self.clock.now();
                self.entries.write().await.insert(
                    key.to_string(),
                    CacheEntry {
                        value: value.clone(),
                        fetched_at,
                    },
                );
                return Ok(Resolved {
                    value,
                    source: CacheSource::Fetched,
                    age: Duration::zero(),
                });
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(_) => format!("timed out after {}ms", self.timeout.as_millis()),
        };

        match cached {
            Some(entry) if now - entry.fetched_at <= self.max_stale => {
                let age = now - entry.fetched_at;
                warn!(
                    cache = self.name,
                    key,
                    age_secs = age.num_seconds(),
                    error = %failure,
                    "provider failed, serving cached value"
                );
                Ok(Resolved {
                    value: entry.value,
                    source: CacheSource::StaleFallback,
                    age,
                })
            }
            _ => {
                warn!(cache = self.name, key, error = %failure, "provider failed, no usable cache");
                Err(PlanningError::DataUnavailable(format!(
                    "{}: {}",
                    self.name, failure
                )))
            }
        }
    }
}
