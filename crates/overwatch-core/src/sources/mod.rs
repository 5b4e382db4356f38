//! Upstream hazard feeds and the fault-tolerant fan-out that aggregators
//! build their prompts from.
//!
//! Every source is awaited independently. A failure becomes a
//! [`SourceOutcome::Failed`] entry and a `warn!` line; it never escapes
//! [`fan_out`]. [`merge`] then reduces the per-source results into one JSON
//! object, with `null` in the slot of each failed source and every payload
//! trimmed to the configured [`Budget`].

pub mod http;
pub mod places;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::config::Budget;
use crate::error::FetchError;
use crate::profile::Location;

pub use http::{build_sources, find_source};
pub use places::{Facility, GeoapifyPlaces, PlacesService};

// ---------------------------------------------------------------------------
// HazardSource
// ---------------------------------------------------------------------------

#[async_trait]
pub trait HazardSource: Send + Sync {
    /// Stable name; used as the key in merged payloads and in `/api/feeds/{name}`.
    fn name(&self) -> &str;

    /// Cache key for a fetch at `location`. Sources whose payload does not
    /// depend on the location keep the default.
    fn cache_key(&self, _location: &Location) -> String {
        self.name().to_string()
    }

    async fn fetch(&self, location: &Location) -> Result<Value, FetchError>;
}

pub type SharedSource = Arc<dyn HazardSource>;

// ---------------------------------------------------------------------------
// SourceResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Value(Value),
    Failed(String),
}

/// Result of one source fetch inside an aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceResult {
    pub name: String,
    pub outcome: SourceOutcome,
}

impl SourceResult {
    pub fn ok(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            outcome: SourceOutcome::Value(value),
        }
    }

    pub fn failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: SourceOutcome::Failed(reason.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, SourceOutcome::Value(_))
    }

    /// The payload, or `null` for a failed source.
    pub fn into_value(self) -> Value {
        match self.outcome {
            SourceOutcome::Value(v) => v,
            SourceOutcome::Failed(_) => Value::Null,
        }
    }
}

/// Fetch every source concurrently. Results come back in input order.
pub async fn fan_out(sources: &[SharedSource], location: &Location) -> Vec<SourceResult> {
    let fetches = sources.iter().map(|source| async move {
        let name = source.name().to_string();
        match source.fetch(location).await {
            Ok(value) => {
                debug!(source = %name, "source fetched");
                SourceResult::ok(name, value)
            }
            Err(e) => {
                warn!(source = %name, reason = %e, "source fetch failed, continuing without it");
                SourceResult::failed(name, e.to_string())
            }
        }
    });
    join_all(fetches).await
}

/// Reduce per-source results into one object keyed by source name.
pub fn merge(results: Vec<SourceResult>, budget: &Budget) -> Map<String, Value> {
    results
        .into_iter()
        .map(|r| {
            let name = r.name.clone();
            (name, trim(r.into_value(), budget))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Budget trimming
// ---------------------------------------------------------------------------

/// Cap arrays at `max_items` and strings at `max_text_chars`, at every depth.
pub fn trim(value: Value, budget: &Budget) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .take(budget.max_items)
                .map(|v| trim(v, budget))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, trim(v, budget)))
                .collect(),
        ),
        Value::String(s) => Value::String(truncate_chars(s, budget.max_text_chars)),
        other => other,
    }
}

fn truncate_chars(s: String, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => s[..cut].to_string(),
        None => s,
    }
}

// ---------------------------------------------------------------------------
// CachedSource
// ---------------------------------------------------------------------------

/// A source served through the shared TTL cache. Failures are not cached.
pub struct CachedSource {
    inner: SharedSource,
    cache: Arc<TtlCache<Value>>,
    ttl: Duration,
}

impl CachedSource {
    pub fn new(inner: SharedSource, cache: Arc<TtlCache<Value>>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    /// Fetch, also reporting whether the value came from the cache.
    pub async fn fetch_with_meta(&self, location: &Location) -> Result<(Value, bool), FetchError> {
        let key = self.inner.cache_key(location);
        if let Some(hit) = self.cache.get(&key) {
            debug!(source = %self.inner.name(), key = %key, "cache hit");
            return Ok((hit, true));
        }
        let value = self.inner.fetch(location).await?;
        self.cache.set_with_ttl(key, value.clone(), self.ttl);
        Ok((value, false))
    }
}

#[async_trait]
impl HazardSource for CachedSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn cache_key(&self, location: &Location) -> String {
        self.inner.cache_key(location)
    }

    async fn fetch(&self, location: &Location) -> Result<Value, FetchError> {
        self.fetch_with_meta(location).await.map(|(v, _)| v)
    }
}

/// Wrap every source in `sources` with the shared cache.
pub fn cached(
    sources: Vec<SharedSource>,
    cache: &Arc<TtlCache<Value>>,
    ttl: Duration,
) -> Vec<Arc<CachedSource>> {
    sources
        .into_iter()
        .map(|s| Arc::new(CachedSource::new(s, Arc::clone(cache), ttl)))
        .collect()
}

/// Erase the concrete type for use in aggregators.
pub fn shared<S: HazardSource + 'static>(sources: &[Arc<S>]) -> Vec<SharedSource> {
    sources
        .iter()
        .map(|s| Arc::clone(s) as SharedSource)
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source double: returns a fixed value or fails, counting calls.
    pub struct StubSource {
        name: String,
        reply: Option<Value>,
        calls: AtomicUsize,
    }

    impl StubSource {
        pub fn ok(name: &str, value: Value) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                reply: Some(value),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HazardSource for StubSource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch(&self, _location: &Location) -> Result<Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(v) => Ok(v.clone()),
                None => Err(FetchError::Status {
                    source_name: self.name.clone(),
                    status: 502,
                }),
            }
        }
    }
}
