use std::sync::Arc;
use std::time::Duration;

use genai_gateway::{Artifact, Gateway, GatewayConfig};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::cache::TtlCache;

/// Aggregators' handle on the gateway, with an optional response cache.
///
/// Cached artifacts are keyed by prompt and schema hint, so identical
/// requests inside the TTL never reach the lane.
pub struct Generator {
    gateway: Arc<Gateway>,
    cache: Option<TtlCache<Artifact>>,
}

impl Generator {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            cache: None,
        }
    }

    pub fn with_cache(gateway: Arc<Gateway>, ttl: Duration) -> Self {
        Self {
            gateway,
            cache: Some(TtlCache::new(ttl)),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> genai_gateway::Result<Self> {
        let gateway = Arc::new(Gateway::from_config(config)?);
        Ok(match config.response_cache_ttl() {
            Some(ttl) => Self::with_cache(gateway, ttl),
            None => Self::new(gateway),
        })
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub async fn generate(&self, prompt: &str, schema_hint: &str) -> genai_gateway::Result<Artifact> {
        let Some(cache) = &self.cache else {
            return self.gateway.generate_structured(prompt, schema_hint).await;
        };
        let key = cache_key(prompt, schema_hint);
        if let Some(hit) = cache.get(&key) {
            debug!(schema = %schema_hint, "response cache hit");
            return Ok(hit);
        }
        let artifact = self.gateway.generate_structured(prompt, schema_hint).await?;
        cache.set(key, artifact.clone());
        Ok(artifact)
    }
}

fn cache_key(prompt: &str, schema_hint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(schema_hint.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}
