use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::GatewayConfig;
use crate::lane::Lane;
use crate::parse::parse_structured;
use crate::transport::{GeminiTransport, Transport};
use crate::{Artifact, Result};

// ─── GatewayRequest ───────────────────────────────────────────────────────

/// One logical generation call. Lives only for the duration of the call,
/// retries included; `attempt` is the zero-based index of the current try.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    pub prompt_text: String,
    pub schema_hint: String,
    pub attempt: u32,
}

impl GatewayRequest {
    pub fn new(prompt_text: impl Into<String>, schema_hint: impl Into<String>) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            schema_hint: schema_hint.into(),
            attempt: 0,
        }
    }
}

// ─── RetryPolicy ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total tries including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        GatewayConfig::default().retry_policy()
    }
}

impl RetryPolicy {
    /// Sleep before retrying after the try at index `attempt` failed:
    /// `min(initial_delay * 2^attempt, max_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

// ─── Gateway ──────────────────────────────────────────────────────────────

/// The single funnel for generative-text calls.
///
/// Every call waits its turn on one [`Lane`], so at most one request is in
/// flight per gateway and consecutive requests are spaced by the lane's
/// minimum interval. Inside its turn a call retries transient failures
/// (network, HTTP 429/503) with capped exponential backoff. Everything
/// else, including unparseable output, fails on the spot.
///
/// Share one instance per process behind an `Arc`.
pub struct Gateway {
    transport: Arc<dyn Transport>,
    lane: Lane,
    policy: RetryPolicy,
}

impl Gateway {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, min_interval: Duration) -> Self {
        Self {
            transport,
            lane: Lane::new(min_interval),
            policy,
        }
    }

    /// Build a gateway talking to the Gemini `generateContent` endpoint.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let transport = GeminiTransport::from_config(config)?;
        Ok(Self::new(
            Arc::new(transport),
            config.retry_policy(),
            config.min_interval(),
        ))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generate a structured artifact for `prompt_text`.
    ///
    /// `schema_hint` names the expected shape; it is reported back in
    /// `SchemaParse` errors.
    pub async fn generate_structured(
        &self,
        prompt_text: &str,
        schema_hint: &str,
    ) -> Result<Artifact> {
        let mut request = GatewayRequest::new(prompt_text, schema_hint);
        let _ticket = self.lane.acquire().await;
        let attempts = self.policy.attempts();

        loop {
            debug!(schema = %schema_hint, attempt = request.attempt, "gateway call");
            let outcome = self
                .transport
                .complete(&request)
                .await
                .and_then(|completion| completion.into_text());

            match outcome {
                Ok(text) => {
                    let parsed = parse_structured(&text, schema_hint);
                    if let Err(e) = &parsed {
                        error!(schema = %schema_hint, error = %e, "gateway response unparseable");
                    }
                    return parsed;
                }
                Err(e) if e.is_retryable() && request.attempt + 1 < attempts => {
                    let delay = self.policy.delay_for(request.attempt);
                    warn!(
                        schema = %schema_hint,
                        attempt = request.attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "gateway call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    request.attempt += 1;
                }
                Err(e) => {
                    error!(
                        schema = %schema_hint,
                        attempts = request.attempt + 1,
                        error = %e,
                        "gateway call failed"
                    );
                    return Err(e);
                }
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
