//! Test doubles shared by the core test modules.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use genai_gateway::{Completion, Gateway, GatewayRequest, RetryPolicy, Transport};

type Reply = Box<dyn Fn(&GatewayRequest) -> genai_gateway::Result<Completion> + Send + Sync>;

/// One recorded transport call.
#[derive(Debug, Clone)]
pub struct Call {
    pub schema_hint: String,
    pub prompt: String,
}

/// Transport that answers through a closure and records every request.
pub struct RecordingTransport {
    reply: Reply,
    latency: Duration,
    calls: Mutex<Vec<Call>>,
}

impl RecordingTransport {
    pub fn new(
        reply: impl Fn(&GatewayRequest) -> genai_gateway::Result<Completion> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_latency(reply, Duration::ZERO)
    }

    pub fn with_latency(
        reply: impl Fn(&GatewayRequest) -> genai_gateway::Result<Completion> + Send + Sync + 'static,
        latency: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            latency,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn schemas(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.schema_hint).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn complete(&self, request: &GatewayRequest) -> genai_gateway::Result<Completion> {
        self.calls.lock().unwrap().push(Call {
            schema_hint: request.schema_hint.clone(),
            prompt: request.prompt_text.clone(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.reply)(request)
    }
}

/// Gateway over `transport` with one attempt and no spacing.
pub fn gateway(transport: Arc<RecordingTransport>) -> Arc<Gateway> {
    spaced_gateway(transport, Duration::ZERO)
}

/// Gateway over `transport` with one attempt and `min_interval` between calls.
pub fn spaced_gateway(transport: Arc<RecordingTransport>, min_interval: Duration) -> Arc<Gateway> {
    let policy = RetryPolicy {
        max_attempts: 1,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
    };
    Arc::new(Gateway::new(transport, policy, min_interval))
}
