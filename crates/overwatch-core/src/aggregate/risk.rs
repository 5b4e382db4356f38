use std::sync::Arc;

use async_trait::async_trait;
use genai_gateway::Artifact;
use tracing::info;

use super::{Aggregator, RunContext};
use crate::config::Budget;
use crate::generator::Generator;
use crate::pipeline::JobKey;
use crate::prompts::{risk_prompt, RISK_SCHEMA};
use crate::sources::{fan_out, merge, SharedSource};

/// Stage 1: every hazard feed, merged into one risk prompt.
pub struct RiskAggregator {
    sources: Vec<SharedSource>,
    budget: Budget,
    generator: Arc<Generator>,
}

impl RiskAggregator {
    pub fn new(sources: Vec<SharedSource>, budget: Budget, generator: Arc<Generator>) -> Self {
        Self {
            sources,
            budget,
            generator,
        }
    }
}

#[async_trait]
impl Aggregator for RiskAggregator {
    fn key(&self) -> JobKey {
        JobKey::Risk
    }

    async fn run(&self, ctx: &RunContext) -> genai_gateway::Result<Artifact> {
        let results = fan_out(&self.sources, &ctx.location).await;
        let available = results.iter().filter(|r| r.is_ok()).count();
        info!(
            location = %ctx.location.name,
            available,
            total = results.len(),
            "hazard sources gathered"
        );
        let merged = merge(results, &self.budget);
        self.generator
            .generate(&risk_prompt(&ctx.location, &merged), RISK_SCHEMA)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Location;
    use crate::sources::testing::StubSource;
    use crate::testing::{gateway, RecordingTransport};
    use genai_gateway::{Completion, GatewayError};
    use serde_json::json;

    fn ctx() -> RunContext {
        RunContext::new(Location::new("Marikina", 14.65, 121.1), None)
    }

    #[tokio::test]
    async fn failing_source_is_null_and_gateway_is_called_once() {
        let transport =
            RecordingTransport::new(|_| Ok(Completion::text(r#"{"riskLevel":"high"}"#)));
        let generator = Arc::new(Generator::new(gateway(transport.clone())));
        let sources: Vec<SharedSource> = vec![
            StubSource::ok("weather", json!({"rain": 80})),
            StubSource::failing("usgs"),
            StubSource::ok("eonet", json!({"events": []})),
        ];

        let artifact = RiskAggregator::new(sources, Budget::default(), generator)
            .run(&ctx())
            .await
            .unwrap();

        assert_eq!(artifact["riskLevel"], "high");
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].schema_hint, RISK_SCHEMA);
        assert!(calls[0].prompt.contains(r#""usgs":null"#));
        assert!(calls[0].prompt.contains(r#""rain":80"#));
    }

    #[tokio::test]
    async fn gateway_failure_fails_the_aggregator() {
        let transport = RecordingTransport::new(|_| {
            Err(GatewayError::UpstreamRejected {
                status: 400,
                body: "bad".into(),
            })
        });
        let generator = Arc::new(Generator::new(gateway(transport)));
        let err = RiskAggregator::new(Vec::new(), Budget::default(), generator)
            .run(&ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamRejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn payloads_are_trimmed_before_prompting() {
        let transport = RecordingTransport::new(|_| Ok(Completion::text("{}")));
        let generator = Arc::new(Generator::new(gateway(transport.clone())));
        let long: Vec<i32> = (0..100).collect();
        let sources: Vec<SharedSource> = vec![StubSource::ok("usgs", json!({"features": long}))];
        let budget = Budget {
            max_items: 3,
            max_text_chars: 10,
        };
        RiskAggregator::new(sources, budget, generator)
            .run(&ctx())
            .await
            .unwrap();
        assert!(transport.calls()[0].prompt.contains(r#""features":[0,1,2]"#));
    }
}
