use std::sync::Arc;

use async_trait::async_trait;
use genai_gateway::Artifact;

use super::{Aggregator, RunContext};
use crate::generator::Generator;
use crate::pipeline::JobKey;
use crate::prompts::{comms_prompt, COMMS_SCHEMA};

/// Bilingual Filipino/English message drafts.
pub struct CommsAggregator {
    generator: Arc<Generator>,
}

impl CommsAggregator {
    pub fn new(generator: Arc<Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Aggregator for CommsAggregator {
    fn key(&self) -> JobKey {
        JobKey::Comms
    }

    async fn run(&self, ctx: &RunContext) -> genai_gateway::Result<Artifact> {
        let prompt = comms_prompt(&ctx.location, ctx.risk_or_null(), ctx.profile.as_ref());
        self.generator.generate(&prompt, COMMS_SCHEMA).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Location;
    use crate::testing::{gateway, RecordingTransport};
    use genai_gateway::Completion;
    use serde_json::json;

    #[tokio::test]
    async fn drafts_come_back_as_the_artifact() {
        let transport = RecordingTransport::new(|_| {
            Ok(Completion::text(
                "```json\n{\"sms\":\"Ligtas kami sa Marikina\",\"barangayNotice\":\"\",\"socialPost\":\"\",\"meetingPlan\":\"\"}\n```",
            ))
        });
        let generator = Arc::new(Generator::new(gateway(transport.clone())));
        let ctx = RunContext::new(Location::new("Marikina", 14.65, 121.1), None)
            .with_risk(json!({"recommendations": ["Marikina Sports Center"]}));

        let drafts = CommsAggregator::new(generator).run(&ctx).await.unwrap();
        assert_eq!(drafts["sms"], "Ligtas kami sa Marikina");
        assert!(transport.calls()[0].prompt.contains("Marikina Sports Center"));
    }
}
