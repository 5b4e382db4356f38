use std::sync::Arc;

use async_trait::async_trait;
use genai_gateway::Artifact;
use serde_json::Map;

use super::{Aggregator, RunContext};
use crate::config::Budget;
use crate::generator::Generator;
use crate::pipeline::JobKey;
use crate::prompts::{supplies_prompt, SUPPLIES_SCHEMA};
use crate::sources::{fan_out, merge, SharedSource};

/// Supply checklist from the risk artifact and the household profile.
pub struct SuppliesAggregator {
    generator: Arc<Generator>,
    extra_sources: Vec<SharedSource>,
    budget: Budget,
}

impl SuppliesAggregator {
    pub fn new(generator: Arc<Generator>) -> Self {
        Self {
            generator,
            extra_sources: Vec::new(),
            budget: Budget::default(),
        }
    }

    /// Also include these feeds in the prompt.
    pub fn with_sources(mut self, sources: Vec<SharedSource>, budget: Budget) -> Self {
        self.extra_sources = sources;
        self.budget = budget;
        self
    }
}

#[async_trait]
impl Aggregator for SuppliesAggregator {
    fn key(&self) -> JobKey {
        JobKey::Supplies
    }

    async fn run(&self, ctx: &RunContext) -> genai_gateway::Result<Artifact> {
        let extra = if self.extra_sources.is_empty() {
            Map::new()
        } else {
            merge(fan_out(&self.extra_sources, &ctx.location).await, &self.budget)
        };
        let prompt = supplies_prompt(ctx.risk_or_null(), ctx.profile.as_ref(), &extra);
        self.generator.generate(&prompt, SUPPLIES_SCHEMA).await
    }
}
