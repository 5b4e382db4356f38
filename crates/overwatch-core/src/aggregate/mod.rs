//! The four analysis jobs.
//!
//! Each aggregator gathers its upstream inputs with per-source fault
//! tolerance, builds one prompt, and makes exactly one gateway call. Only
//! the gateway call can fail the aggregator.

mod comms;
mod evacuation;
mod risk;
mod supplies;

pub use comms::CommsAggregator;
pub use evacuation::EvacuationAggregator;
pub use risk::RiskAggregator;
pub use supplies::SuppliesAggregator;

use async_trait::async_trait;
use genai_gateway::Artifact;
use serde_json::Value;

use crate::pipeline::JobKey;
use crate::profile::{Location, Profile};

/// Inputs shared by every job of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub location: Location,
    pub profile: Option<Profile>,
    /// The risk artifact; set before any stage-2 job runs.
    pub risk: Option<Artifact>,
}

impl RunContext {
    pub fn new(location: Location, profile: Option<Profile>) -> Self {
        Self {
            location,
            profile,
            risk: None,
        }
    }

    pub fn with_risk(mut self, risk: Artifact) -> Self {
        self.risk = Some(risk);
        self
    }

    /// The risk artifact, or `null` outside stage 2.
    pub fn risk_or_null(&self) -> &Value {
        static NULL: Value = Value::Null;
        self.risk.as_ref().unwrap_or(&NULL)
    }
}

#[async_trait]
pub trait Aggregator: Send + Sync {
    fn key(&self) -> JobKey;

    async fn run(&self, ctx: &RunContext) -> genai_gateway::Result<Artifact>;
}
