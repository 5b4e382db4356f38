use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use genai_gateway::Artifact;
use serde_json::{json, Value};
use tracing::warn;

use super::{Aggregator, RunContext};
use crate::config::PlacesConfig;
use crate::generator::Generator;
use crate::pipeline::JobKey;
use crate::prompts::{evacuation_prompt, EVACUATION_SCHEMA};
use crate::sources::{Facility, PlacesService};

/// Nearby facilities, a route to each, and model recommendations.
///
/// The artifact is `{ facilities, routes, recommendations }`. A places
/// failure leaves `facilities` empty; a route failure leaves that route
/// `null`. Neither fails the job.
pub struct EvacuationAggregator {
    generator: Arc<Generator>,
    places: Option<Arc<dyn PlacesService>>,
    config: PlacesConfig,
}

impl EvacuationAggregator {
    pub fn new(
        generator: Arc<Generator>,
        places: Option<Arc<dyn PlacesService>>,
        config: PlacesConfig,
    ) -> Self {
        Self {
            generator,
            places,
            config,
        }
    }

    async fn facilities(&self, ctx: &RunContext) -> Vec<Facility> {
        let Some(places) = &self.places else {
            warn!("no places service configured, evacuating without facilities");
            return Vec::new();
        };
        match places
            .nearby(
                ctx.location.lat,
                ctx.location.lon,
                &self.config.categories,
                self.config.radius_m,
            )
            .await
        {
            Ok(mut found) => {
                found.truncate(self.config.max_facilities);
                found
            }
            Err(e) => {
                warn!(source = "places", reason = %e, "facility lookup failed, continuing without it");
                Vec::new()
            }
        }
    }

    async fn routes(&self, ctx: &RunContext, facilities: &[Facility]) -> Vec<Value> {
        let Some(places) = &self.places else {
            return Vec::new();
        };
        let mode = self.config.route_mode.as_str();
        let lookups = facilities.iter().map(|facility| async move {
            let route = match places.route(&ctx.location, facility, mode).await {
                Ok(route) => route,
                Err(e) => {
                    warn!(source = "routing", facility = %facility.name, reason = %e, "route lookup failed");
                    Value::Null
                }
            };
            json!({ "facility": facility.name, "route": route })
        });
        join_all(lookups).await
    }
}

#[async_trait]
impl Aggregator for EvacuationAggregator {
    fn key(&self) -> JobKey {
        JobKey::Evacuation
    }

    async fn run(&self, ctx: &RunContext) -> genai_gateway::Result<Artifact> {
        let facilities = self.facilities(ctx).await;
        let routes = self.routes(ctx, &facilities).await;
        let prompt = evacuation_prompt(
            &ctx.location,
            ctx.risk_or_null(),
            ctx.profile.as_ref(),
            &facilities,
        );
        let recommendations = self.generator.generate(&prompt, EVACUATION_SCHEMA).await?;
        Ok(json!({
            "facilities": facilities,
            "routes": routes,
            "recommendations": recommendations,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::profile::Location;
    use crate::testing::{gateway, RecordingTransport};
    use genai_gateway::Completion;

    struct FakePlaces {
        facilities: Option<Vec<Facility>>,
        broken_route: &'static str,
    }

    #[async_trait]
    impl PlacesService for FakePlaces {
        async fn nearby(
            &self,
            _lat: f64,
            _lon: f64,
            _categories: &[String],
            _radius_m: u32,
        ) -> Result<Vec<Facility>, FetchError> {
            self.facilities
                .clone()
                .ok_or_else(|| FetchError::NotConfigured("places".into()))
        }

        async fn route(
            &self,
            _from: &Location,
            to: &Facility,
            _mode: &str,
        ) -> Result<Value, FetchError> {
            if to.name == self.broken_route {
                Err(FetchError::Status {
                    source_name: "routing".into(),
                    status: 500,
                })
            } else {
                Ok(json!({"distance": 1200}))
            }
        }
    }

    fn facility(name: &str) -> Facility {
        Facility {
            name: name.into(),
            category: "education.school".into(),
            lat: 14.6,
            lon: 121.0,
            address: None,
        }
    }

    fn ctx() -> RunContext {
        RunContext::new(Location::new("Pasig", 14.57, 121.08), None)
            .with_risk(json!({"riskLevel": "moderate"}))
    }

    fn generator(transport: Arc<RecordingTransport>) -> Arc<Generator> {
        Arc::new(Generator::new(gateway(transport)))
    }

    #[tokio::test]
    async fn caps_facilities_and_isolates_route_failures() {
        let transport = RecordingTransport::new(|_| {
            Ok(Completion::text(r#"{"recommendations":["go north"],"topFacilities":[]}"#))
        });
        let places = FakePlaces {
            facilities: Some((0..8).map(|i| facility(&format!("F{i}"))).collect()),
            broken_route: "F1",
        };
        let config = PlacesConfig {
            max_facilities: 3,
            ..PlacesConfig::default()
        };
        let artifact = EvacuationAggregator::new(
            generator(transport.clone()),
            Some(Arc::new(places)),
            config,
        )
        .run(&ctx())
        .await
        .unwrap();

        assert_eq!(artifact["facilities"].as_array().unwrap().len(), 3);
        let routes = artifact["routes"].as_array().unwrap();
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[0]["route"]["distance"], 1200);
        assert_eq!(routes[1]["route"], Value::Null);
        assert_eq!(artifact["recommendations"]["recommendations"][0], "go north");
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn places_failure_still_calls_gateway_once() {
        let transport = RecordingTransport::new(|_| Ok(Completion::text("{}")));
        let places = FakePlaces {
            facilities: None,
            broken_route: "",
        };
        let artifact = EvacuationAggregator::new(
            generator(transport.clone()),
            Some(Arc::new(places)),
            PlacesConfig::default(),
        )
        .run(&ctx())
        .await
        .unwrap();

        assert_eq!(artifact["facilities"], json!([]));
        assert_eq!(artifact["routes"], json!([]));
        assert_eq!(transport.schemas(), vec![EVACUATION_SCHEMA.to_string()]);
    }

    #[tokio::test]
    async fn runs_without_a_places_service() {
        let transport = RecordingTransport::new(|_| Ok(Completion::text("{}")));
        let artifact =
            EvacuationAggregator::new(generator(transport.clone()), None, PlacesConfig::default())
                .run(&ctx())
                .await
                .unwrap();
        assert_eq!(artifact["facilities"], json!([]));
        assert_eq!(transport.calls().len(), 1);
    }
}
