use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::aggregate::{
    Aggregator, CommsAggregator, EvacuationAggregator, RiskAggregator, SuppliesAggregator,
};
use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::Result;
use crate::generator::Generator;
use crate::pipeline::Orchestrator;
use crate::sources::http::OPEN_METEO;
use crate::sources::{self, CachedSource, GeoapifyPlaces, PlacesService, SharedSource};

/// Every hazard feed, wrapped in `cache` with the configured TTL.
pub fn hazard_sources(
    config: &Config,
    cache: &Arc<TtlCache<Value>>,
) -> Result<Vec<Arc<CachedSource>>> {
    let raw = sources::build_sources(&config.sources)?;
    Ok(sources::cached(raw, cache, config.sources_ttl()))
}

/// The assembled services behind `overwatch run` and `overwatch serve`.
pub struct Runtime {
    /// Cached hazard feeds, shared by the risk job and `/api/feeds`.
    pub sources: Vec<Arc<CachedSource>>,
    pub generator: Arc<Generator>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Runtime {
    /// Wire sources, places, the gateway and the four aggregators from
    /// `config`. Fails only when the gateway cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache = Arc::new(TtlCache::new(config.cache.default_ttl()));
        let sources = hazard_sources(config, &cache)?;
        let shared = sources::shared(&sources);
        let generator = Arc::new(Generator::from_config(&config.gateway)?);

        let places: Option<Arc<dyn PlacesService>> = if config.places.api_key.is_some() {
            Some(Arc::new(GeoapifyPlaces::from_config(
                &config.places,
                config.sources.fetch_timeout(),
            )?))
        } else {
            warn!("places api key not set, evacuation runs without facilities");
            None
        };

        // Supplies reads the forecast again; the cache serves it from the
        // risk run.
        let forecast: Vec<SharedSource> = sources::find_source(&shared, OPEN_METEO)
            .into_iter()
            .collect();

        let risk = Arc::new(RiskAggregator::new(
            shared,
            config.sources.budget.clone(),
            generator.clone(),
        ));
        let stage_two: Vec<Arc<dyn Aggregator>> = vec![
            Arc::new(
                SuppliesAggregator::new(generator.clone())
                    .with_sources(forecast, config.sources.budget.clone()),
            ),
            Arc::new(EvacuationAggregator::new(
                generator.clone(),
                places,
                config.places.clone(),
            )),
            Arc::new(CommsAggregator::new(generator.clone())),
        ];
        let orchestrator = Arc::new(Orchestrator::new(
            risk,
            stage_two,
            config.pipeline.stage_two,
            config.pipeline.event_capacity,
        ));

        info!(
            sources = sources.len(),
            policy = ?config.pipeline.stage_two,
            model = %config.gateway.model,
            "runtime assembled"
        );
        Ok(Self {
            sources,
            generator,
            orchestrator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OverwatchError;
    use genai_gateway::GatewayError;

    #[test]
    fn missing_gateway_key_is_a_configuration_error() {
        let config = Config::default();
        match Runtime::from_config(&config) {
            Err(OverwatchError::Gateway(GatewayError::Configuration(_))) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("runtime built without an api key"),
        }
    }

    #[test]
    fn assembles_with_key_and_shares_cached_sources() {
        let mut config = Config::default();
        config.gateway.api_key = Some("test".into());
        config.sources.scraper_url = Some("http://localhost:3001".into());
        let runtime = Runtime::from_config(&config).unwrap();
        assert_eq!(runtime.sources.len(), 9);
        assert!(!runtime.orchestrator.is_running());
        assert_eq!(runtime.orchestrator.policy(), config.pipeline.stage_two);
    }

    #[test]
    fn hazard_sources_do_not_need_the_gateway() {
        let config = Config::default();
        let cache = Arc::new(TtlCache::default());
        let sources = hazard_sources(&config, &cache).unwrap();
        assert_eq!(sources.len(), 5);
    }
}
