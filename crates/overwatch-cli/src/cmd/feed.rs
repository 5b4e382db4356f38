use crate::output::print_json;
use anyhow::anyhow;
use overwatch_core::runtime::hazard_sources;
use overwatch_core::sources::HazardSource;
use overwatch_core::{Location, TtlCache};
use std::path::Path;
use std::sync::Arc;

use super::load_config;

pub fn run(
    config_path: &Path,
    name: &str,
    coords: Option<(f64, f64)>,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let cache = Arc::new(TtlCache::new(config.cache.default_ttl()));
    let feeds = hazard_sources(&config, &cache)?;

    let Some(feed) = feeds.iter().find(|f| f.name() == name) else {
        let known: Vec<&str> = feeds.iter().map(|f| f.name()).collect();
        return Err(anyhow!(
            "unknown feed '{name}' (available: {})",
            known.join(", ")
        ));
    };
    let location = match coords {
        Some((lat, lon)) => Location::new(format!("{lat},{lon}"), lat, lon),
        None => config.pipeline.default_location.clone(),
    };

    let rt = tokio::runtime::Runtime::new()?;
    let (data, cached) = rt.block_on(feed.fetch_with_meta(&location))?;
    if json {
        print_json(&serde_json::json!({ "source": name, "cached": cached, "data": data }))
    } else {
        print_json(&data)
    }
}
