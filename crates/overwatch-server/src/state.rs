use std::sync::Arc;

use overwatch_core::config::Config;
use overwatch_core::sources::{CachedSource, HazardSource};
use overwatch_core::{Location, Orchestrator, ProfileStore, Runtime};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Cached hazard feeds served by `/api/feeds/{name}`.
    pub feeds: Arc<Vec<Arc<CachedSource>>>,
    /// Used when a request gives no coordinates.
    pub default_location: Location,
    /// Fallback profile for runs that do not send one.
    pub profiles: Option<Arc<dyn ProfileStore>>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        feeds: Vec<Arc<CachedSource>>,
        default_location: Location,
    ) -> Self {
        Self {
            orchestrator,
            feeds: Arc::new(feeds),
            default_location,
            profiles: None,
        }
    }

    pub fn from_runtime(runtime: Runtime, config: &Config) -> Self {
        Self::new(
            runtime.orchestrator,
            runtime.sources,
            config.pipeline.default_location.clone(),
        )
    }

    pub fn with_profiles(mut self, store: Arc<dyn ProfileStore>) -> Self {
        self.profiles = Some(store);
        self
    }

    pub fn feed(&self, name: &str) -> Option<Arc<CachedSource>> {
        self.feeds.iter().find(|f| f.name() == name).cloned()
    }
}
