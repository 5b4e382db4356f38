use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use super::{HazardSource, SharedSource};
use crate::config::SourcesConfig;
use crate::error::{FetchError, Result};
use crate::profile::Location;

pub const OPEN_METEO: &str = "open-meteo";
pub const USGS: &str = "usgs";
pub const EONET: &str = "eonet";
pub const GDACS: &str = "gdacs";
pub const RELIEFWEB: &str = "reliefweb";
pub const PAGASA_WEATHER: &str = "pagasa-weather";
pub const PAGASA_FLOOD: &str = "pagasa-flood";
pub const PHIVOLCS_EARTHQUAKES: &str = "phivolcs-earthquakes";
pub const PHIVOLCS_VOLCANOES: &str = "phivolcs-volcanoes";

const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";
const USGS_URL: &str = "https://earthquake.usgs.gov/fdsnws/event/1/query";
const EONET_URL: &str = "https://eonet.gsfc.nasa.gov/api/v3/events/geojson";
const GDACS_URL: &str = "https://www.gdacs.org/xml/rss.xml";
const RELIEFWEB_URL: &str = "https://api.reliefweb.int/v2/reports";

/// Philippine area of responsibility used by the regional feeds.
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

pub const PH_BBOX: BoundingBox = BoundingBox {
    min_lat: 4.5,
    max_lat: 21.5,
    min_lon: 116.0,
    max_lon: 127.0,
};

const HOURLY_FIELDS: &str =
    "temperature_2m,relative_humidity_2m,precipitation,windspeed_10m,windgusts_10m,pressure_msl,weathercode";
const DAILY_FIELDS: &str =
    "weathercode,temperature_2m_max,temperature_2m_min,precipitation_sum,windspeed_10m_max,windgusts_10m_max";

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn send(name: &str, request: RequestBuilder) -> std::result::Result<reqwest::Response, FetchError> {
    let response = request
        .send()
        .await
        .map_err(|e| FetchError::request(name, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            source_name: name.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

async fn get_json(name: &str, request: RequestBuilder) -> std::result::Result<Value, FetchError> {
    let text = send(name, request)
        .await?
        .text()
        .await
        .map_err(|e| FetchError::request(name, e))?;
    serde_json::from_str(&text).map_err(|e| FetchError::decode(name, e.to_string()))
}

async fn get_text(name: &str, request: RequestBuilder) -> std::result::Result<Value, FetchError> {
    let text = send(name, request)
        .await?
        .text()
        .await
        .map_err(|e| FetchError::request(name, e))?;
    Ok(Value::String(text))
}

// ---------------------------------------------------------------------------
// Open-Meteo
// ---------------------------------------------------------------------------

/// Seven-day hourly and daily forecast for the run location.
pub struct OpenMeteo {
    client: Client,
    url: String,
}

impl OpenMeteo {
    pub fn new(client: Client) -> Self {
        Self::with_url(client, OPEN_METEO_URL)
    }

    pub fn with_url(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl HazardSource for OpenMeteo {
    fn name(&self) -> &str {
        OPEN_METEO
    }

    fn cache_key(&self, location: &Location) -> String {
        format!("{OPEN_METEO}:{}", location.cache_suffix())
    }

    async fn fetch(&self, location: &Location) -> std::result::Result<Value, FetchError> {
        let request = self.client.get(&self.url).query(&[
            ("latitude", location.lat.to_string()),
            ("longitude", location.lon.to_string()),
            ("hourly", HOURLY_FIELDS.to_string()),
            ("daily", DAILY_FIELDS.to_string()),
            ("timezone", "Asia/Manila".to_string()),
            ("forecast_days", "7".to_string()),
        ]);
        get_json(OPEN_METEO, request).await
    }
}

// ---------------------------------------------------------------------------
// Regional feeds (fixed query, location independent)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum BodyKind {
    Json,
    Text,
}

/// A feed whose request does not depend on the run location.
pub struct RegionalFeed {
    name: &'static str,
    client: Client,
    url: String,
    query: Vec<(&'static str, String)>,
    body: BodyKind,
}

impl RegionalFeed {
    /// USGS earthquakes in the Philippine box, M2.5 and up, 50 most recent.
    pub fn usgs(client: Client, url: Option<&str>) -> Self {
        Self {
            name: USGS,
            client,
            url: url.unwrap_or(USGS_URL).to_string(),
            query: vec![
                ("format", "geojson".to_string()),
                ("minlatitude", PH_BBOX.min_lat.to_string()),
                ("maxlatitude", PH_BBOX.max_lat.to_string()),
                ("minlongitude", PH_BBOX.min_lon.to_string()),
                ("maxlongitude", PH_BBOX.max_lon.to_string()),
                ("minmagnitude", "2.5".to_string()),
                ("orderby", "time".to_string()),
                ("limit", "50".to_string()),
            ],
            body: BodyKind::Json,
        }
    }

    /// Open NASA EONET natural events inside the box.
    pub fn eonet(client: Client, url: Option<&str>) -> Self {
        let bbox = format!(
            "{},{},{},{}",
            PH_BBOX.min_lon, PH_BBOX.min_lat, PH_BBOX.max_lon, PH_BBOX.max_lat
        );
        Self {
            name: EONET,
            client,
            url: url.unwrap_or(EONET_URL).to_string(),
            query: vec![
                ("status", "open".to_string()),
                ("bbox", bbox),
                ("limit", "50".to_string()),
            ],
            body: BodyKind::Json,
        }
    }

    /// GDACS global alert RSS, passed through as text.
    pub fn gdacs(client: Client, url: Option<&str>) -> Self {
        Self {
            name: GDACS,
            client,
            url: url.unwrap_or(GDACS_URL).to_string(),
            query: Vec::new(),
            body: BodyKind::Text,
        }
    }

    /// Ten most recent ReliefWeb reports for the Philippines.
    pub fn reliefweb(client: Client, url: Option<&str>) -> Self {
        Self {
            name: RELIEFWEB,
            client,
            url: url.unwrap_or(RELIEFWEB_URL).to_string(),
            query: vec![
                ("appname", "overwatch-ai".to_string()),
                ("filter[field]", "country.name".to_string()),
                ("filter[value]", "Philippines".to_string()),
                ("sort[]", "date:desc".to_string()),
                ("limit", "10".to_string()),
            ],
            body: BodyKind::Json,
        }
    }
}

#[async_trait]
impl HazardSource for RegionalFeed {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self, _location: &Location) -> std::result::Result<Value, FetchError> {
        let request = self.client.get(&self.url).query(&self.query);
        match self.body {
            BodyKind::Json => get_json(self.name, request).await,
            BodyKind::Text => get_text(self.name, request).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Scraper backend feeds
// ---------------------------------------------------------------------------

/// PAGASA / PHIVOLCS data served by the scraper backend as
/// `{ ok, data, meta }`.
pub struct ScraperFeed {
    name: &'static str,
    client: Client,
    url: String,
}

impl ScraperFeed {
    pub fn new(name: &'static str, path: &str, client: Client, base_url: &str) -> Self {
        Self {
            name,
            client,
            url: format!("{}/api/scrape/{path}", base_url.trim_end_matches('/')),
        }
    }

    /// The four feeds the scraper backend exposes.
    pub fn all(client: &Client, base_url: &str) -> Vec<Self> {
        [
            (PAGASA_WEATHER, "pagasa/weather"),
            (PAGASA_FLOOD, "pagasa/flood"),
            (PHIVOLCS_EARTHQUAKES, "phivolcs/earthquakes"),
            (PHIVOLCS_VOLCANOES, "phivolcs/volcanoes"),
        ]
        .into_iter()
        .map(|(name, path)| Self::new(name, path, client.clone(), base_url))
        .collect()
    }
}

#[async_trait]
impl HazardSource for ScraperFeed {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self, _location: &Location) -> std::result::Result<Value, FetchError> {
        let mut envelope = get_json(self.name, self.client.get(&self.url)).await?;
        if envelope.get("ok").and_then(Value::as_bool) == Some(false) {
            let message = envelope
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("scraper reported failure");
            return Err(FetchError::decode(self.name, message));
        }
        match envelope.get_mut("data") {
            Some(data) => Ok(data.take()),
            None => Err(FetchError::decode(self.name, "envelope has no data field")),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// HTTP client shared by all feeds, bounded by the per-fetch timeout.
pub fn client(config: &SourcesConfig) -> Result<Client> {
    let client = Client::builder()
        .timeout(config.fetch_timeout())
        .user_agent(concat!("overwatch/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Every hazard feed enabled in `config`, in prompt order.
///
/// Scraper feeds are only included when `scraper_url` is set.
pub fn build_sources(config: &SourcesConfig) -> Result<Vec<SharedSource>> {
    let client = client(config)?;
    let mut sources: Vec<SharedSource> = vec![
        Arc::new(OpenMeteo::new(client.clone())),
        Arc::new(RegionalFeed::usgs(client.clone(), None)),
        Arc::new(RegionalFeed::eonet(client.clone(), None)),
        Arc::new(RegionalFeed::gdacs(client.clone(), None)),
        Arc::new(RegionalFeed::reliefweb(client.clone(), None)),
    ];
    if let Some(base) = config.scraper_url.as_deref() {
        for feed in ScraperFeed::all(&client, base) {
            sources.push(Arc::new(feed));
        }
    }
    sources.retain(|s| config.is_enabled(s.name()));
    Ok(sources)
}

pub fn find_source(sources: &[SharedSource], name: &str) -> Option<SharedSource> {
    sources.iter().find(|s| s.name() == name).cloned()
}
