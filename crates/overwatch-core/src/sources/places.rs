use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PlacesConfig;
use crate::error::{FetchError, Result};
use crate::profile::Location;

const PLACES: &str = "places";
const ROUTING: &str = "routing";

/// Facility page size requested from the places API.
const PLACES_LIMIT: u32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub name: String,
    pub category: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Nearby facilities and routes to them. Used by the evacuation aggregator.
#[async_trait]
pub trait PlacesService: Send + Sync {
    async fn nearby(
        &self,
        lat: f64,
        lon: f64,
        categories: &[String],
        radius_m: u32,
    ) -> std::result::Result<Vec<Facility>, FetchError>;

    /// Route geometry from `from` to `to`, as returned by the provider.
    async fn route(
        &self,
        from: &Location,
        to: &Facility,
        mode: &str,
    ) -> std::result::Result<Value, FetchError>;
}

// ---------------------------------------------------------------------------
// Geoapify
// ---------------------------------------------------------------------------

pub struct GeoapifyPlaces {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeoapifyPlaces {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &PlacesConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new(
            client,
            config.base_url.clone(),
            config.api_key.clone(),
        ))
    }

    fn key(&self) -> std::result::Result<&str, FetchError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| FetchError::NotConfigured("places api key".to_string()))
    }

    async fn get(
        &self,
        name: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<Value, FetchError> {
        let key = self.key()?;
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .query(&[("apiKey", key)])
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
        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::decode(name, e.to_string()))
    }
}

/// Convert one GeoJSON feature from the places API. Features without point
/// coordinates are skipped.
fn facility_from_feature(feature: &Value, categories: &[String]) -> Option<Facility> {
    let coords = feature.pointer("/geometry/coordinates")?.as_array()?;
    let lon = coords.first()?.as_f64()?;
    let lat = coords.get(1)?.as_f64()?;
    let props = feature.get("properties");
    let text = |field: &str| {
        props
            .and_then(|p| p.get(field))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let category = props
        .and_then(|p| p.get("categories"))
        .and_then(Value::as_array)
        .and_then(|cats| {
            cats.iter()
                .filter_map(Value::as_str)
                .find(|c| categories.iter().any(|want| want == c))
        })
        .map(str::to_string)
        .unwrap_or_default();
    let name = text("name")
        .or_else(|| text("address_line1"))
        .unwrap_or_else(|| "Unnamed facility".to_string());
    Some(Facility {
        name,
        category,
        lat,
        lon,
        address: text("formatted"),
    })
}

#[async_trait]
impl PlacesService for GeoapifyPlaces {
    async fn nearby(
        &self,
        lat: f64,
        lon: f64,
        categories: &[String],
        radius_m: u32,
    ) -> std::result::Result<Vec<Facility>, FetchError> {
        let body = self
            .get(
                PLACES,
                "/v2/places",
                &[
                    ("categories", categories.join(",")),
                    ("filter", format!("circle:{lon},{lat},{radius_m}")),
                    ("limit", PLACES_LIMIT.to_string()),
                ],
            )
            .await?;
        let features = body
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::decode(PLACES, "response has no features"))?;
        Ok(features
            .iter()
            .filter_map(|f| facility_from_feature(f, categories))
            .collect())
    }

    async fn route(
        &self,
        from: &Location,
        to: &Facility,
        mode: &str,
    ) -> std::result::Result<Value, FetchError> {
        self.get(
            ROUTING,
            "/v1/routing",
            &[
                (
                    "waypoints",
                    format!("{},{}|{},{}", from.lat, from.lon, to.lat, to.lon),
                ),
                ("mode", mode.to_string()),
            ],
        )
        .await
    }
}
