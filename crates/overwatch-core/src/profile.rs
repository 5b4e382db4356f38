use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// The place the pipeline is run for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
        }
    }

    /// Stable key fragment for per-coordinate cache entries.
    pub fn cache_suffix(&self) -> String {
        format!("{:.3},{:.3}", self.lat, self.lon)
    }

    /// Latitude within ±90 and longitude within ±180.
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Household {
    #[serde(default)]
    pub adults: u32,
    #[serde(default)]
    pub children: u32,
    #[serde(default)]
    pub elderly: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub relationship: String,
}

/// Household profile merged verbatim into prompts.
///
/// The pipeline never interprets these fields; unknown keys are kept in
/// `extra` so nothing the profile store returns is dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub household: Household,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pets: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_hours: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emergency_contacts: Vec<EmergencyContact>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// ProfileStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// The stored profile, or `None` when the user has not created one.
    async fn load(&self) -> Option<Profile>;
}

/// Profile kept in a YAML (or JSON) file on disk.
pub struct FileProfileStore {
    path: PathBuf,
}

impl FileProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Strict variant of [`ProfileStore::load`]: a missing file is `Ok(None)`,
    /// an unreadable or malformed one is an error.
    pub fn read(&self) -> Result<Option<Profile>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        // YAML is a superset of JSON, one parser covers both.
        let profile: Profile = serde_yaml::from_str(&data)?;
        Ok(Some(profile))
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn load(&self) -> Option<Profile> {
        match self.read() {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "profile unreadable, continuing without it");
                None
            }
        }
    }
}
