use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use overwatch_core::{Location, PipelineSnapshot, Profile, RunOutcome};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub profile: Option<Profile>,
}

/// GET /api/pipeline — latest pipeline snapshot.
pub async fn get_pipeline(State(app): State<AppState>) -> Json<PipelineSnapshot> {
    Json(app.orchestrator.snapshot())
}

/// POST /api/pipeline/run — start a run in the background.
///
/// Returns 202 immediately; progress is on `/api/events`. A run that is
/// already active yields 409.
pub async fn run_pipeline(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    // An empty body runs for the default location.
    let request: RunRequest = if body.is_empty() {
        RunRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::bad_request(format!("invalid run request: {e}")))?
    };
    if app.orchestrator.is_running() {
        return Err(AppError::conflict("pipeline run already in progress"));
    }

    let location = request
        .location
        .unwrap_or_else(|| app.default_location.clone());
    if !location.in_range() {
        return Err(AppError::bad_request(format!(
            "coordinates out of range: {}, {}",
            location.lat, location.lon
        )));
    }
    let profile = match (request.profile, &app.profiles) {
        (Some(p), _) => Some(p),
        (None, Some(store)) => store.load().await,
        (None, None) => None,
    };

    info!(location = %location.name, "pipeline run requested");
    let orchestrator = app.orchestrator.clone();
    tokio::spawn(async move {
        if orchestrator.run_all(location, profile).await == RunOutcome::Skipped {
            warn!("pipeline run skipped, another run started first");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "started" })),
    ))
}
