use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use overwatch_core::Location;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// GET /api/feeds/{name} — one hazard feed through the TTL cache.
///
/// Success: `{ok: true, data, meta: {cached}}`. Upstream failure: 500 with
/// a retryable `SOURCE_ERROR` envelope.
pub async fn get_feed(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<FeedQuery>,
) -> Result<Response, AppError> {
    let feed = app
        .feed(&name)
        .ok_or_else(|| AppError::not_found(format!("unknown feed '{name}'")))?;
    let location = match (query.lat, query.lon) {
        (Some(lat), Some(lon)) => Location::new(format!("{lat},{lon}"), lat, lon),
        (None, None) => app.default_location.clone(),
        _ => return Err(AppError::bad_request("lat and lon must be given together")),
    };

    let response = match feed.fetch_with_meta(&location).await {
        Ok((data, cached)) => Json(json!({
            "ok": true,
            "data": data,
            "meta": { "cached": cached },
        }))
        .into_response(),
        Err(e) => {
            warn!(source = %name, error = %e, "feed fetch failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "ok": false,
                    "error": {
                        "code": "SOURCE_ERROR",
                        "message": e.to_string(),
                        "source": name,
                        "retryable": true,
                    },
                    "data": null,
                    "meta": {},
                })),
            )
                .into_response()
        }
    };
    Ok(response)
}
