use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::state::AppState;

/// GET /api/events — SSE stream of pipeline snapshots.
///
/// The current snapshot is sent first, then one `snapshot` event per
/// transition. Subscribers that lag simply miss intermediate snapshots.
pub async fn sse_events(State(app): State<AppState>) -> impl axum::response::IntoResponse {
    let rx = app.orchestrator.subscribe();
    let current = app.orchestrator.snapshot();
    let updates = BroadcastStream::new(rx).filter_map(|msg| msg.ok());
    let stream = tokio_stream::once(current)
        .chain(updates)
        .filter_map(|snapshot| Event::default().event("snapshot").json_data(&snapshot).ok())
        .map(Ok::<Event, Infallible>);
    Sse::new(stream).keep_alive(KeepAlive::default())
}
