use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use overwatch_core::error::OverwatchError;

/// An error that already knows its HTTP status, carried through `anyhow::Error`.
#[derive(Debug)]
struct StatusError {
    status: StatusCode,
    message: String,
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StatusError {}

/// Error returned by every handler. The body is `{"error": message}`.
///
/// Status comes from a `StatusError` when one was raised explicitly,
/// otherwise from the core error kind, otherwise 500.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn with_status(status: StatusCode, msg: impl Into<String>) -> Self {
        Self(
            StatusError {
                status,
                message: msg.into(),
            }
            .into(),
        )
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, msg)
    }

    fn status(&self) -> StatusCode {
        if let Some(e) = self.0.downcast_ref::<StatusError>() {
            return e.status;
        }
        match self.0.downcast_ref::<OverwatchError>() {
            Some(OverwatchError::UnknownSource(_)) => StatusCode::NOT_FOUND,
            Some(OverwatchError::InvalidConfig(_) | OverwatchError::ConfigNotFound(_)) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
