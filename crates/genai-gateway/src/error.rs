use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Connection, DNS, TLS or timeout failure before a status was received.
    #[error("network error: {0}")]
    Network(String),

    /// HTTP 429 or 503 from the backend.
    #[error("rate limited by backend (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("backend rejected request with HTTP {status}: {body}")]
    UpstreamRejected { status: u16, body: String },

    #[error("backend returned no usable content (finish reason: {reason})")]
    EmptyResponse { reason: String },

    #[error("backend returned non-JSON output (expected {schema_hint})\n  preview: {preview}")]
    SchemaParse {
        preview: String,
        schema_hint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("gateway misconfigured: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Only transport-level failures and load shedding are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }

    /// Map a non-2xx status to its error kind.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            429 | 503 => Self::RateLimited { status },
            _ => Self::UpstreamRejected {
                status,
                body: body.into(),
            },
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Network(format!("request timed out: {err}"))
        } else if err.is_connect() {
            GatewayError::Network(format!("connection failed: {err}"))
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}
