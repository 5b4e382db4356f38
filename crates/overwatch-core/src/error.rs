use genai_gateway::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OverwatchError {
    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown hazard source: {0}")]
    UnknownSource(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, OverwatchError>;

/// Failure of a single upstream collaborator (hazard feed, places, routing).
///
/// Absorbed inside aggregators: it becomes a `null` slot in the merged
/// payload and a log line, never a job failure.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{source_name} request failed: {message}")]
    Request {
        source_name: String,
        message: String,
    },

    #[error("{source_name} returned HTTP {status}")]
    Status { source_name: String, status: u16 },

    #[error("{source_name} returned an unreadable body: {message}")]
    Decode {
        source_name: String,
        message: String,
    },

    #[error("{0} is not configured")]
    NotConfigured(String),
}

impl FetchError {
    pub fn request(source_name: &str, err: reqwest::Error) -> Self {
        Self::Request {
            source_name: source_name.to_string(),
            message: err.to_string(),
        }
    }

    pub fn decode(source_name: &str, message: impl Into<String>) -> Self {
        Self::Decode {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }
}
