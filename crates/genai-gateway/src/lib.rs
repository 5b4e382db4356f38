//! `genai-gateway`: the one way out to the generative-text backend.
//!
//! All model calls in the workspace go through a single [`Gateway`] so that
//! the provider's rate limit is respected no matter how many callers are
//! active at once.
//!
//! # Architecture
//!
//! ```text
//! generate_structured(prompt, schema_hint)
//!     │
//!     ▼
//! Lane            ← fair mutex: one call in flight, min spacing between calls
//!     │
//!     ▼
//! retry loop      ← network / 429 / 503 retried with capped exponential backoff
//!     │
//!     ▼
//! Transport       ← GeminiTransport (reqwest) or a test double
//!     │
//!     ▼
//! parse           ← strip fences and prose, parse JSON; failure is fatal
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use genai_gateway::{Gateway, GatewayConfig};
//!
//! let config = GatewayConfig::default().with_env_overrides();
//! let gateway = Gateway::from_config(&config)?;
//! let artifact = gateway
//!     .generate_structured("List three typhoon supplies.", "supplies checklist schema")
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod lane;
pub mod parse;
pub mod transport;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::{Gateway, GatewayRequest, RetryPolicy};
pub use transport::{Completion, GeminiTransport, Transport};

/// Structured result of one generation call.
pub type Artifact = serde_json::Value;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, GatewayError>;
