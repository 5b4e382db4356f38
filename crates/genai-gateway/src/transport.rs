use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GatewayConfig;
use crate::{GatewayError, GatewayRequest, Result};

/// Appended to every prompt so the model answers with a bare document.
pub const JSON_ONLY_SUFFIX: &str = "\n\nReturn only JSON.";

// ─── Completion ───────────────────────────────────────────────────────────

/// What a successful (2xx) backend exchange produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Concatenated text parts of the first candidate, if any.
    pub text: Option<String>,
    /// Backend's finish / block indicator, used when `text` is empty.
    pub finish_reason: Option<String>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            finish_reason: Some("STOP".into()),
        }
    }

    /// The usable text, or `EmptyResponse` carrying the finish indicator.
    pub fn into_text(self) -> Result<String> {
        match self.text {
            Some(t) if !t.trim().is_empty() => Ok(t),
            _ => Err(GatewayError::EmptyResponse {
                reason: self.finish_reason.unwrap_or_else(|| "NO_CANDIDATES".into()),
            }),
        }
    }
}

// ─── Transport ────────────────────────────────────────────────────────────

/// One HTTP exchange with the generative-text backend.
///
/// Implementations map transport failures to `GatewayError::Network` and
/// non-2xx statuses through [`GatewayError::from_status`]; they never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn complete(&self, request: &GatewayRequest) -> Result<Completion>;
}

// ─── GeminiTransport ──────────────────────────────────────────────────────

/// `generateContent` client for the Google generative-language API.
pub struct GeminiTransport {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiTransport {
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                GatewayError::Configuration(format!(
                    "missing API key: set {} or gateway.api_key",
                    crate::config::API_KEY_ENV
                ))
            })?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GatewayError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn body(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part {
                    text: Some(format!("{prompt}{JSON_ONLY_SUFFIX}")),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

#[async_trait]
impl Transport for GeminiTransport {
    async fn complete(&self, request: &GatewayRequest) -> Result<Completion> {
        debug!(model = %self.model, attempt = request.attempt, "sending generateContent");

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&self.body(&request.prompt_text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), body));
        }

        let body = response.text().await?;
        Ok(read_completion(&body))
    }
}

// ─── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Interpret a 2xx body.
///
/// A `generateContent` envelope is unpacked; anything else (bare JSON or
/// free text from a proxy or alternative backend) is passed through as the
/// completion text for the parser to deal with.
fn read_completion(body: &str) -> Completion {
    let envelope = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .filter(|v| v.get("candidates").is_some() || v.get("promptFeedback").is_some())
        .and_then(|v| serde_json::from_value::<GenerateResponse>(v).ok());
    match envelope {
        Some(response) => response.into_completion(),
        None => Completion {
            text: Some(body.to_string()).filter(|t| !t.trim().is_empty()),
            finish_reason: None,
        },
    }
}

impl GenerateResponse {
    fn into_completion(self) -> Completion {
        let block_reason = self.prompt_feedback.and_then(|f| f.block_reason);
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Completion {
                text: None,
                finish_reason: block_reason,
            };
        };
        let text: String = candidate
            .content
            .unwrap_or_default()
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        Completion {
            text: Some(text).filter(|t| !t.is_empty()),
            finish_reason: candidate.finish_reason.or(block_reason),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
