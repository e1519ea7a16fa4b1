//! Anthropic-backed decision oracle.
//!
//! Uses Anthropic's Messages API directly.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Assistant-primed JSON output: the request ends with an assistant turn
//!   opening a `<json>{` block so the completion starts mid-object, and the
//!   generated text is truncated at `</json>` before parsing
//! - One bounded retry budget shared by rate-limit backoff and
//!   malformed-output re-asks

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{debug, warn};

use aitest_core::error::OracleError;
use aitest_core::oracle::DecisionOracle;
use aitest_core::{Decision, Screenshot};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_BUDGET: u32 = 2;
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

const SYSTEM_PROMPT: &str = "You are an expert QA tester, testing out an app.";

/// Assistant priming fragment. The opening brace is stripped and re-prepended
/// to the completion when reconstructing the response object.
const JSON_PRIMER: &str = "Here is the JSON requested:\n<json>{";
const JSON_CLOSE: &str = "</json>";

/// Decision oracle talking to the Anthropic Messages API.
pub struct AnthropicOracle {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    /// Bounded attempt budget shared by rate-limit and parse-failure retries.
    budget: u32,
    client: reqwest::Client,
}

impl AnthropicOracle {
    /// Create a new oracle with default model and budget.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300)) // vision requests can be slow
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            budget: DEFAULT_BUDGET,
            client,
        }
    }

    /// Create from the environment: `ANTHROPIC_API_KEY` (required) and
    /// `AITEST_MODEL` (optional).
    pub fn from_env() -> Result<Self, OracleError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            OracleError::NotConfigured("ANTHROPIC_API_KEY is not set".into())
        })?;
        let mut oracle = Self::new(api_key);
        if let Ok(model) = std::env::var("AITEST_MODEL") {
            oracle.model = model;
        }
        Ok(oracle)
    }

    /// Use a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the attempt budget (default 2).
    pub fn with_budget(mut self, budget: u32) -> Self {
        self.budget = budget;
        self
    }

    fn request_body(&self, prompt: &str, screenshot: Option<&Screenshot>) -> MessagesRequest {
        let mut user_content = vec![ContentBlock::Text {
            text: prompt.to_string(),
        }];
        if let Some(shot) = screenshot {
            user_content.push(ContentBlock::Image {
                source: ImageSource::png(&shot.png),
            });
        }

        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![
                ApiMessage {
                    role: "user",
                    content: user_content,
                },
                ApiMessage {
                    role: "assistant",
                    content: vec![ContentBlock::Text {
                        text: JSON_PRIMER.to_string(),
                    }],
                },
            ],
        }
    }

    /// Ask the model and parse its completion as `T`.
    ///
    /// Each pass through the loop consumes one unit of budget, whether it
    /// ends in a rate-limit backoff, a malformed completion, or a usable
    /// answer. Any other non-2xx status is fatal without retry.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        screenshot: Option<&Screenshot>,
    ) -> Result<T, OracleError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(prompt, screenshot);

        let mut remaining = self.budget;
        loop {
            if remaining < 1 {
                return Err(OracleError::RetriesExhausted);
            }
            remaining -= 1;

            debug!(model = %self.model, remaining, "Requesting decision");

            let response = self
                .client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| OracleError::Network(e.to_string()))?;

            let status = response.status().as_u16();

            if status == 429 || status == 529 {
                let seconds = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                warn!(status, seconds, "Rate limited. Retrying after backoff. ☕️");
                tokio::time::sleep(Duration::from_secs(seconds)).await;
                continue;
            }

            if !(200..300).contains(&status) {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status, body = %error_body, "Anthropic API error");
                return Err(OracleError::Api {
                    status_code: status,
                    message: error_body,
                });
            }

            let envelope: MessagesResponse =
                response.json().await.map_err(|e| OracleError::Api {
                    status_code: 200,
                    message: format!("Failed to parse Anthropic response: {e}"),
                })?;

            debug!(
                id = %envelope.id,
                model = %envelope.model,
                stop_reason = ?envelope.stop_reason,
                input_tokens = envelope.usage.input_tokens,
                output_tokens = envelope.usage.output_tokens,
                "Received completion"
            );

            let text = envelope
                .content
                .first()
                .and_then(|block| block.text.as_deref())
                .ok_or_else(|| {
                    OracleError::MalformedResponse("completion contained no text block".into())
                })?;

            let json = reconstruct_json(text);
            match serde_json::from_str::<T>(&json) {
                Ok(parsed) => return Ok(parsed),
                Err(e) => {
                    // Model-induced formatting error: ask again with the
                    // identical request, spending budget.
                    warn!(error = %e, json = %json, "Failed to decode prompt response");
                    continue;
                }
            }
        }
    }
}

/// Truncate the completion at the first `</json>` and re-prepend the opening
/// brace stripped from the priming fragment.
fn reconstruct_json(raw: &str) -> String {
    let truncated = match raw.find(JSON_CLOSE) {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    let mut json = String::with_capacity(truncated.len() + 1);
    json.push('{');
    json.push_str(truncated);
    json
}

#[async_trait]
impl DecisionOracle for AnthropicOracle {
    async fn decide(
        &self,
        prompt: &str,
        screenshot: Option<&Screenshot>,
    ) -> Result<Decision, OracleError> {
        self.complete_json(prompt, screenshot).await
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

impl ImageSource {
    fn png(bytes: &[u8]) -> Self {
        Self {
            kind: "base64",
            media_type: "image/png",
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    id: String,
    content: Vec<ResponseContent>,
    model: String,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}
