//! Gemini REST backend for region detection.
//!
//! Speaks the `generateContent` API with structured output: the request
//! carries a `responseSchema`, so the model is constrained to the JSON
//! array-of-labeled-boxes contract instead of free prose. One HTTP call per
//! page, no streaming, no retries.

use super::{DetectionRequest, VisionModel};
use crate::error::ExtractError;
use crate::prompts;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Default vision model identifier.
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

/// Public Gemini API endpoint base.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Vision backend calling the Gemini `generateContent` REST API.
#[derive(Debug)]
pub struct GeminiVision {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout_secs: u64,
}

impl GeminiVision {
    /// Create a backend for `model` authenticated with `api_key`.
    ///
    /// Fails with [`ExtractError::MissingApiKey`] when the key is empty or
    /// whitespace; the check runs here so no request is ever attempted
    /// without a credential.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ExtractError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ExtractError::MissingApiKey);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("docsnip/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExtractError::Internal(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: DEFAULT_API_BASE.to_string(),
            timeout_secs,
        })
    }

    /// Create a backend reading the key from the `GEMINI_API_KEY`
    /// environment variable.
    pub fn from_env(model: impl Into<String>, timeout_secs: u64) -> Result<Self, ExtractError> {
        let key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
        Self::new(key, model, timeout_secs)
    }

    /// Point the backend at a different API base (testing, proxies).
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn map_send_error(&self, e: reqwest::Error) -> ExtractError {
        if e.is_timeout() {
            ExtractError::ApiTimeout {
                secs: self.timeout_secs,
            }
        } else {
            ExtractError::VisionApiError {
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl VisionModel for GeminiVision {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: DetectionRequest) -> Result<String, ExtractError> {
        let body = build_body(&request);
        debug!(model = %self.model, "sending detection request");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExtractError::VisionApiError {
                message: format!("HTTP {status}: {}", snippet(&text)),
            });
        }

        let parsed: GenerateContentResponse =
            response
                .json()
                .await
                .map_err(|e| ExtractError::VisionApiError {
                    message: format!("unreadable response body: {e}"),
                })?;

        extract_text(parsed)
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Part<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Deserialize)]
struct TextPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Assemble the request body. Image part first, then the text prompt, in
/// the order vision models see multimodal input best.
fn build_body(request: &DetectionRequest) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        system_instruction: Content {
            parts: vec![Part {
                text: Some(&request.system_instruction),
                inline_data: None,
            }],
        },
        contents: vec![Content {
            parts: vec![
                Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: request.mime_type,
                        data: &request.image_base64,
                    }),
                },
                Part {
                    text: Some(&request.prompt),
                    inline_data: None,
                },
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: prompts::detection_response_schema(),
        },
    }
}

/// Pull the first candidate's concatenated text out of a response.
fn extract_text(response: GenerateContentResponse) -> Result<String, ExtractError> {
    if let Some(feedback) = response.prompt_feedback {
        if let Some(reason) = feedback.block_reason {
            return Err(ExtractError::VisionApiError {
                message: format!("request blocked: {reason}"),
            });
        }
    }

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ExtractError::VisionApiError {
            message: "model returned no payload".into(),
        });
    }

    Ok(text)
}

/// First ~300 chars of an error body, newlines collapsed, for log-friendly
/// messages.
fn snippet(body: &str) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(300) {
        Some((idx, _)) => format!("{}…", &flat[..idx]),
        None => flat,
    }
}
