//! Image analysis through Google Gemini.
//!
//! The model is asked for a JSON object with `title` and `description`. Its reply
//! is often wrapped in a markdown code fence, so interpretation is two steps:
//! strip the fence, then parse. Anything that fails along the way yields
//! `AnalysisResult::sentinel()`; analysis never fails an upload.

use crate::models::{analysis::AnalysisResult, object::JPEG_CONTENT_TYPE};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde_json::{Value, json};
use std::{path::Path, time::Duration};
use tokio::fs;
use tracing::{debug, warn};

pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

pub const ANALYSIS_PROMPT: &str = "Generate a title and a description for this image. \
Respond only with a JSON object that has exactly two string fields: \"title\" and \"description\".";

#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    /// Analyze the image at `image_path`. Single attempt, never fails.
    async fn analyze(&self, image_path: &Path) -> AnalysisResult;
}

pub struct GeminiAnalyzer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GeminiAnalyzer {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building analyzer http client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: GEMINI_ENDPOINT.to_string(),
        })
    }

    /// Point the analyzer at a different API host.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn request_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }

    /// One `generateContent` request with the prompt and the inline image.
    pub fn request_body(image_base64: &str) -> Value {
        json!({
            "contents": [{
                "parts": [
                    { "text": ANALYSIS_PROMPT },
                    {
                        "inline_data": {
                            "mime_type": JPEG_CONTENT_TYPE,
                            "data": image_base64
                        }
                    }
                ]
            }]
        })
    }

    /// Send the image and return the model's raw reply text.
    async fn request_text(&self, image_path: &Path) -> anyhow::Result<String> {
        let image = fs::read(image_path)
            .await
            .with_context(|| format!("reading `{}`", image_path.display()))?;
        let body = Self::request_body(&general_purpose::STANDARD.encode(&image));

        let response = self
            .client
            .post(self.request_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let preview: String = text.chars().take(500).collect();
            return Err(anyhow!("analyzer returned {}: {}", status, preview));
        }

        let value: Value = serde_json::from_str(&text).context("decoding analyzer response")?;
        value["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("no text in analyzer response"))
    }
}

#[async_trait]
impl ContentAnalyzer for GeminiAnalyzer {
    async fn analyze(&self, image_path: &Path) -> AnalysisResult {
        match self.request_text(image_path).await {
            Ok(raw) => {
                let result = interpret_response(&raw);
                if result.is_sentinel() {
                    warn!(path = %image_path.display(), "analyzer reply was not usable");
                } else {
                    debug!(path = %image_path.display(), title = %result.title, "analyzed image");
                }
                result
            }
            Err(err) => {
                warn!(path = %image_path.display(), error = %err, "image analysis failed");
                AnalysisResult::sentinel()
            }
        }
    }
}

/// Remove a surrounding markdown code fence (```` ``` ```` or ```` ```json ````).
///
/// Text without a leading fence is returned trimmed and otherwise untouched.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse a JSON object carrying string `title` and `description` fields.
///
/// Arrays and other non-object values are rejected even when they would
/// deserialize positionally.
pub fn parse_analysis(text: &str) -> Option<AnalysisResult> {
    match serde_json::from_str::<Value>(text).ok()? {
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    }
}

/// Turn a raw model reply into a result, degrading to the sentinel.
pub fn interpret_response(raw: &str) -> AnalysisResult {
    parse_analysis(strip_code_fence(raw)).unwrap_or_else(AnalysisResult::sentinel)
}
