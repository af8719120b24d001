use crate::traits::{LanguageModel, PdfTranscriber};
use crate::LlmError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const PAGE_BREAK: &str = "=== PAGE BREAK ===";

const TRANSCRIBE_PROMPT: &str = "Transcribe the full text of this PDF. \
Output only the text, page by page, and put a line containing exactly \
=== PAGE BREAK === between consecutive pages.";

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.0,
            max_output_tokens: 2_000,
        }
    }
}

pub struct GeminiClient {
    api_key: String,
    config: GenerationConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(api_key: Option<&str>, config: GenerationConfig) -> Result<Self, LlmError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(300))
            .build()?;

        info!(model = %config.model, "gemini client initialised");

        Ok(Self {
            api_key: api_key.to_string(),
            config,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{API_BASE}/{}:generateContent", self.config.model)
    }

    async fn generate_parts(&self, parts: Value) -> Result<String, LlmError> {
        let request = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "maxOutputTokens": self.config.max_output_tokens,
            }
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(LlmError::BackendResponse {
                backend: "gemini".to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let payload: GeminiResponse = response.json().await?;
        let text = response_text(&payload)?;
        debug!(chars = text.len(), "gemini response received");
        Ok(text)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.generate_parts(json!([{ "text": prompt }])).await
    }
}

#[async_trait]
impl PdfTranscriber for GeminiClient {
    async fn transcribe_pdf(&self, pdf: &[u8]) -> Result<String, LlmError> {
        self.generate_parts(json!([
            {
                "inline_data": {
                    "mime_type": "application/pdf",
                    "data": STANDARD.encode(pdf),
                }
            },
            { "text": TRANSCRIBE_PROMPT }
        ]))
        .await
        .map(|text| text.replace(PAGE_BREAK, "\u{000c}"))
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

/// Joins the text parts of the first candidate.
fn response_text(payload: &GeminiResponse) -> Result<String, LlmError> {
    let text = payload
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(LlmError::Empty)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_key_is_rejected() {
        assert!(matches!(
            GeminiClient::new(None, GenerationConfig::default()),
            Err(LlmError::MissingApiKey)
        ));
        assert!(matches!(
            GeminiClient::new(Some("  "), GenerationConfig::default()),
            Err(LlmError::MissingApiKey)
        ));
    }

    #[test]
    fn endpoint_names_the_configured_model() -> Result<(), LlmError> {
        let client = GeminiClient::new(
            Some("key"),
            GenerationConfig {
                model: "gemini-1.5-pro".to_string(),
                ..GenerationConfig::default()
            },
        )?;
        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:generateContent"
        );
        Ok(())
    }

    #[test]
    fn text_parts_of_first_candidate_are_joined() -> Result<(), Box<dyn std::error::Error>> {
        let payload: GeminiResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"parts": [{"text": "A semaphore "}, {"text": "is a counter."}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }))?;

        assert_eq!(response_text(&payload)?, "A semaphore is a counter.");
        Ok(())
    }

    #[test]
    fn blocked_response_without_text_is_empty() -> Result<(), Box<dyn std::error::Error>> {
        let payload: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))?;

        assert!(matches!(response_text(&payload), Err(LlmError::Empty)));
        Ok(())
    }
}
