//! Google Gemini `generateContent` adapter.
//!
//! Only the text of the last formatted turn is sent. Earlier turns are not
//! forwarded to Gemini.

use crate::error::LlmError;
use crate::llm::format;
use crate::llm::manager::LlmManager;
use crate::llm::model::{ModelChoice, ProviderKind};
use crate::llm::providers::{self, CompletionRequest, MAX_TOKENS, ProviderAdapter, TEMPERATURE};

use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Returned when Gemini answers without any text.
pub const NO_TEXT_REPLY: &str = "I couldn't generate a response. Please try again.";

pub struct GeminiAdapter {
    llm_manager: Arc<LlmManager>,
}

impl GeminiAdapter {
    pub fn new(llm_manager: Arc<LlmManager>) -> Self {
        Self { llm_manager }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[async_trait::async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        let api_key = self.llm_manager.api_key(ProviderKind::Gemini)?;

        let model = match ModelChoice::resolve(Some(&request.model)).provider {
            ProviderKind::Gemini => request.model.clone(),
            ProviderKind::OpenAi | ProviderKind::Anthropic => {
                ProviderKind::Gemini.default_model().id().to_string()
            }
        };

        let contents = format::format_for_gemini(&request.messages);
        let prompt = contents
            .last()
            .and_then(|turn| turn["parts"][0]["text"].as_str())
            .unwrap_or_default()
            .to_string();

        let body = serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_TOKENS,
            },
        });

        let url = format!(
            "{}/v1beta/models/{model}:generateContent",
            self.llm_manager.base_url(ProviderKind::Gemini)
        );
        let http_request = self
            .llm_manager
            .http_client()
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body);

        let response = providers::send_json(http_request, "Gemini", cancel).await?;
        let parsed: GenerateContentResponse = serde_json::from_value(response).map_err(|error| {
            LlmError::ProviderRequest(format!("Gemini response has unexpected shape: {error}"))
        })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Ok(NO_TEXT_REPLY.to_string());
        }
        Ok(text)
    }
}
