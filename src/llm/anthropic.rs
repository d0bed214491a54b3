//! Anthropic messages adapter.

use crate::error::LlmError;
use crate::llm::format;
use crate::llm::manager::LlmManager;
use crate::llm::model::{ModelChoice, ProviderKind};
use crate::llm::providers::{self, CompletionRequest, MAX_TOKENS, ProviderAdapter, TEMPERATURE};

use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    llm_manager: Arc<LlmManager>,
}

impl AnthropicAdapter {
    pub fn new(llm_manager: Arc<LlmManager>) -> Self {
        Self { llm_manager }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        let api_key = self.llm_manager.api_key(ProviderKind::Anthropic)?;

        // Requests that named another vendor's model run on the default Claude model.
        let model = match ModelChoice::resolve(Some(&request.model)).provider {
            ProviderKind::Anthropic => request.model.clone(),
            ProviderKind::OpenAi | ProviderKind::Gemini => {
                ProviderKind::Anthropic.default_model().id().to_string()
            }
        };

        let (system, messages) = format::format_for_anthropic(&request.messages);
        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
        });
        if let Some(system) = system {
            body["system"] = serde_json::json!(system);
        }

        let url = format!(
            "{}/v1/messages",
            self.llm_manager.base_url(ProviderKind::Anthropic)
        );
        let http_request = self
            .llm_manager
            .http_client()
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body);

        let response = providers::send_json(http_request, "Anthropic", cancel).await?;
        parse_first_block(&response)
    }
}

/// Text of the first content block. Older and newer response shapes name the
/// text field differently; if none is present the block itself is returned as JSON.
fn parse_first_block(body: &Value) -> Result<String, LlmError> {
    let Some(block) = body["content"].as_array().and_then(|blocks| blocks.first()) else {
        return Err(LlmError::EmptyResponse("Anthropic".into()));
    };

    if block["type"] == "text"
        && let Some(text) = block["text"].as_str()
    {
        return Ok(text.to_string());
    }

    let text = ["text", "value", "content"]
        .iter()
        .find_map(|field| block[*field].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| block.to_string());
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::llm::testing::spawn_stub;
    use crate::message::{ChatMessage, Role};

    use axum::Json;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use serde_json::json;

    #[tokio::test]
    async fn sends_system_separately_and_reads_first_block() {
        let router = axum::Router::new().route(
            "/v1/messages",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["x-api-key"], "sk-ant");
                assert_eq!(headers["anthropic-version"], "2023-06-01");
                assert_eq!(body["system"], "persona");
                assert_eq!(body["model"], "claude-3-7-sonnet-20250219");
                assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
                Json(json!({"content": [{"type": "text", "text": "Hello from Claude"}]}))
            }),
        );
        let manager = LlmManager::new(LlmConfig {
            anthropic_key: Some("sk-ant".into()),
            anthropic_base_url: spawn_stub(router).await,
            ..LlmConfig::default()
        })
        .await
        .unwrap();
        let adapter = AnthropicAdapter::new(Arc::new(manager));

        let request = CompletionRequest {
            messages: vec![
                ChatMessage::new(Role::System, "persona"),
                ChatMessage::new(Role::User, "Hi"),
            ],
            model: "gpt-4o".into(),
        };
        let text = adapter
            .complete(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(text, "Hello from Claude");
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let manager = LlmManager::new(LlmConfig::default()).await.unwrap();
        let adapter = AnthropicAdapter::new(Arc::new(manager));
        let request = CompletionRequest {
            messages: vec![ChatMessage::new(Role::User, "Hi")],
            model: "claude-3-7-sonnet-20250219".into(),
        };

        let error = adapter
            .complete(&request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, LlmError::MissingProviderKey(_)));
    }

    #[tokio::test]
    async fn already_cancelled_never_reaches_the_network() {
        // Nothing listens here; a real request would fail with a connect error.
        let manager = LlmManager::new(LlmConfig {
            anthropic_key: Some("sk-ant".into()),
            anthropic_base_url: "http://127.0.0.1:9".into(),
            ..LlmConfig::default()
        })
        .await
        .unwrap();
        let adapter = AnthropicAdapter::new(Arc::new(manager));
        let request = CompletionRequest {
            messages: vec![ChatMessage::new(Role::User, "Hi")],
            model: "claude-3-7-sonnet-20250219".into(),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = adapter.complete(&request, &cancel).await.unwrap_err();
        assert!(error.is_cancelled());
    }

    #[test]
    fn block_text_falls_back_across_field_names() {
        assert_eq!(
            parse_first_block(&json!({"content": [{"type": "output", "value": "v"}]})).unwrap(),
            "v"
        );
        assert_eq!(
            parse_first_block(&json!({"content": [{"type": "output", "content": "c"}]})).unwrap(),
            "c"
        );
        let raw = parse_first_block(&json!({"content": [{"type": "tool_use", "id": 7}]})).unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&raw).unwrap(),
            json!({"type": "tool_use", "id": 7})
        );
        assert!(parse_first_block(&json!({"content": []})).is_err());
    }
}
