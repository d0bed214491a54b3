//! OpenAI chat-completions adapter.

use crate::error::LlmError;
use crate::llm::format;
use crate::llm::manager::LlmManager;
use crate::llm::model::ProviderKind;
use crate::llm::providers::{self, CompletionRequest, MAX_TOKENS, ProviderAdapter, TEMPERATURE};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct OpenAiAdapter {
    llm_manager: Arc<LlmManager>,
}

impl OpenAiAdapter {
    pub fn new(llm_manager: Arc<LlmManager>) -> Self {
        Self { llm_manager }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        let api_key = self.llm_manager.api_key(ProviderKind::OpenAi)?;

        let body = serde_json::json!({
            "model": request.model,
            "messages": format::format_for_openai(&request.messages),
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
        });

        let url = format!(
            "{}/v1/chat/completions",
            self.llm_manager.base_url(ProviderKind::OpenAi)
        );
        let http_request = self
            .llm_manager
            .http_client()
            .post(&url)
            .bearer_auth(api_key)
            .json(&body);

        let response = providers::send_json(http_request, "OpenAI", cancel).await?;
        parse_chat_completion(&response)
    }
}

/// Text of `choices[0].message.content`.
pub(crate) fn parse_chat_completion(body: &serde_json::Value) -> Result<String, LlmError> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default();
    if content.trim().is_empty() {
        tracing::warn!(choice = ?body["choices"][0], "empty response from OpenAI");
        return Err(LlmError::EmptyResponse("OpenAI".into()));
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::llm::testing::spawn_stub;
    use crate::message::{ChatMessage, Role};

    use axum::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use serde_json::{Value, json};

    async fn adapter(base_url: String) -> OpenAiAdapter {
        let manager = LlmManager::new(LlmConfig {
            openai_key: Some("sk-test".into()),
            openai_base_url: base_url,
            ..LlmConfig::default()
        })
        .await
        .unwrap();
        OpenAiAdapter::new(Arc::new(manager))
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![
                ChatMessage::new(Role::System, "persona"),
                ChatMessage::new(Role::User, "Hello"),
            ],
            model: "gpt-4o".into(),
        }
    }

    #[tokio::test]
    async fn extracts_first_choice_and_sends_fixed_sampling() {
        let router = axum::Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer sk-test");
                assert_eq!(body["model"], "gpt-4o");
                assert_eq!(body["temperature"], 0.7);
                assert_eq!(body["max_tokens"], 2000);
                assert_eq!(body["messages"][0]["role"], "system");
                Json(json!({
                    "choices": [{"message": {"role": "assistant", "content": "Hi from OpenAI"}}]
                }))
            }),
        );
        let adapter = adapter(spawn_stub(router).await).await;

        let text = adapter
            .complete(&request(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(text, "Hi from OpenAI");
    }

    #[tokio::test]
    async fn quota_errors_are_classified() {
        let router = axum::Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({"error": {"message": "You exceeded your current quota"}})),
                )
            }),
        );
        let adapter = adapter(spawn_stub(router).await).await;

        let error = adapter
            .complete(&request(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(error.is_rate_limited());
    }

    #[tokio::test]
    async fn server_errors_are_generic_failures() {
        let router = axum::Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": {"message": "boom"}})),
                )
            }),
        );
        let adapter = adapter(spawn_stub(router).await).await;

        let error = adapter
            .complete(&request(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, LlmError::ProviderRequest(message) if message.contains("boom")));
    }

    #[tokio::test]
    async fn already_cancelled_never_reaches_the_network() {
        // Nothing listens here; a real request would fail with a connect error.
        let adapter = adapter("http://127.0.0.1:9".into()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = adapter.complete(&request(), &cancel).await.unwrap_err();
        assert!(error.is_cancelled());
    }

    #[test]
    fn empty_content_is_an_error() {
        let body = json!({"choices": [{"message": {"content": ""}}]});
        assert!(matches!(
            parse_chat_completion(&body),
            Err(LlmError::EmptyResponse(_))
        ));
    }
}
