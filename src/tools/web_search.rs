//! Web search through OpenAI's search-augmented chat model.

use crate::error::LlmError;
use crate::llm::LlmManager;
use crate::llm::model::{ModelType, ProviderKind};
use crate::llm::providers;
use crate::markup;
use crate::message::Citation;
use crate::tools::{QUOTA_APOLOGY, ToolHandler, ToolOutput, ToolType};

use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SEARCH_PROMPT: &str = "You are Marcus AI, a helpful AI assistant created by Aryan Bhargav. When answering questions, search the web for current information and cite your sources with markdown links.";

const DEFAULT_SNIPPET: &str = "Citation from web search";

pub struct WebSearchTool {
    llm_manager: Arc<LlmManager>,
}

impl WebSearchTool {
    pub fn new(llm_manager: Arc<LlmManager>) -> Self {
        Self { llm_manager }
    }

    async fn search(&self, query: &str, cancel: &CancellationToken) -> Result<ToolOutput, LlmError> {
        let api_key = self.llm_manager.api_key(ProviderKind::OpenAi)?;
        let body = serde_json::json!({
            "model": ModelType::Gpt4oMiniSearchPreview.id(),
            "messages": [
                {"role": "system", "content": SEARCH_PROMPT},
                {"role": "user", "content": query},
            ],
        });

        let url = format!(
            "{}/v1/chat/completions",
            self.llm_manager.base_url(ProviderKind::OpenAi)
        );
        let request = self
            .llm_manager
            .http_client()
            .post(&url)
            .bearer_auth(api_key)
            .json(&body);

        let response = providers::send_json(request, "OpenAI web search", cancel).await?;
        let message = &response["choices"][0]["message"];
        let content = message["content"].as_str().unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse("OpenAI web search".into()));
        }
        let citations = url_citations(content, &message["annotations"]);

        tracing::debug!(citations = citations.len(), "web search completed");

        Ok(ToolOutput {
            content: markup::format_web_search_result(content, &citations),
            citations,
        })
    }
}

#[async_trait::async_trait]
impl ToolHandler for WebSearchTool {
    fn kind(&self) -> ToolType {
        ToolType::WebSearch
    }

    async fn run(&self, query: &str, cancel: &CancellationToken) -> Result<ToolOutput, LlmError> {
        match self.search(query, cancel).await {
            Err(LlmError::RateLimited { provider, message }) => {
                tracing::warn!(%provider, %message, "web search hit a usage limit");
                Ok(ToolOutput::text(QUOTA_APOLOGY))
            }
            result => result,
        }
    }
}

/// Build citations from `url_citation` annotations. Offsets count characters,
/// not bytes.
fn url_citations(content: &str, annotations: &Value) -> Vec<Citation> {
    let Some(annotations) = annotations.as_array() else {
        return Vec::new();
    };

    annotations
        .iter()
        .filter(|annotation| annotation["type"] == "url_citation")
        .enumerate()
        .map(|(index, annotation)| {
            let citation = &annotation["url_citation"];
            let number = index + 1;
            let title = citation["title"]
                .as_str()
                .filter(|title| !title.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Source {number}"));
            let snippet = snippet(
                content,
                citation["start_index"].as_u64(),
                citation["end_index"].as_u64(),
            )
            .unwrap_or_else(|| DEFAULT_SNIPPET.to_string());

            Citation {
                id: number.to_string(),
                url: citation["url"].as_str().unwrap_or_default().to_string(),
                title,
                text: Some(snippet),
            }
        })
        .collect()
}

fn snippet(content: &str, start: Option<u64>, end: Option<u64>) -> Option<String> {
    let start = usize::try_from(start?).ok()?;
    let end = usize::try_from(end?).ok()?;
    if end <= start {
        return None;
    }
    let text: String = content.chars().skip(start).take(end - start).collect();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::llm::testing::spawn_stub;

    use axum::Json;
    use axum::http::StatusCode;
    use axum::routing::post;
    use serde_json::json;

    async fn tool(router: axum::Router) -> WebSearchTool {
        let manager = LlmManager::new(LlmConfig {
            openai_key: Some("sk-test".into()),
            openai_base_url: spawn_stub(router).await,
            ..LlmConfig::default()
        })
        .await
        .unwrap();
        WebSearchTool::new(Arc::new(manager))
    }

    #[tokio::test]
    async fn blank_answer_is_an_empty_response() {
        let router = axum::Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"choices": [{"message": {"content": "  "}}]})) }),
        );
        let tool = tool(router).await;

        let error = tool
            .run("rust news", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, LlmError::EmptyResponse(_)));
    }

    #[tokio::test]
    async fn builds_citations_from_annotations() {
        let router = axum::Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "gpt-4o-mini-search-preview-2025-03-11");
                assert_eq!(body["messages"][1]["content"], "rust news");
                Json(json!({
                    "choices": [{"message": {
                        "content": "Rust 2024 shipped today.",
                        "annotations": [
                            {"type": "url_citation", "url_citation": {
                                "url": "https://blog.rust-lang.org",
                                "title": "Rust Blog",
                                "start_index": 0,
                                "end_index": 9,
                            }},
                            {"type": "url_citation", "url_citation": {
                                "url": "https://example.com/news",
                            }},
                        ],
                    }}]
                }))
            }),
        );
        let tool = tool(router).await;

        let output = tool.run("rust news", &CancellationToken::new()).await.unwrap();

        assert_eq!(output.citations.len(), 2);
        assert_eq!(output.citations[0].id, "1");
        assert_eq!(output.citations[0].title, "Rust Blog");
        assert_eq!(output.citations[0].text.as_deref(), Some("Rust 2024"));
        assert_eq!(output.citations[1].title, "Source 2");
        assert_eq!(
            output.citations[1].text.as_deref(),
            Some("Citation from web search")
        );
        assert!(output.content.contains("sources-section"));
        assert!(output.content.contains("blog.rust-lang.org"));
    }

    #[tokio::test]
    async fn quota_error_becomes_apology() {
        let router = axum::Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({"error": {"message": "Rate limit reached"}})),
                )
            }),
        );
        let tool = tool(router).await;

        let output = tool.run("anything", &CancellationToken::new()).await.unwrap();
        assert_eq!(output.content, QUOTA_APOLOGY);
        assert!(output.citations.is_empty());
    }

    #[tokio::test]
    async fn other_errors_propagate() {
        let router = axum::Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": {"message": "boom"}})),
                )
            }),
        );
        let tool = tool(router).await;

        let error = tool
            .run("anything", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, LlmError::ProviderRequest(_)));
    }

    #[test]
    fn snippets_use_character_offsets() {
        assert_eq!(snippet("héllo wörld", Some(6), Some(11)).as_deref(), Some("wörld"));
        assert_eq!(snippet("short", Some(3), Some(3)), None);
        assert_eq!(snippet("short", None, Some(3)), None);
        assert_eq!(snippet("short", Some(10), Some(20)), None);
    }
}
