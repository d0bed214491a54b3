//! Retrieval over the hosted vector store through the Responses API.

use crate::error::LlmError;
use crate::llm::LlmManager;
use crate::llm::model::{ModelType, ProviderKind};
use crate::llm::providers;
use crate::message::Citation;
use crate::tools::{QUOTA_APOLOGY, ToolHandler, ToolOutput, ToolType};

use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use tokio_util::sync::CancellationToken;

pub const NO_MESSAGE: &str = "No response found from file search.";
pub const NO_TEXT: &str = "No text content found in the response.";
pub const SEARCH_FAILED: &str = "Sorry, I encountered an error while searching through files.";

static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("hardcoded regex"));
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.\s+").expect("hardcoded regex"));
static EXTRA_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("hardcoded regex"));

pub struct FileSearchTool {
    llm_manager: Arc<LlmManager>,
    vector_store_id: String,
}

impl FileSearchTool {
    pub fn new(llm_manager: Arc<LlmManager>, vector_store_id: impl Into<String>) -> Self {
        Self {
            llm_manager,
            vector_store_id: vector_store_id.into(),
        }
    }

    async fn search(&self, query: &str, cancel: &CancellationToken) -> Result<ToolOutput, LlmError> {
        let api_key = self.llm_manager.api_key(ProviderKind::OpenAi)?;
        let body = serde_json::json!({
            "model": ModelType::Gpt4oMini.id(),
            "input": query,
            "tools": [{
                "type": "file_search",
                "vector_store_ids": [self.vector_store_id],
            }],
            "include": ["file_search_call.results"],
        });

        let url = format!(
            "{}/v1/responses",
            self.llm_manager.base_url(ProviderKind::OpenAi)
        );
        let request = self
            .llm_manager
            .http_client()
            .post(&url)
            .bearer_auth(api_key)
            .json(&body);

        let response = providers::send_json(request, "OpenAI file search", cancel).await?;
        Ok(read_output(&response))
    }
}

#[async_trait::async_trait]
impl ToolHandler for FileSearchTool {
    fn kind(&self) -> ToolType {
        ToolType::FileSearch
    }

    async fn run(&self, query: &str, cancel: &CancellationToken) -> Result<ToolOutput, LlmError> {
        match self.search(query, cancel).await {
            Ok(output) => Ok(output),
            Err(LlmError::Cancelled) => Err(LlmError::Cancelled),
            Err(LlmError::RateLimited { provider, message }) => {
                tracing::warn!(%provider, %message, "file search hit a usage limit");
                Ok(ToolOutput::text(QUOTA_APOLOGY))
            }
            Err(error) => {
                tracing::warn!(%error, vector_store = %self.vector_store_id, "file search failed");
                Ok(ToolOutput::text(SEARCH_FAILED))
            }
        }
    }
}

fn read_output(response: &Value) -> ToolOutput {
    let Some(message) = response["output"]
        .as_array()
        .and_then(|items| items.iter().find(|item| item["type"] == "message"))
    else {
        return ToolOutput::text(NO_MESSAGE);
    };

    let Some(text_item) = message["content"]
        .as_array()
        .and_then(|items| items.iter().find(|item| item["type"] == "output_text"))
    else {
        return ToolOutput::text(NO_TEXT);
    };

    let citations = text_item["annotations"]
        .as_array()
        .map(|annotations| {
            annotations
                .iter()
                .filter(|annotation| annotation["type"] == "file_citation")
                .enumerate()
                .map(|(index, annotation)| file_citation(index, annotation))
                .collect()
        })
        .unwrap_or_default();

    ToolOutput {
        content: clean_text(text_item["text"].as_str().unwrap_or_default()),
        citations,
    }
}

fn file_citation(index: usize, annotation: &Value) -> Citation {
    let file_id = annotation["file_id"].as_str().unwrap_or_default();
    let short_id = file_id.rsplit('-').next().unwrap_or(file_id);
    Citation {
        id: (index + 1).to_string(),
        url: format!("file://{file_id}"),
        title: format!("File: {short_id}"),
        text: None,
    }
}

/// The model sometimes emits bold markers and run-on numbered lists; strip the
/// former and put each list item on its own line.
fn clean_text(text: &str) -> String {
    let text = BOLD.replace_all(text, "$1");
    let text = LIST_MARKER.replace_all(&text, "\n$1. ");
    let text = EXTRA_NEWLINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}
