//! Tool side paths that can answer a turn instead of a chat model.
//!
//! Handlers are tried in [`ToolType::ALL`] order; the first one that returns
//! `Ok` decides the reply. A handler converts quota errors into an apology
//! itself, so a quota problem never falls through to model dispatch.

pub mod computer_use;
pub mod file_search;
pub mod web_search;

pub use computer_use::ComputerUseTool;
pub use file_search::FileSearchTool;
pub use web_search::WebSearchTool;

use crate::error::LlmError;
use crate::llm::LlmManager;
use crate::message::Citation;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Reply given when a provider reports quota exhaustion.
pub const QUOTA_APOLOGY: &str = "I'm sorry, but I've hit a usage limit with my AI provider and can't answer right now. Please try again in a few minutes.";

/// Phrase that turns on file search automatically.
const FILE_SEARCH_TRIGGER: &str = "performance marketing";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    WebSearch,
    FileSearch,
    ComputerUse,
}

impl ToolType {
    /// Priority order in which active tools are tried.
    pub const ALL: [ToolType; 3] = [
        ToolType::WebSearch,
        ToolType::FileSearch,
        ToolType::ComputerUse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolType::WebSearch => "web_search",
            ToolType::FileSearch => "file_search",
            ToolType::ComputerUse => "computer_use",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "web_search" => Some(ToolType::WebSearch),
            "file_search" => Some(ToolType::FileSearch),
            "computer_use" => Some(ToolType::ComputerUse),
            _ => None,
        }
    }

    /// Whether the tool may run today. Computer use is kept selectable but
    /// never dispatched.
    pub fn is_available(self) -> bool {
        match self {
            ToolType::WebSearch | ToolType::FileSearch => true,
            ToolType::ComputerUse => false,
        }
    }
}

impl std::fmt::Display for ToolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether `text` mentions the phrase that forces file search on.
pub fn mentions_file_search_trigger(text: &str) -> bool {
    text.to_lowercase().contains(FILE_SEARCH_TRIGGER)
}

/// The tools that will actually run for a turn, in priority order.
pub fn effective_tools(selected: &[ToolType], latest_user_text: &str) -> Vec<ToolType> {
    let force_file_search = mentions_file_search_trigger(latest_user_text);
    ToolType::ALL
        .into_iter()
        .filter(|tool| {
            selected.contains(tool) || (*tool == ToolType::FileSearch && force_file_search)
        })
        .filter(|tool| tool.is_available())
        .collect()
}

/// What a tool handler produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub citations: Vec<Citation>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            citations: Vec::new(),
        }
    }
}

#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    fn kind(&self) -> ToolType;

    /// Answer `query` (the latest user turn).
    async fn run(&self, query: &str, cancel: &CancellationToken) -> Result<ToolOutput, LlmError>;
}

/// One handler per tool type.
#[derive(Clone)]
pub struct ToolSet {
    pub web_search: Arc<dyn ToolHandler>,
    pub file_search: Arc<dyn ToolHandler>,
    pub computer_use: Arc<dyn ToolHandler>,
}

impl ToolSet {
    pub fn new(llm_manager: Arc<LlmManager>, vector_store_id: impl Into<String>) -> Self {
        Self {
            web_search: Arc::new(WebSearchTool::new(llm_manager.clone())),
            file_search: Arc::new(FileSearchTool::new(llm_manager, vector_store_id)),
            computer_use: Arc::new(ComputerUseTool),
        }
    }

    pub fn get(&self, kind: ToolType) -> &Arc<dyn ToolHandler> {
        match kind {
            ToolType::WebSearch => &self.web_search,
            ToolType::FileSearch => &self.file_search,
            ToolType::ComputerUse => &self.computer_use,
        }
    }
}
