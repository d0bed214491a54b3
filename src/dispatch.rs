//! Per-turn dispatch: tool side paths first, then the provider cascade.
//!
//! The dispatcher always produces a message. Provider and tool failures turn
//! into fallback text; the only error it returns is cancellation.

use crate::error::LlmError;
use crate::llm::format;
use crate::llm::routing::{self, CascadeOutcome, ProviderSet};
use crate::llm::{LlmManager, ModelChoice};
use crate::message::{ChatMessage, Message, latest_user_text};
use crate::personalization::{self, UserPreferences};
use crate::tools::{self, QUOTA_APOLOGY, ToolSet, ToolType};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Reply when every provider failed.
pub const ALL_PROVIDERS_FAILED: &str = "I apologize, but I encountered an issue processing your request. Please try again with a simpler query.";

/// Reply when every provider failed on a performance marketing question.
pub const PERFORMANCE_MARKETING_FALLBACK: &str = "I couldn't reach my knowledge sources just now, so here is a short overview instead. Performance marketing is paid advertising where you pay for measurable results such as clicks, leads or sales rather than impressions. The core habits are: define the conversion you care about, track it end to end, test creatives and audiences continuously, and shift budget toward the channels with the best cost per acquisition. Ask me again in a moment for a more detailed answer.";

/// One chat turn as the dispatcher sees it.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub tools: Vec<ToolType>,
    pub preferences: Option<UserPreferences>,
}

pub struct Dispatcher {
    providers: ProviderSet,
    tools: ToolSet,
}

impl Dispatcher {
    pub fn new(providers: ProviderSet, tools: ToolSet) -> Self {
        Self { providers, tools }
    }

    /// Dispatcher backed by the real provider adapters and tool handlers.
    pub fn from_manager(llm_manager: &Arc<LlmManager>, vector_store_id: &str) -> Self {
        Self::new(
            llm_manager.provider_set(),
            ToolSet::new(llm_manager.clone(), vector_store_id),
        )
    }

    pub async fn dispatch(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<Message, LlmError> {
        let query = latest_user_text(&request.messages).unwrap_or_default();
        let active_tools = tools::effective_tools(&request.tools, &query);

        for tool in active_tools {
            match self.tools.get(tool).run(&query, cancel).await {
                Ok(output) => {
                    tracing::debug!(tool = %tool, "tool answered the turn");
                    return Ok(Message::assistant(output.content, output.citations));
                }
                Err(LlmError::Cancelled) => return Err(LlmError::Cancelled),
                Err(error) => {
                    tracing::warn!(%error, tool = %tool, "tool failed, trying next path");
                }
            }
        }

        let persona = personalization::system_prompt(request.preferences.as_ref());
        let messages = format::ensure_system_message(&request.messages, &persona);
        let choice = ModelChoice::resolve(request.model.as_deref());

        let content = match routing::run_cascade(&self.providers, &choice, &messages, cancel).await? {
            CascadeOutcome::Completed { text, .. } => text,
            CascadeOutcome::RateLimited { .. } => QUOTA_APOLOGY.to_string(),
            CascadeOutcome::Exhausted { last_error } => {
                tracing::error!(
                    last_error = ?last_error.map(|error| error.to_string()),
                    model = %choice.model,
                    "all providers failed"
                );
                if tools::mentions_file_search_trigger(&query) {
                    PERFORMANCE_MARKETING_FALLBACK.to_string()
                } else {
                    ALL_PROVIDERS_FAILED.to_string()
                }
            }
        };

        Ok(Message::assistant(content, Vec::new()))
    }
}
