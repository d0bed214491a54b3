//! `POST /api/chat`: one chat turn.

use super::auth::Caller;
use super::error::ApiError;
use super::state::ApiState;
use crate::conversation::{self, NewMessage};
use crate::dispatch::ChatRequest;
use crate::error::LlmError;
use crate::message::{ChatMessage, Message, Role};
use crate::personalization::UserPreferences;
use crate::tools::ToolType;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatBody {
    messages: Vec<ChatMessage>,
    #[serde(default)]
    preferences: Option<UserPreferences>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    conversation_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ChatResponse {
    #[serde(flatten)]
    message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<String>,
}

/// Where the turn will be saved, decided before any provider is called.
enum Persistence {
    Skip,
    Existing { conversation_id: String },
    Create { user_id: String },
}

pub(super) async fn chat(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        tracing::debug!(%rejection, "rejected chat body");
        ApiError::bad_request("Invalid JSON in request body")
    })?;

    if !payload["messages"].is_array() {
        return Err(ApiError::bad_request(
            "Messages are required and must be an array",
        ));
    }
    let body: ChatBody = serde_json::from_value(payload).map_err(|error| {
        ApiError::bad_request("Invalid message format").with_details(error.to_string())
    })?;

    let Some(latest_user_index) = body
        .messages
        .iter()
        .rposition(|message| message.role == Role::User)
    else {
        return Err(ApiError::bad_request("No user message found"));
    };
    let user_text = body.messages[latest_user_index].text();
    let user_image = body.messages[latest_user_index]
        .images()
        .next()
        .map(|attachment| attachment.url.clone());

    let persistence = plan_persistence(&state, &caller, body.conversation_id.as_deref()).await?;

    let request = ChatRequest {
        messages: prepare_history(body.messages, latest_user_index),
        model: body.model,
        tools: parse_tools(&body.tools),
        preferences: body.preferences,
    };

    let cancel = CancellationToken::new();
    let timer = tokio::spawn({
        let cancel = cancel.clone();
        let timeout = state.request_timeout;
        async move {
            tokio::time::sleep(timeout).await;
            cancel.cancel();
        }
    });
    let outcome = state.dispatcher.dispatch(request, &cancel).await;
    timer.abort();

    let message = match outcome {
        Ok(message) => message,
        Err(LlmError::Cancelled) => {
            tracing::warn!(timeout_secs = state.request_timeout.as_secs(), "chat request timed out");
            return Err(ApiError::timeout());
        }
        Err(error) => {
            tracing::error!(%error, "chat dispatch failed");
            return Err(ApiError::internal("Failed to generate response"));
        }
    };

    let conversation_id = persist_turn(&state, persistence, &user_text, user_image, &message).await;

    Ok(Json(ChatResponse {
        message,
        conversation_id,
    }))
}

/// A database failure here only costs persistence: the turn is still answered.
async fn plan_persistence(
    state: &ApiState,
    caller: &Caller,
    conversation_id: Option<&str>,
) -> Result<Persistence, ApiError> {
    if conversation_id.is_some_and(conversation::is_local_conversation) {
        return Ok(Persistence::Skip);
    }
    let user_id = match caller.resolve(state).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return Ok(Persistence::Skip),
        Err(error) => {
            tracing::warn!(%error, "failed to resolve user, chat turn will not be saved");
            return Ok(Persistence::Skip);
        }
    };
    let Some(conversation_id) = conversation_id else {
        return Ok(Persistence::Create { user_id });
    };

    match state.conversations.is_owned_by(conversation_id, &user_id).await {
        Ok(true) => Ok(Persistence::Existing {
            conversation_id: conversation_id.to_string(),
        }),
        Ok(false) => Err(ApiError::not_found("Conversation not found")),
        Err(error) => {
            tracing::warn!(
                %error,
                %conversation_id,
                "failed to look up conversation, chat turn will not be saved"
            );
            Ok(Persistence::Skip)
        }
    }
}

/// Save the exchange. Failures are logged; the reply is delivered regardless.
async fn persist_turn(
    state: &ApiState,
    persistence: Persistence,
    user_text: &str,
    user_image: Option<String>,
    reply: &Message,
) -> Option<String> {
    let conversation_id = match persistence {
        Persistence::Skip => return None,
        Persistence::Existing { conversation_id } => conversation_id,
        Persistence::Create { user_id } => {
            let title = conversation::title_from_message(user_text);
            match state.conversations.create(&user_id, Some(&title)).await {
                Ok(conversation) => conversation.id,
                Err(error) => {
                    tracing::warn!(%error, "failed to create conversation for chat turn");
                    return None;
                }
            }
        }
    };

    let mut user_message = NewMessage::new(Role::User, user_text);
    user_message.image_url = user_image;
    let mut assistant_message = NewMessage::new(Role::Assistant, reply.content.clone());
    assistant_message.citations = reply.citations.clone();

    state
        .conversations
        .record_exchange(&conversation_id, user_message, assistant_message)
        .await;

    Some(conversation_id)
}

/// Drop client-sent system messages and describe the latest user turn's
/// attachments in its text.
fn prepare_history(messages: Vec<ChatMessage>, latest_user_index: usize) -> Vec<ChatMessage> {
    messages
        .into_iter()
        .enumerate()
        .filter(|(_, message)| message.role != Role::System)
        .map(|(index, mut message)| {
            if index == latest_user_index && !message.attachments.is_empty() {
                let descriptions: Vec<String> = message
                    .images()
                    .map(|image| format!("[Image: {}]", image.url))
                    .chain(message.documents().map(|document| {
                        format!("[Document: {} - {}]", document.name, document.url)
                    }))
                    .collect();
                message.content = Value::String(format!(
                    "{}\n\nAttachments:\n{}",
                    message.text(),
                    descriptions.join("\n")
                ));
            }
            message
        })
        .collect()
}

fn parse_tools(names: &[String]) -> Vec<ToolType> {
    names
        .iter()
        .filter_map(|name| {
            let tool = ToolType::parse(name);
            if tool.is_none() {
                tracing::debug!(%name, "ignoring unknown tool");
            }
            tool
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Attachment, AttachmentKind};

    fn attachment(kind: AttachmentKind, name: &str) -> Attachment {
        Attachment {
            id: name.into(),
            url: format!("https://files.example/{name}"),
            kind,
            name: name.into(),
        }
    }

    #[test]
    fn history_drops_system_and_describes_attachments() {
        let messages = vec![
            ChatMessage::new(Role::System, "client persona"),
            ChatMessage::new(Role::User, "earlier"),
            ChatMessage::new(Role::Assistant, "reply"),
            ChatMessage::new(Role::User, "Summarize these").with_attachments(vec![
                attachment(AttachmentKind::Image, "chart.png"),
                attachment(AttachmentKind::Document, "report.pdf"),
            ]),
        ];

        let history = prepare_history(messages, 3);

        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|message| message.role != Role::System));
        assert_eq!(
            history[2].text(),
            "Summarize these\n\nAttachments:\n[Image: https://files.example/chart.png]\n[Document: report.pdf - https://files.example/report.pdf]"
        );
        assert_eq!(history[2].images().count(), 1);
        assert_eq!(history[0].text(), "earlier");
    }

    #[test]
    fn unknown_tools_are_ignored() {
        let tools = parse_tools(&["web_search".into(), "teleport".into(), "file_search".into()]);
        assert_eq!(tools, vec![ToolType::WebSearch, ToolType::FileSearch]);
    }
}
