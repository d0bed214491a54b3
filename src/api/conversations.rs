//! Conversation CRUD. Ids with the `local-` prefix belong to the client and
//! are answered without touching the database.

use super::auth::Caller;
use super::error::ApiError;
use super::state::ApiState;
use crate::conversation::{self, NewMessage, StoredConversation};
use crate::message::{Citation, Role};

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct TitleRequest {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AddMessageRequest {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    citations: Vec<Citation>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MessageResponse {
    id: String,
    conversation_id: String,
    role: Role,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
    citations: Vec<Citation>,
    created_at: String,
}

#[derive(Serialize)]
pub(super) struct SuccessResponse {
    success: bool,
}

fn conversation_not_found() -> ApiError {
    ApiError::not_found("Conversation not found")
}

/// Body with an optional `title`. A missing or non-JSON body means no title.
fn title_from(payload: Result<Json<TitleRequest>, JsonRejection>) -> Result<Option<String>, ApiError> {
    match payload {
        Ok(Json(request)) => Ok(request.title.filter(|title| !title.trim().is_empty())),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(None),
        Err(rejection) => {
            tracing::debug!(%rejection, "rejected conversation body");
            Err(ApiError::bad_request("Invalid JSON in request body"))
        }
    }
}

pub(super) async fn list_conversations(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
) -> Result<Json<Vec<StoredConversation>>, ApiError> {
    let Some(user_id) = caller.user_id(&state).await? else {
        return Ok(Json(Vec::new()));
    };

    let conversations = state.conversations.list(&user_id).await.map_err(|error| {
        tracing::warn!(%error, "failed to list conversations");
        state.internal_error("Failed to fetch conversations", &error)
    })?;
    Ok(Json(conversations))
}

pub(super) async fn create_conversation(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    payload: Result<Json<TitleRequest>, JsonRejection>,
) -> Result<Json<StoredConversation>, ApiError> {
    let title = title_from(payload)?;

    let Some(user_id) = caller.user_id(&state).await? else {
        return Ok(Json(conversation::local_conversation(title.as_deref())));
    };

    let created = state
        .conversations
        .create(&user_id, title.as_deref())
        .await
        .map_err(|error| {
            tracing::warn!(%error, "failed to create conversation");
            state.internal_error("Failed to create conversation", &error)
        })?;
    Ok(Json(created))
}

pub(super) async fn get_conversation(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<StoredConversation>, ApiError> {
    if conversation::is_local_conversation(&id) {
        let mut local = conversation::local_conversation(None);
        local.id = id;
        return Ok(Json(local));
    }

    let user_id = caller.require_user(&state).await?;
    let found = state.conversations.get(&id, &user_id).await.map_err(|error| {
        tracing::warn!(%error, conversation_id = %id, "failed to fetch conversation");
        state.internal_error("Failed to fetch conversation", &error)
    })?;
    found.map(Json).ok_or_else(conversation_not_found)
}

pub(super) async fn update_conversation(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<TitleRequest>, JsonRejection>,
) -> Result<Json<StoredConversation>, ApiError> {
    let title = title_from(payload)?;

    if conversation::is_local_conversation(&id) {
        let mut local = conversation::local_conversation(title.as_deref());
        local.id = id;
        return Ok(Json(local));
    }

    let user_id = caller.require_user(&state).await?;
    let Some(title) = title else {
        return Err(ApiError::bad_request("Title is required"));
    };

    let updated = state
        .conversations
        .update_title(&id, &user_id, &title)
        .await
        .map_err(|error| {
            tracing::warn!(%error, conversation_id = %id, "failed to update conversation");
            state.internal_error("Failed to update conversation", &error)
        })?;
    updated.map(Json).ok_or_else(conversation_not_found)
}

pub(super) async fn delete_conversation(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if conversation::is_local_conversation(&id) {
        return Ok(Json(SuccessResponse { success: true }));
    }

    let user_id = caller.require_user(&state).await?;
    let deleted = state.conversations.delete(&id, &user_id).await.map_err(|error| {
        tracing::warn!(%error, conversation_id = %id, "failed to delete conversation");
        state.internal_error("Failed to delete conversation", &error)
    })?;
    if !deleted {
        return Err(conversation_not_found());
    }
    Ok(Json(SuccessResponse { success: true }))
}

pub(super) async fn add_message(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<AddMessageRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let local = conversation::is_local_conversation(&id);

    let user_id = if local {
        None
    } else {
        let user_id = caller.user_id(&state).await?.ok_or_else(|| {
            ApiError::unauthorized().with_code("auth_required")
        })?;
        Some(user_id)
    };

    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(%rejection, "rejected message body");
        ApiError::bad_request("Invalid JSON in request body")
    })?;
    let role = request.role.as_deref().and_then(Role::parse);
    let content = request.content.filter(|content| !content.is_empty());
    let (Some(role), Some(content)) = (role, content) else {
        return Err(ApiError::bad_request("Role and content are required"));
    };

    let Some(user_id) = user_id else {
        let now = chrono::Utc::now();
        return Ok(Json(MessageResponse {
            id: format!("local-msg-{}", now.timestamp_millis()),
            conversation_id: id,
            role,
            content,
            image_url: request.image_url,
            citations: request.citations,
            created_at: now.to_rfc3339(),
        }));
    };

    let owned = state
        .conversations
        .is_owned_by(&id, &user_id)
        .await
        .map_err(|error| {
            tracing::warn!(%error, conversation_id = %id, "failed to look up conversation");
            state.internal_error("Failed to add message", &error)
        })?;
    if !owned {
        return Err(conversation_not_found().with_code("not_found"));
    }

    let mut message = NewMessage::new(role, content);
    message.image_url = request.image_url;
    message.citations = request.citations;

    let stored = state.conversations.add_message(&id, message).await.map_err(|error| {
        tracing::warn!(%error, conversation_id = %id, "failed to add message");
        state.internal_error("Failed to add message", &error)
    })?;

    Ok(Json(MessageResponse {
        id: stored.id,
        conversation_id: id,
        role: stored.role,
        content: stored.content,
        image_url: stored.image_url,
        citations: stored.citations,
        created_at: stored.created_at,
    }))
}
