//! File records and vector stores for the signed-in user.

use super::auth::Caller;
use super::error::ApiError;
use super::state::ApiState;
use crate::error::{Error, LlmError};
use crate::files::{FileRecord, VectorStoreRecord};

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct DeleteFileQuery {
    id: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct CreateVectorStoreRequest {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Serialize)]
pub(super) struct UploadResponse {
    success: bool,
    error: &'static str,
}

pub(super) async fn list_files(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
) -> Result<Json<Vec<FileRecord>>, ApiError> {
    let user_id = caller.require_user(&state).await?;
    let files = state.files.list(&user_id).await.map_err(|error| {
        tracing::warn!(%error, "failed to list files");
        state.internal_error("Failed to fetch files", &error)
    })?;
    Ok(Json(files))
}

pub(super) async fn delete_file(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    Query(query): Query<DeleteFileQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = caller.require_user(&state).await?;
    let Some(id) = query.id.filter(|id| !id.is_empty()) else {
        return Err(ApiError::bad_request("File ID is required"));
    };

    let deleted = state.files.delete(&id, &user_id).await.map_err(|error| {
        tracing::warn!(%error, file_id = %id, "failed to delete file");
        state.internal_error("Failed to delete file", &error)
    })?;
    if !deleted {
        return Err(ApiError::not_found("File not found"));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Uploads go straight to the hosted upload service, never through here.
pub(super) async fn upload_file() -> (StatusCode, Json<UploadResponse>) {
    (
        StatusCode::FORBIDDEN,
        Json(UploadResponse {
            success: false,
            error: "File uploads are handled by the Marcus AI team",
        }),
    )
}

pub(super) async fn list_vector_stores(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
) -> Result<Json<Vec<VectorStoreRecord>>, ApiError> {
    let user_id = caller.require_user(&state).await?;
    let stores = state.vector_stores.list(&user_id).await.map_err(|error| {
        tracing::warn!(%error, "failed to list vector stores");
        state.internal_error("Failed to fetch vector stores", &error)
    })?;
    Ok(Json(stores))
}

pub(super) async fn create_vector_store(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    payload: Result<Json<CreateVectorStoreRequest>, JsonRejection>,
) -> Result<Json<VectorStoreRecord>, ApiError> {
    let user_id = caller.require_user(&state).await?;
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(%rejection, "rejected vector store body");
        ApiError::bad_request("Invalid JSON in request body")
    })?;
    let Some(name) = request.name.filter(|name| !name.trim().is_empty()) else {
        return Err(ApiError::bad_request("Name is required"));
    };

    match state.vector_stores.create(&user_id, &name).await {
        Ok(store) => Ok(Json(store)),
        Err(Error::Llm(LlmError::RateLimited { message, .. })) => {
            tracing::warn!(%message, "vector store creation rate limited");
            Err(ApiError::new(
                StatusCode::TOO_MANY_REQUESTS,
                "The AI provider is rate limiting requests. Please try again shortly.",
            )
            .with_code("rate_limited"))
        }
        Err(error) => {
            tracing::warn!(%error, "failed to create vector store");
            Err(state.internal_error("Failed to create vector store", &error))
        }
    }
}
