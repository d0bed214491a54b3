//! Caller identity from the trusted auth header.
//!
//! Reading the header never touches the database; the user row is only
//! resolved when a handler needs it, so local conversation routes stay
//! database-free.

use super::error::ApiError;
use super::state::ApiState;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub(super) struct Caller {
    email: Option<String>,
}

impl FromRequestParts<Arc<ApiState>> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiState>,
    ) -> Result<Self, Self::Rejection> {
        let email = parts
            .headers
            .get(state.user_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_lowercase);
        Ok(Self { email })
    }
}

impl Caller {
    /// The caller's user id, or `None` when they are not signed in.
    pub(super) async fn user_id(&self, state: &ApiState) -> Result<Option<String>, ApiError> {
        self.resolve(state).await.map_err(|error| {
            tracing::warn!(%error, "failed to resolve user");
            state.internal_error("Failed to resolve user", &error)
        })
    }

    /// Like [`Caller::user_id`], leaving storage errors to the handler.
    pub(super) async fn resolve(&self, state: &ApiState) -> crate::Result<Option<String>> {
        let Some(email) = &self.email else {
            return Ok(None);
        };
        let user_id = state.conversations.upsert_user(email).await?;
        Ok(Some(user_id))
    }

    /// The caller's user id, or 401.
    pub(super) async fn require_user(&self, state: &ApiState) -> Result<String, ApiError> {
        self.user_id(state).await?.ok_or_else(ApiError::unauthorized)
    }
}
