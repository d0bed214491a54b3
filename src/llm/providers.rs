//! The provider adapter seam and the HTTP plumbing the adapters share.

use crate::error::LlmError;
use crate::llm::model::ProviderKind;
use crate::llm::routing;
use crate::message::ChatMessage;

use tokio_util::sync::CancellationToken;

/// Sampling temperature for every chat completion.
pub const TEMPERATURE: f64 = 0.7;

/// Output token cap for every chat completion.
pub const MAX_TOKENS: u32 = 2000;

/// One completion call: the conversation (system message included) and the
/// vendor model id to run it on.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
}

/// A single vendor API. Implementations issue exactly one request per call
/// and return the raw text of the reply.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError>;
}

/// Send a JSON request and return the parsed JSON body.
///
/// Returns `Cancelled` without touching the network if `cancel` already fired,
/// and aborts the in-flight request if it fires later.
pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
    provider_label: &str,
    cancel: &CancellationToken,
) -> Result<serde_json::Value, LlmError> {
    if cancel.is_cancelled() {
        return Err(LlmError::Cancelled);
    }

    let exchange = async {
        let response = request
            .send()
            .await
            .map_err(|error| LlmError::ProviderRequest(format!("{provider_label}: {error}")))?;
        let status = response.status();
        let text = response.text().await.map_err(|error| {
            LlmError::ProviderRequest(format!(
                "{provider_label}: failed to read response body: {error}"
            ))
        })?;
        Ok::<_, LlmError>((status, text))
    };

    let (status, response_text) = tokio::select! {
        _ = cancel.cancelled() => return Err(LlmError::Cancelled),
        result = exchange => result?,
    };

    let body: serde_json::Value = match serde_json::from_str(&response_text) {
        Ok(body) => body,
        Err(error) if status.is_success() => {
            return Err(LlmError::ProviderRequest(format!(
                "{provider_label} response ({status}) is not valid JSON: {error}\nBody: {}",
                truncate_body(&response_text)
            )));
        }
        Err(_) => serde_json::Value::String(truncate_body(&response_text).to_string()),
    };

    if !status.is_success() {
        let message = body["error"]["message"]
            .as_str()
            .or_else(|| body.as_str())
            .unwrap_or("unknown error");

        if status.as_u16() == 429 || routing::is_quota_error(message) {
            return Err(LlmError::RateLimited {
                provider: provider_label.to_string(),
                message: message.to_string(),
            });
        }

        return Err(LlmError::ProviderRequest(format!(
            "{provider_label} API error ({status}): {message}"
        )));
    }

    Ok(body)
}

/// Truncate a response body for error messages to avoid dumping megabytes of HTML.
pub(crate) fn truncate_body(body: &str) -> &str {
    let limit = 500;
    if body.len() <= limit {
        return body;
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
