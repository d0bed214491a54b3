//! Provider fallback cascade and error classification.

use crate::error::LlmError;
use crate::llm::model::{ModelChoice, ProviderKind};
use crate::llm::providers::{CompletionRequest, ProviderAdapter};
use crate::markup;
use crate::message::ChatMessage;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One adapter per provider. Lookup is an exhaustive match, so a new
/// provider cannot be added without wiring its adapter here.
#[derive(Clone)]
pub struct ProviderSet {
    pub openai: Arc<dyn ProviderAdapter>,
    pub anthropic: Arc<dyn ProviderAdapter>,
    pub gemini: Arc<dyn ProviderAdapter>,
}

impl ProviderSet {
    pub fn get(&self, kind: ProviderKind) -> &Arc<dyn ProviderAdapter> {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
            ProviderKind::Gemini => &self.gemini,
        }
    }
}

/// How a cascade ended when it was not cancelled.
#[derive(Debug)]
pub enum CascadeOutcome {
    /// A provider answered. `text` is already formatted markup.
    Completed { provider: ProviderKind, text: String },
    /// A provider reported quota exhaustion; the cascade stops there.
    RateLimited { provider: ProviderKind },
    /// Every provider failed.
    Exhausted { last_error: Option<LlmError> },
}

/// The primary provider followed by the others in fixed order.
pub fn fallback_order(primary: ProviderKind) -> Vec<ProviderKind> {
    let mut order = vec![primary];
    order.extend(
        ProviderKind::ALL
            .into_iter()
            .filter(|provider| *provider != primary),
    );
    order
}

/// Whether a provider error message indicates quota exhaustion or rate limiting.
pub fn is_quota_error(error_message: &str) -> bool {
    let lower = error_message.to_lowercase();
    lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("quota")
        || lower.contains("resource_exhausted")
        || lower.contains("resource exhausted")
}

/// Run one adapter and turn its raw text into markup. Blank replies count as
/// failures so the cascade moves on.
pub async fn attempt(
    adapter: &dyn ProviderAdapter,
    request: &CompletionRequest,
    cancel: &CancellationToken,
) -> Result<String, LlmError> {
    let raw = adapter.complete(request, cancel).await?;
    let formatted = markup::format_response(&raw);
    if formatted.trim().is_empty() {
        return Err(LlmError::EmptyResponse(adapter.kind().to_string()));
    }
    Ok(formatted)
}

/// Try the requested provider, then the remaining ones, until one answers.
///
/// Only cancellation is returned as an error.
pub async fn run_cascade(
    providers: &ProviderSet,
    choice: &ModelChoice,
    messages: &[ChatMessage],
    cancel: &CancellationToken,
) -> Result<CascadeOutcome, LlmError> {
    let mut last_error = None;

    for (index, provider) in fallback_order(choice.provider).into_iter().enumerate() {
        let request = CompletionRequest {
            messages: messages.to_vec(),
            model: choice.model_for(provider),
        };

        match attempt(providers.get(provider).as_ref(), &request, cancel).await {
            Ok(text) => {
                if index > 0 {
                    tracing::info!(
                        original = %choice.provider,
                        fallback = %provider,
                        attempt = index,
                        "fallback provider succeeded"
                    );
                }
                return Ok(CascadeOutcome::Completed { provider, text });
            }
            Err(LlmError::Cancelled) => return Err(LlmError::Cancelled),
            Err(error) if error.is_rate_limited() => {
                tracing::warn!(%error, provider = %provider, "provider quota exhausted");
                return Ok(CascadeOutcome::RateLimited { provider });
            }
            Err(error) => {
                tracing::warn!(
                    %error,
                    provider = %provider,
                    model = %request.model,
                    "provider failed, continuing cascade"
                );
                last_error = Some(error);
            }
        }
    }

    Ok(CascadeOutcome::Exhausted { last_error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{FakeProvider, Reply};
    use crate::message::Role;

    fn set(openai: Reply, anthropic: Reply, gemini: Reply) -> (ProviderSet, [Arc<FakeProvider>; 3]) {
        let openai = Arc::new(FakeProvider::new(ProviderKind::OpenAi, openai));
        let anthropic = Arc::new(FakeProvider::new(ProviderKind::Anthropic, anthropic));
        let gemini = Arc::new(FakeProvider::new(ProviderKind::Gemini, gemini));
        (
            ProviderSet {
                openai: openai.clone(),
                anthropic: anthropic.clone(),
                gemini: gemini.clone(),
            },
            [openai, anthropic, gemini],
        )
    }

    fn hello() -> Vec<ChatMessage> {
        vec![ChatMessage::new(Role::User, "Hello")]
    }

    #[test]
    fn fallback_order_skips_primary() {
        assert_eq!(
            fallback_order(ProviderKind::OpenAi),
            vec![ProviderKind::OpenAi, ProviderKind::Anthropic, ProviderKind::Gemini]
        );
        assert_eq!(
            fallback_order(ProviderKind::Anthropic),
            vec![ProviderKind::Anthropic, ProviderKind::OpenAi, ProviderKind::Gemini]
        );
        assert_eq!(
            fallback_order(ProviderKind::Gemini),
            vec![ProviderKind::Gemini, ProviderKind::OpenAi, ProviderKind::Anthropic]
        );
    }

    #[test]
    fn quota_wording_is_recognized() {
        assert!(is_quota_error("You exceeded your current quota"));
        assert!(is_quota_error("Error 429: Too Many Requests"));
        assert!(is_quota_error("RESOURCE_EXHAUSTED"));
        assert!(is_quota_error("rate_limit_error"));
        assert!(!is_quota_error("invalid api key"));
    }

    #[tokio::test]
    async fn primary_success_skips_fallbacks() {
        let (providers, [openai, anthropic, gemini]) =
            set(Reply::Text("Hi there".into()), Reply::Fail, Reply::Fail);
        let choice = ModelChoice::resolve(Some("gpt-4o"));

        let outcome = run_cascade(&providers, &choice, &hello(), &CancellationToken::new())
            .await
            .unwrap();

        match outcome {
            CascadeOutcome::Completed { provider, text } => {
                assert_eq!(provider, ProviderKind::OpenAi);
                assert_eq!(text, "<p>Hi there</p>");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(openai.calls(), 1);
        assert_eq!(anthropic.calls(), 0);
        assert_eq!(gemini.calls(), 0);
        assert_eq!(openai.last_model().as_deref(), Some("gpt-4o"));
    }

    #[tokio::test]
    async fn failures_cascade_in_order() {
        let (providers, [openai, anthropic, gemini]) =
            set(Reply::Fail, Reply::Fail, Reply::Text("from gemini".into()));
        let choice = ModelChoice::resolve(Some("claude-3-7-sonnet-20250219"));

        let outcome = run_cascade(&providers, &choice, &hello(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            CascadeOutcome::Completed { provider: ProviderKind::Gemini, .. }
        ));
        assert_eq!(anthropic.calls(), 1);
        assert_eq!(openai.calls(), 1);
        assert_eq!(gemini.calls(), 1);
        assert_eq!(openai.last_model().as_deref(), Some("gpt-4o"));
    }

    #[tokio::test]
    async fn blank_reply_counts_as_failure() {
        let (providers, [_, anthropic, _]) =
            set(Reply::Text("   ".into()), Reply::Text("ok".into()), Reply::Fail);
        let choice = ModelChoice::resolve(Some("gpt-4o"));

        let outcome = run_cascade(&providers, &choice, &hello(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            CascadeOutcome::Completed { provider: ProviderKind::Anthropic, .. }
        ));
        assert_eq!(anthropic.calls(), 1);
    }

    #[tokio::test]
    async fn all_failures_exhaust() {
        let (providers, calls) = set(Reply::Fail, Reply::Fail, Reply::Fail);
        let choice = ModelChoice::resolve(Some("gemini-2.0-flash"));

        let outcome = run_cascade(&providers, &choice, &hello(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome, CascadeOutcome::Exhausted { last_error: Some(_) }));
        assert!(calls.iter().all(|provider| provider.calls() == 1));
    }

    #[tokio::test]
    async fn rate_limit_stops_the_cascade() {
        let (providers, [_, anthropic, _]) =
            set(Reply::RateLimited, Reply::Text("unused".into()), Reply::Fail);
        let choice = ModelChoice::resolve(None);

        let outcome = run_cascade(&providers, &choice, &hello(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            CascadeOutcome::RateLimited { provider: ProviderKind::OpenAi }
        ));
        assert_eq!(anthropic.calls(), 0);
    }

    #[tokio::test]
    async fn cancellation_is_returned() {
        let (providers, [_, anthropic, _]) =
            set(Reply::Text("unused".into()), Reply::Text("unused".into()), Reply::Fail);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = run_cascade(&providers, &ModelChoice::resolve(None), &hello(), &cancel).await;

        assert!(matches!(result, Err(LlmError::Cancelled)));
        assert_eq!(anthropic.calls(), 0);
    }
}
