//! LLM manager: shared HTTP client and per-provider credentials.

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use crate::llm::anthropic::AnthropicAdapter;
use crate::llm::gemini::GeminiAdapter;
use crate::llm::model::ProviderKind;
use crate::llm::openai::OpenAiAdapter;
use crate::llm::routing::ProviderSet;

use anyhow::Context as _;
use std::sync::Arc;

/// Holds the provider configuration and the one HTTP client every adapter
/// and tool shares. Built once at startup, read-only afterwards.
pub struct LlmManager {
    config: LlmConfig,
    /// HTTP client for making requests.
    http_client: reqwest::Client,
}

impl LlmManager {
    /// Create a new LLM manager with the given configuration.
    pub async fn new(config: LlmConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .with_context(|| "failed to build HTTP client")?;

        for provider in ProviderKind::ALL {
            if config_key(&config, provider).is_some() {
                tracing::info!(%provider, "provider configured");
            }
        }

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Get the API key for a provider.
    pub fn api_key(&self, provider: ProviderKind) -> std::result::Result<&str, LlmError> {
        config_key(&self.config, provider)
            .ok_or_else(|| LlmError::MissingProviderKey(provider.to_string()))
    }

    /// Base URL for a provider, without a trailing slash.
    pub fn base_url(&self, provider: ProviderKind) -> &str {
        let url = match provider {
            ProviderKind::OpenAi => &self.config.openai_base_url,
            ProviderKind::Anthropic => &self.config.anthropic_base_url,
            ProviderKind::Gemini => &self.config.gemini_base_url,
        };
        url.trim_end_matches('/')
    }

    /// Get the HTTP client.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Adapters for all three providers, sharing this manager.
    pub fn provider_set(self: &Arc<Self>) -> ProviderSet {
        ProviderSet {
            openai: Arc::new(OpenAiAdapter::new(self.clone())),
            anthropic: Arc::new(AnthropicAdapter::new(self.clone())),
            gemini: Arc::new(GeminiAdapter::new(self.clone())),
        }
    }
}

fn config_key(config: &LlmConfig, provider: ProviderKind) -> Option<&str> {
    let key = match provider {
        ProviderKind::OpenAi => &config.openai_key,
        ProviderKind::Anthropic => &config.anthropic_key,
        ProviderKind::Gemini => &config.gemini_key,
    };
    key.as_deref().filter(|key| !key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_keys_are_reported_per_provider() {
        let manager = LlmManager::new(LlmConfig {
            openai_key: Some("sk-test".into()),
            ..LlmConfig::default()
        })
        .await
        .unwrap();

        assert_eq!(manager.api_key(ProviderKind::OpenAi).unwrap(), "sk-test");
        assert!(matches!(
            manager.api_key(ProviderKind::Gemini),
            Err(LlmError::MissingProviderKey(provider)) if provider == "gemini"
        ));
    }

    #[tokio::test]
    async fn base_urls_are_normalized() {
        let manager = LlmManager::new(LlmConfig {
            anthropic_base_url: "http://127.0.0.1:4000/".into(),
            ..LlmConfig::default()
        })
        .await
        .unwrap();

        assert_eq!(manager.base_url(ProviderKind::Anthropic), "http://127.0.0.1:4000");
    }
}
