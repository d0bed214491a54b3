//! Model and provider identifiers.

use serde::{Deserialize, Serialize};

/// The three vendor APIs Marcus can talk to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    /// Fallback cascade order.
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
        }
    }

    /// Model used when this provider is reached without a model of its own,
    /// e.g. as a fallback for a request that named another vendor's model.
    pub fn default_model(self) -> ModelType {
        match self {
            ProviderKind::OpenAi => ModelType::Gpt4o,
            ProviderKind::Anthropic => ModelType::Claude37Sonnet,
            ProviderKind::Gemini => ModelType::Gemini20Flash,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Models the chat UI offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ModelType {
    #[default]
    Gpt45Preview,
    Gpt4o,
    Gpt4oMini,
    Gpt4oMiniSearchPreview,
    Gpt4TurboPreview,
    Claude37Sonnet,
    Gemini20Flash,
}

impl ModelType {
    pub const ALL: [ModelType; 7] = [
        ModelType::Gpt45Preview,
        ModelType::Gpt4o,
        ModelType::Gpt4oMini,
        ModelType::Gpt4oMiniSearchPreview,
        ModelType::Gpt4TurboPreview,
        ModelType::Claude37Sonnet,
        ModelType::Gemini20Flash,
    ];

    /// Vendor model id sent on the wire.
    pub fn id(self) -> &'static str {
        match self {
            ModelType::Gpt45Preview => "gpt-4.5-preview-2025-02-27",
            ModelType::Gpt4o => "gpt-4o",
            ModelType::Gpt4oMini => "gpt-4o-mini",
            ModelType::Gpt4oMiniSearchPreview => "gpt-4o-mini-search-preview-2025-03-11",
            ModelType::Gpt4TurboPreview => "gpt-4-turbo-preview",
            ModelType::Claude37Sonnet => "claude-3-7-sonnet-20250219",
            ModelType::Gemini20Flash => "gemini-2.0-flash",
        }
    }

    pub fn provider(self) -> ProviderKind {
        match self {
            ModelType::Gpt45Preview
            | ModelType::Gpt4o
            | ModelType::Gpt4oMini
            | ModelType::Gpt4oMiniSearchPreview
            | ModelType::Gpt4TurboPreview => ProviderKind::OpenAi,
            ModelType::Claude37Sonnet => ProviderKind::Anthropic,
            ModelType::Gemini20Flash => ProviderKind::Gemini,
        }
    }

    /// Exact id lookup. `GPT_4_5_PREVIEW` is the client-side name of the default model.
    pub fn parse(value: &str) -> Option<Self> {
        if value == "GPT_4_5_PREVIEW" {
            return Some(ModelType::Gpt45Preview);
        }
        Self::ALL.into_iter().find(|model| model.id() == value)
    }
}

/// A model as requested by a client: a known model, or a free-form id routed
/// to a provider by its prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    pub provider: ProviderKind,
    pub model: String,
}

impl ModelChoice {
    pub fn resolve(requested: Option<&str>) -> Self {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let Some(requested) = requested else {
            return Self::from(ModelType::default());
        };

        if let Some(model) = ModelType::parse(requested) {
            return Self::from(model);
        }

        let lower = requested.to_lowercase();
        let provider = if lower.starts_with("claude") {
            ProviderKind::Anthropic
        } else if lower.starts_with("gemini") {
            ProviderKind::Gemini
        } else {
            // gpt-*, o-series and anything unrecognized
            ProviderKind::OpenAi
        };

        Self {
            provider,
            model: requested.to_string(),
        }
    }

    /// The model id to send when `provider` serves this request.
    pub fn model_for(&self, provider: ProviderKind) -> String {
        if provider == self.provider {
            self.model.clone()
        } else {
            provider.default_model().id().to_string()
        }
    }
}

impl From<ModelType> for ModelChoice {
    fn from(model: ModelType) -> Self {
        Self {
            provider: model.provider(),
            model: model.id().to_string(),
        }
    }
}
