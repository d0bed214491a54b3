//! LLM provider adapters, message formatting and fallback routing.

pub mod anthropic;
pub mod format;
pub mod gemini;
pub mod manager;
pub mod model;
pub mod openai;
pub mod providers;
pub mod routing;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::LlmManager;
pub use model::{ModelChoice, ModelType, ProviderKind};
pub use providers::{CompletionRequest, ProviderAdapter};
pub use routing::ProviderSet;
