//! Configuration loading and validation.
//!
//! Secrets come from the environment. Everything else can also be set in an
//! optional TOML file; environment variables win over the file.

use crate::error::{ConfigError, Result};
use anyhow::Context as _;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Vector store searched by the file search tool unless configured otherwise.
pub const DEFAULT_VECTOR_STORE_ID: &str = "vs_67d84dc3a8388191a1d9814cdf8b28d3";

/// Variables that must be present before the server starts.
const REQUIRED_ENV: [&str; 4] = [
    "OPENAI_API_KEY",
    "UPLOADTHING_SECRET",
    "UPLOADTHING_APP_ID",
    "UPLOADTHING_TOKEN",
];

/// Marcus configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory path.
    pub data_dir: PathBuf,

    /// Address the HTTP API binds to.
    pub bind: SocketAddr,

    /// Deployment environment. Controls whether error details reach clients.
    pub environment: Environment,

    /// LLM provider configuration.
    pub llm: LlmConfig,

    /// Hosted upload service credentials.
    pub uploads: UploadConfig,

    /// Chat request behavior.
    pub chat: ChatConfig,

    /// Header carrying the signed-in user's email, set by the auth proxy.
    pub user_header: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub openai_key: Option<String>,
    pub anthropic_key: Option<String>,
    pub gemini_key: Option<String>,

    pub openai_base_url: String,
    pub anthropic_base_url: String,
    pub gemini_base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_key: None,
            anthropic_key: None,
            gemini_key: None,
            openai_base_url: "https://api.openai.com".into(),
            anthropic_base_url: "https://api.anthropic.com".into(),
            gemini_base_url: "https://generativelanguage.googleapis.com".into(),
        }
    }
}

/// Upload service credentials. Only validated here; uploads happen client side.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub secret: String,
    pub app_id: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Wall-clock budget for one chat request, in seconds.
    pub request_timeout_secs: u64,

    pub vector_store_id: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 90,
            vector_store_id: DEFAULT_VECTOR_STORE_ID.into(),
        }
    }
}

/// Non-secret settings accepted from the TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    bind: Option<SocketAddr>,
    environment: Option<Environment>,
    user_header: Option<String>,
    #[serde(default)]
    llm: FileLlmConfig,
    #[serde(default)]
    chat: FileChatConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileLlmConfig {
    openai_base_url: Option<String>,
    anthropic_base_url: Option<String>,
    gemini_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileChatConfig {
    request_timeout_secs: Option<u64>,
    vector_store_id: Option<String>,
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        Self::finish(Self::resolve(&env_lookup, FileConfig::default())?)
    }

    /// Load from a TOML file, with environment variables taking precedence.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Load {
            path: path.display().to_string(),
            source: Arc::new(source),
        })?;
        let file = toml::from_str::<FileConfig>(&raw)
            .map_err(|error| ConfigError::Invalid(format!("{}: {error}", path.display())))?;

        Self::finish(Self::resolve(&env_lookup, file)?)
    }

    fn finish(config: Self) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!(
                "failed to create data directory: {}",
                config.data_dir.display()
            )
        })?;
        Ok(config)
    }

    /// Build a config from a variable lookup and parsed file settings.
    fn resolve(lookup: &dyn Fn(&str) -> Option<String>, file: FileConfig) -> Result<Self> {
        let missing: Vec<String> = REQUIRED_ENV
            .iter()
            .filter(|name| lookup(**name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingEnv(missing).into());
        }

        let required = |name: &str| lookup(name).unwrap_or_default();

        let data_dir = lookup("MARCUS_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .map(|d| d.join("marcus"))
                    .unwrap_or_else(|| PathBuf::from("./data"))
            });

        let bind: SocketAddr = match lookup("MARCUS_BIND") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("MARCUS_BIND is not an address: {value}")))?,
            None => file
                .bind
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000))),
        };

        let environment = match lookup("MARCUS_ENV") {
            Some(value) => Environment::parse(&value).ok_or_else(|| {
                ConfigError::Invalid(format!("MARCUS_ENV must be development or production, got {value}"))
            })?,
            None => file.environment.unwrap_or(Environment::Production),
        };

        let defaults = LlmConfig::default();
        let llm = LlmConfig {
            openai_key: lookup("OPENAI_API_KEY"),
            anthropic_key: lookup("ANTHROPIC_API_KEY"),
            gemini_key: lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_API_KEY")),
            openai_base_url: lookup("OPENAI_BASE_URL")
                .or(file.llm.openai_base_url)
                .unwrap_or(defaults.openai_base_url),
            anthropic_base_url: lookup("ANTHROPIC_BASE_URL")
                .or(file.llm.anthropic_base_url)
                .unwrap_or(defaults.anthropic_base_url),
            gemini_base_url: lookup("GEMINI_BASE_URL")
                .or(file.llm.gemini_base_url)
                .unwrap_or(defaults.gemini_base_url),
        };

        if llm.anthropic_key.is_none() {
            tracing::warn!("ANTHROPIC_API_KEY not set, Anthropic fallback disabled");
        }
        if llm.gemini_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set, Gemini fallback disabled");
        }

        let chat_defaults = ChatConfig::default();
        let request_timeout_secs: u64 = match lookup("MARCUS_REQUEST_TIMEOUT_SECS") {
            Some(value) => value.parse().map_err(|_| {
                ConfigError::Invalid(format!("MARCUS_REQUEST_TIMEOUT_SECS is not a number: {value}"))
            })?,
            None => file
                .chat
                .request_timeout_secs
                .unwrap_or(chat_defaults.request_timeout_secs),
        };
        if request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request timeout must be positive".into()).into());
        }

        let chat = ChatConfig {
            request_timeout_secs,
            vector_store_id: lookup("MARCUS_VECTOR_STORE_ID")
                .or(file.chat.vector_store_id)
                .unwrap_or(chat_defaults.vector_store_id),
        };

        Ok(Self {
            data_dir,
            bind,
            environment,
            llm,
            uploads: UploadConfig {
                secret: required("UPLOADTHING_SECRET"),
                app_id: required("UPLOADTHING_APP_ID"),
                token: required("UPLOADTHING_TOKEN"),
            },
            chat,
            user_header: lookup("MARCUS_USER_HEADER")
                .or(file.user_header)
                .unwrap_or_else(|| "x-user-email".into())
                .to_lowercase(),
        })
    }

    /// Get the SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("marcus.db")
    }
}

/// Reads a variable, treating empty values as unset.
fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}
