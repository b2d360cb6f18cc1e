//! Model backend configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::{
    AnthropicClient, CompletionClient, Embedder, HashingEmbedder, LlmError, OfflineClient,
    OllamaClient, OpenAiClient, DEFAULT_ANTHROPIC_MODEL, DEFAULT_OLLAMA_EMBED_MODEL,
    DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_OPENAI_EMBED_MODEL, DEFAULT_OPENAI_MODEL,
    DEFAULT_OPENAI_URL,
};

/// Which provider serves completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Ollama,
    OpenAi,
    Anthropic,
    Offline,
}

impl Backend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(Backend::Ollama),
            "openai" | "openai-compatible" | "llama.cpp" | "llamacpp" => Some(Backend::OpenAi),
            "anthropic" | "claude" => Some(Backend::Anthropic),
            "offline" | "none" => Some(Backend::Offline),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Ollama => "ollama",
            Backend::OpenAi => "openai",
            Backend::Anthropic => "anthropic",
            Backend::Offline => "offline",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Backend::Ollama => DEFAULT_OLLAMA_MODEL,
            Backend::OpenAi => DEFAULT_OPENAI_MODEL,
            Backend::Anthropic => DEFAULT_ANTHROPIC_MODEL,
            Backend::Offline => "none",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for completion and embedding clients.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: Backend,
    /// Server URL; backend default when unset
    pub base_url: Option<String>,
    /// Model name; backend default when unset
    pub model: Option<String>,
    /// Embedding model; backend default when unset
    pub embed_model: Option<String>,
    pub api_key: String,
    /// HTTP timeout per request
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Ollama,
            base_url: None,
            model: None,
            embed_model: None,
            api_key: String::new(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl LlmConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let backend = match std::env::var("TABULA_LLM_BACKEND") {
            Ok(v) => Backend::parse(&v).unwrap_or_else(|| {
                warn!(value = %v, "unknown TABULA_LLM_BACKEND, using ollama");
                Backend::Ollama
            }),
            Err(_) => Backend::Ollama,
        };

        let api_key = std::env::var("TABULA_API_KEY")
            .or_else(|_| match backend {
                Backend::Anthropic => std::env::var("ANTHROPIC_API_KEY"),
                _ => std::env::var("OPENAI_API_KEY"),
            })
            .unwrap_or_default();

        let timeout = std::env::var("TABULA_LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));

        Self {
            backend,
            base_url: std::env::var("TABULA_LLM_URL").ok(),
            model: std::env::var("TABULA_LLM_MODEL").ok(),
            embed_model: std::env::var("TABULA_EMBED_MODEL").ok(),
            api_key,
            timeout,
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> LlmConfigBuilder {
        LlmConfigBuilder::default()
    }

    /// Offline configuration: no model calls at all.
    pub fn offline() -> Self {
        Self {
            backend: Backend::Offline,
            ..Self::default()
        }
    }

    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.backend.default_model())
    }

    pub fn url(&self) -> &str {
        match (&self.base_url, self.backend) {
            (Some(url), _) => url.as_str(),
            (None, Backend::Ollama) => DEFAULT_OLLAMA_URL,
            (None, Backend::OpenAi) => DEFAULT_OPENAI_URL,
            (None, Backend::Anthropic) => crate::ANTHROPIC_API_URL,
            (None, Backend::Offline) => "",
        }
    }

    /// Build the completion client for the configured backend.
    pub fn build_client(&self) -> Result<Arc<dyn CompletionClient>, LlmError> {
        let client: Arc<dyn CompletionClient> = match self.backend {
            Backend::Ollama => Arc::new(self.ollama()),
            Backend::OpenAi => Arc::new(self.openai()),
            Backend::Anthropic => Arc::new(
                AnthropicClient::new(&self.api_key, self.timeout)?
                    .with_url(self.url())
                    .with_model(self.model_name()),
            ),
            Backend::Offline => Arc::new(OfflineClient),
        };
        Ok(client)
    }

    /// Build the embedder. Backends without an embedding endpoint use
    /// [`HashingEmbedder`].
    pub fn build_embedder(&self) -> Arc<dyn Embedder> {
        match self.backend {
            Backend::Ollama => Arc::new(self.ollama()),
            Backend::OpenAi => Arc::new(self.openai()),
            Backend::Anthropic | Backend::Offline => Arc::new(HashingEmbedder::default()),
        }
    }

    /// Check that the backend answers.
    pub async fn check_availability(&self) -> Result<(), LlmError> {
        match self.backend {
            Backend::Ollama => self.ollama().check_availability().await,
            Backend::OpenAi => self.openai().check_health().await,
            Backend::Anthropic if self.api_key.is_empty() => {
                Err(LlmError::MissingApiKey("anthropic"))
            }
            Backend::Anthropic => Ok(()),
            Backend::Offline => Err(LlmError::Offline),
        }
    }

    fn ollama(&self) -> OllamaClient {
        OllamaClient::with_config(self.url(), self.model_name())
            .with_embed_model(
                self.embed_model
                    .as_deref()
                    .unwrap_or(DEFAULT_OLLAMA_EMBED_MODEL),
            )
            .with_timeout(self.timeout)
    }

    fn openai(&self) -> OpenAiClient {
        let key = (!self.api_key.is_empty()).then(|| self.api_key.clone());
        OpenAiClient::with_url(self.url(), key)
            .with_model(self.model_name())
            .with_embed_model(
                self.embed_model
                    .as_deref()
                    .unwrap_or(DEFAULT_OPENAI_EMBED_MODEL),
            )
            .with_timeout(self.timeout)
    }
}

/// Builder for model configuration.
#[derive(Debug, Default)]
pub struct LlmConfigBuilder {
    config: LlmConfig,
}

impl LlmConfigBuilder {
    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn embed_model(mut self, model: impl Into<String>) -> Self {
        self.config.embed_model = Some(model.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn build(self) -> LlmConfig {
        self.config
    }
}
