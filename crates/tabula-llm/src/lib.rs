//! # Tabula LLM Integration
//!
//! Text generation and embedding behind two small traits, so the pipeline
//! never depends on a particular provider.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  Pipeline stage │ --> │ CompletionClient │ --> │  Raw text       │
//! │  (prompt)       │     │ (Ollama/OpenAI/  │     │  (untrusted)    │
//! └─────────────────┘     │  Anthropic)      │     └────────┬────────┘
//!                         └──────────────────┘              │
//!                                                    ┌──────┴──────┐
//!                                                    │ parse_json  │
//!                                                    └─────────────┘
//! ```
//!
//! ## Backends
//!
//! - **Ollama** (default) - local server, `/api/generate` and `/api/embed`
//! - **OpenAI-compatible** - OpenAI, llama.cpp `llama-server`, vLLM
//! - **Anthropic** - Messages API
//! - **Offline** - every call fails fast so callers take their rule-based path
//!
//! ## Usage
//!
//! ```ignore
//! use tabula_llm::{CompletionRequest, LlmConfig};
//!
//! let config = LlmConfig::from_env();
//! let client = config.build_client()?;
//! let text = client.generate(&CompletionRequest::new("Say hi").json()).await?;
//! ```

mod anthropic;
mod client;
mod config;
mod embed;
mod error;
mod json;
mod ollama;
mod openai;
mod scripted;

pub use anthropic::{AnthropicClient, ANTHROPIC_API_URL, DEFAULT_ANTHROPIC_MODEL};
pub use client::{CompletionClient, CompletionRequest, OfflineClient};
pub use config::{Backend, LlmConfig, LlmConfigBuilder};
pub use embed::{cosine_similarity, Embedder, HashingEmbedder, DEFAULT_EMBEDDING_DIM};
pub use error::LlmError;
pub use json::{locate_json, parse_json};
pub use ollama::{OllamaClient, DEFAULT_OLLAMA_EMBED_MODEL, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL};
pub use openai::{OpenAiClient, DEFAULT_OPENAI_EMBED_MODEL, DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_URL};
pub use scripted::ScriptedClient;
