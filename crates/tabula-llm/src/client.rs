//! The completion contract.

use async_trait::async_trait;

use crate::LlmError;

/// Default sampling temperature; low for repeatable structured output.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Default response budget.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// One completion request. Clients are stateless; everything a call needs is here.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    /// Ask the backend for JSON output when it supports it
    pub json_mode: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            json_mode: false,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Stateless text generation.
///
/// Returned text is untrusted: it may carry code fences, prose around the
/// payload, or malformed JSON. Run it through [`crate::parse_json`].
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

/// A client that never generates.
///
/// Every stage falls through to its deterministic path.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineClient;

#[async_trait]
impl CompletionClient for OfflineClient {
    async fn generate(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
        Err(LlmError::Offline)
    }

    fn name(&self) -> &str {
        "offline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = CompletionRequest::new("hello")
            .system("be brief")
            .json()
            .temperature(0.7)
            .max_tokens(64);
        assert_eq!(req.system_prompt.as_deref(), Some("be brief"));
        assert!(req.json_mode);
        assert_eq!(req.temperature, 0.7);
        assert_eq!(req.max_tokens, 64);
    }

    #[tokio::test]
    async fn test_offline_client_fails() {
        let result = OfflineClient.generate(&CompletionRequest::new("x")).await;
        assert!(matches!(result, Err(LlmError::Offline)));
    }
}
