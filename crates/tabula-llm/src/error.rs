//! Error types for completion and embedding calls.

use thiserror::Error;

/// Errors that can occur while talking to a model backend.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned an error response.
    #[error("API error: {0}")]
    Api(String),

    /// Server is not running or not reachable.
    #[error("server not running at {0}")]
    ServerNotRunning(String),

    /// Model not available on the server.
    #[error("model '{0}' not found")]
    ModelNotFound(String),

    /// Backend needs a key and none was configured.
    #[error("missing API key for {0}")]
    MissingApiKey(&'static str),

    /// Call did not finish in time.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// Output contained no usable JSON.
    #[error("unparsable model output: {0}")]
    Unparsable(String),

    /// The offline backend never generates.
    #[error("offline backend: no model configured")]
    Offline,

    /// Backend answered with nothing.
    #[error("empty response")]
    EmptyResponse,
}
