//! Shared plumbing for the stages: the error type and timed external calls.

use std::time::{Duration, Instant};
use tabula_engine::QueryEngine;
use tabula_llm::{CompletionClient, CompletionRequest, LlmError};
use tabula_types::{Dataset, QueryOutcome};
use thiserror::Error;
use tracing::debug;

/// Why a stage's primary path produced nothing usable.
///
/// Never escapes the pipeline; callers switch to the deterministic path.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("completion failed: {0}")]
    Completion(#[from] LlmError),

    #[error("{stage} timed out after {ms}ms")]
    Timeout { stage: &'static str, ms: u64 },

    #[error("unusable output: {0}")]
    Unusable(String),
}

/// One completion call bounded by `timeout`.
pub(crate) async fn complete(
    client: &dyn CompletionClient,
    request: CompletionRequest,
    timeout: Duration,
    stage: &'static str,
) -> Result<String, StageError> {
    debug!(stage, backend = client.name(), prompt_len = request.prompt.len(), "completion call");
    let started = Instant::now();
    match tokio::time::timeout(timeout, client.generate(&request)).await {
        Ok(result) => {
            let text = result?;
            debug!(
                stage,
                elapsed_ms = started.elapsed().as_millis() as u64,
                preview = %preview(&text),
                "completion returned"
            );
            Ok(text)
        }
        Err(_) => Err(StageError::Timeout {
            stage,
            ms: timeout.as_millis() as u64,
        }),
    }
}

/// One engine call bounded by `timeout`. Timeouts come back as query errors.
pub(crate) async fn execute(
    engine: &dyn QueryEngine,
    sql: &str,
    dataset: &Dataset,
    timeout: Duration,
) -> QueryOutcome {
    match tokio::time::timeout(timeout, engine.execute(sql, dataset)).await {
        Ok(outcome) => outcome,
        Err(_) => QueryOutcome::error(format!(
            "query timed out after {}ms",
            timeout.as_millis()
        )),
    }
}

fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    match flat.char_indices().nth(120) {
        Some((i, _)) => format!("{}...", &flat[..i]),
        None => flat,
    }
}
