//! CLI commands.

pub mod analyze;
pub mod chat;
pub mod check;
pub mod info;
pub mod profile;
pub mod validate;

use tabula_llm::LlmConfig;
use tabula_pipeline::{Pipeline, PipelineConfig};

/// Build a pipeline from the environment, or a fully offline one.
pub(crate) fn build_pipeline(offline: bool) -> miette::Result<Pipeline> {
    let llm = if offline {
        LlmConfig::offline()
    } else {
        LlmConfig::from_env()
    };
    let client = llm
        .build_client()
        .map_err(|e| miette::miette!("Failed to create {} client: {}", llm.backend, e))?;

    Ok(Pipeline::builder()
        .config(PipelineConfig::from_env())
        .client(client)
        .embedder(llm.build_embedder())
        .build())
}
