//! Validate command - syntax check and dry run of a SQL query.

use std::path::Path;
use std::sync::Arc;
use tabula_engine::SqliteEngine;
use tabula_llm::OfflineClient;
use tabula_pipeline::{PipelineConfig, SqlValidator};

use crate::loader::load_csv;

pub(crate) async fn run(file: &Path, sql: &str) -> miette::Result<()> {
    let dataset = load_csv(file)?;
    let config = PipelineConfig::from_env();
    let validator = SqlValidator::new(
        Arc::new(OfflineClient),
        Arc::new(SqliteEngine::new().with_timeout(config.engine_timeout)),
    )
    .with_timeouts(config.llm_timeout, config.engine_timeout);

    println!("Checking SQL against {}...", dataset.id);
    match validator.check(sql, &dataset).await {
        Ok(()) => {
            println!("  Syntax: ok");
            println!("  Dry run: ok");
            Ok(())
        }
        Err(rejection) => {
            println!("  {}", rejection);
            Err(miette::miette!("SQL rejected at the {} stage", rejection.stage))
        }
    }
}
