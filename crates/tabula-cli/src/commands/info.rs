//! Info command - show configuration and components.

use tabula_llm::LlmConfig;
use tabula_pipeline::PipelineConfig;

pub(crate) fn run() -> miette::Result<()> {
    println!("Tabula");
    println!("======");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("Components:");
    println!("  tabula-types     - Data model and plan validation");
    println!("  tabula-llm       - Completion and embedding clients");
    println!("  tabula-engine    - Sandboxed SQLite query engine");
    println!("  tabula-profiler  - Schema profiling and cache");
    println!("  tabula-rag       - Retrieval over schema, past queries and glossary");
    println!("  tabula-pipeline  - Agents and orchestrator");
    println!();

    let llm = LlmConfig::from_env();
    println!("Model:");
    println!("  Backend: {}", llm.backend);
    println!("  Model:   {}", llm.model_name());
    println!("  Timeout: {}s", llm.timeout.as_secs());
    println!();

    let config = PipelineConfig::from_env();
    println!("Pipeline:");
    println!("  Max retries:      {}", config.max_retries);
    println!("  Max corrections:  {}", config.max_corrections);
    println!("  Self-consistency: {}", config.self_consistency_candidates);
    println!("  History turns:    {}", config.history_turns);
    println!("  Retrieval top-k:  {}", config.top_k);
    match &config.cache_dir {
        Some(dir) if config.plan_cache => println!("  Plan cache:       {}", dir.display()),
        _ if config.plan_cache => println!("  Plan cache:       in memory"),
        _ => println!("  Plan cache:       off"),
    }

    Ok(())
}
