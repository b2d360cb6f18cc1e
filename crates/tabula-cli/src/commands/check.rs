//! Check command - is the configured model backend reachable?

use tabula_llm::{Backend, LlmConfig};

pub(crate) async fn run() -> miette::Result<()> {
    let config = LlmConfig::from_env();
    println!("Backend: {}", config.backend);
    if config.backend != Backend::Offline {
        println!("URL:     {}", config.url());
        println!("Model:   {}", config.model_name());
    }

    match config.check_availability().await {
        Ok(()) => {
            println!("Status:  available");
            Ok(())
        }
        Err(e) => {
            println!("Status:  unavailable ({})", e);
            println!();
            println!("Questions are still answered with deterministic rules.");
            println!("Set TABULA_LLM_BACKEND, TABULA_LLM_URL and TABULA_LLM_MODEL to configure a backend.");
            Err(miette::miette!("{} backend is not available", config.backend))
        }
    }
}
