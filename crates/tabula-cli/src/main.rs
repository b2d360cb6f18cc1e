//! Tabula CLI - ask questions about CSV files.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod loader;

/// Tabula - natural-language analysis of tabular data
#[derive(Parser)]
#[command(name = "tabula")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question about a CSV file
    Analyze {
        /// Input CSV file
        file: PathBuf,
        /// The question
        question: String,
        /// Earlier conversation turns (JSON file)
        #[arg(long)]
        history: Option<PathBuf>,
        /// Output the full response as JSON
        #[arg(long)]
        json: bool,
        /// Skip the model and use deterministic rules only
        #[arg(long)]
        offline: bool,
    },

    /// Interactive session over a CSV file
    Chat {
        /// Input CSV file
        file: PathBuf,
        /// Skip the model and use deterministic rules only
        #[arg(long)]
        offline: bool,
    },

    /// Profile the columns of a CSV file
    Profile {
        /// Input CSV file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a SQL query against a CSV file without running it in full
    Validate {
        /// Input CSV file
        file: PathBuf,
        /// The SQL query (the table is named `data`)
        sql: String,
    },

    /// Check that the configured model backend is reachable
    Check,

    /// Show configuration and components
    Info,
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| miette::miette!("Failed to start async runtime: {}", e))?;

    match cli.command {
        Commands::Analyze {
            file,
            question,
            history,
            json,
            offline,
        } => runtime.block_on(commands::analyze::run(
            &file,
            &question,
            history.as_deref(),
            json,
            offline,
        )),
        Commands::Chat { file, offline } => runtime.block_on(commands::chat::run(&file, offline)),
        Commands::Profile { file, json } => runtime.block_on(commands::profile::run(&file, json)),
        Commands::Validate { file, sql } => runtime.block_on(commands::validate::run(&file, &sql)),
        Commands::Check => runtime.block_on(commands::check::run()),
        Commands::Info => commands::info::run(),
    }
}
