//! # Tabula Engine
//!
//! Executes generated SQL against a dataset loaded as the table `data`.
//!
//! The engine is a collaborator of the pipeline, reached through the
//! [`QueryEngine`] trait. SQL errors are data, not failures: they come back
//! inside [`QueryOutcome`] so the self-correction loop can feed them into the
//! next generation.
//!
//! ## Sandbox
//!
//! - In-memory SQLite per dataset version; each running query owns its connection
//! - `PRAGMA query_only` once the table is loaded
//! - Queries run on the blocking pool and are interrupted on timeout
//! - Result sets are capped at a row limit

mod error;
mod sqlite;

pub use error::EngineError;
pub use sqlite::{SqliteEngine, DEFAULT_MAX_ROWS};

use async_trait::async_trait;
use tabula_types::{Dataset, QueryOutcome};

/// Runs SQL against tabular data.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Execute `sql` against the dataset, exposed under the name `data`.
    ///
    /// Never fails: errors are reported through `QueryOutcome::error`.
    async fn execute(&self, sql: &str, dataset: &Dataset) -> QueryOutcome;

    /// Drop any state held for a dataset version.
    fn evict(&self, _fingerprint: &str) {}
}
