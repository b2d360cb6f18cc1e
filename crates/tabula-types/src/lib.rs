//! # Tabula Types
//!
//! The typed data model shared by every stage of the analysis pipeline.
//! Each stage produces one of these structs and hands it to the next one;
//! nothing travels between stages as an untyped JSON map.
//!
//! ## Design Goals
//!
//! - **Deterministic**: profiling and validation never call out
//! - **Self-describing**: results carry their own validation state
//! - **Serializable**: every result is JSON for transport and caching
//!
//! ## Example
//!
//! ```json
//! {
//!   "intent": {"category": "Trend", "confidence": 0.92, ...},
//!   "plan": {"sqlQuery": "SELECT month, SUM(sales) ...", "validationPassed": true, ...},
//!   "execution": {"success": true, "rowCount": 12, ...},
//!   "insights": {"directAnswer": "...", "dataSufficiency": "sufficient", ...}
//! }
//! ```

mod conversation;
mod execution;
mod insight;
mod intent;
mod interpretation;
mod plan;
mod requirements;
mod response;
mod retrieval;
mod schema;
mod validation;
mod value;
mod visualization;

pub use conversation::*;
pub use execution::*;
pub use insight::*;
pub use intent::*;
pub use interpretation::*;
pub use plan::*;
pub use requirements::*;
pub use response::*;
pub use retrieval::*;
pub use schema::*;
pub use validation::*;
pub use value::*;
pub use visualization::*;

use serde::{Deserialize, Serialize};

/// Which path produced a stage result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Produced from a completion call
    #[default]
    Model,
    /// Produced by deterministic rules after the completion path failed
    Rules,
    /// Reused from the plan cache
    Cache,
    /// The fixed last-resort value
    Fallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Model => "model",
            Provenance::Rules => "rules",
            Provenance::Cache => "cache",
            Provenance::Fallback => "fallback",
        }
    }
}
