//! # Tabula RAG
//!
//! Nearest-neighbour retrieval over three independent indexes:
//!
//! - **schema**: one fragment per column, scoped to its dataset
//! - **queries**: past (question, SQL) pairs that executed successfully
//! - **terms**: business-term definitions
//!
//! Every entry carries a [`Scope`](tabula_types::Scope); lookups only see
//! entries visible to the requesting dataset and user.
//!
//! Retrieval never fails. When the question cannot be embedded the full
//! schema is returned and the context is marked degraded.

mod index;
mod retriever;

pub use index::{Scored, VectorIndex};
pub use retriever::{RetrievalError, Retriever, SemanticRetriever, DEFAULT_TOP_K};
