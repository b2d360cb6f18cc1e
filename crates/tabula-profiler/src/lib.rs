//! # Tabula Profiler
//!
//! Computes a [`SchemaProfile`](tabula_types::SchemaProfile) from raw data.
//! No model calls: the same table always yields the same profile, which is
//! what makes caching by dataset identity safe.
//!
//! ## Type inference
//!
//! Each column takes the first type whose rule holds for all non-null values:
//!
//! ```text
//! datetime -> boolean -> numeric -> categorical -> text
//! ```
//!
//! Categorical means fewer than 100 distinct values and a distinct/row ratio
//! under 0.5.

mod cache;
mod profile;
mod relationships;

pub use cache::{ProfileError, SchemaCache};
pub use profile::{infer_semantic_type, profile, profile_column};
pub use relationships::{detect_relationships, MAX_RELATIONSHIPS};
