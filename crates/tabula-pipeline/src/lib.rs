//! # Tabula Pipeline
//!
//! Turns a natural-language question about a table into validated SQL, an
//! executed result, a statistical interpretation, grounded insights and
//! chart recommendations.
//!
//! ## Architecture
//!
//! ```text
//! question ─▶ Context ─▶ Intent ─▶ Schema ─▶ Retrieval ─▶ Requirements
//!                                  (cached)                    │
//!             ┌────────────────────────────────────────────────┘
//!             ▼
//!   ┌──▶ Plan ─▶ Validate ─▶ Execute ──┐   (bounded retries, errors fed back)
//!   └───────── feedback ◀──────────────┘
//!             │
//!             ▼
//!   Interpret ─▶ Insights (grounded) ─▶ Charts ─▶ AnalysisResponse
//! ```
//!
//! Every stage that calls a completion backend has a deterministic path it
//! switches to when the call fails, times out or returns something
//! unusable. `analyze` therefore always returns a response.
//!
//! ## Usage
//!
//! ```ignore
//! use tabula_pipeline::{Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::builder()
//!     .config(PipelineConfig::from_env())
//!     .client(llm_config.build_client()?)
//!     .build();
//!
//! let response = pipeline.analyze("total sales by region", &dataset, None).await;
//! println!("{}", response.insights.direct_answer);
//! ```

mod cache;
mod config;
mod context;
mod correction;
pub mod grounding;
mod insights;
mod intent;
mod interpreter;
mod orchestrator;
mod planner;
pub mod prompt;
pub mod rules;
mod requirements;
mod stage;
pub mod stats;
mod validator;
mod visualize;

pub use cache::{CacheError, PlanCache};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use context::ContextResolver;
pub use correction::{CorrectionLoop, LoopOutcome, FALLBACK_PREVIEW};
pub use insights::InsightSynthesizer;
pub use intent::IntentClassifier;
pub use interpreter::interpret;
pub use orchestrator::{Pipeline, PipelineBuilder};
pub use planner::{build_sql, deterministic_plan, PlanContext, PlanGenerator};
pub use requirements::RequirementExtractor;
pub use stage::StageError;
pub use validator::{check_syntax, CheckedSql, SqlRejection, SqlStage, SqlValidator, ValidationInput};
pub use visualize::{recommend, VisualizationSelector, MAX_CHARTS};
